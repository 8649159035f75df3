mod industry;
mod price_point;
mod stock;

pub use industry::{CreateIndustry, Industry};
pub use price_point::PricePoint;
pub use stock::{CreateStock, Stock};
