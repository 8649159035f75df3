pub mod industry_queries;
pub mod price_queries;
pub mod stock_queries;
