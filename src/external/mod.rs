pub mod finnhub;
pub mod quote_source;
pub mod yahoo;
