pub(crate) mod admin;
pub(crate) mod health;
pub(crate) mod industries;
pub(crate) mod stocks;
