pub mod error;
pub mod logger;
pub mod monitor;
pub mod price_text;
pub mod validation;
