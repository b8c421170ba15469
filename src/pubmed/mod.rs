pub mod client;
pub mod parse;
pub mod query;
pub mod types;
pub mod xml;
