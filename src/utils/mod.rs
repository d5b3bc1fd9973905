pub mod config;
pub mod error;
pub mod merge;
pub mod quantity;
