pub mod config;
pub mod data_processor;
pub mod error;
pub mod manifest;
pub mod similarity;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
