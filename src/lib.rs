pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
