pub mod http;
pub mod ingestor;
pub mod parser;
pub mod source;

pub use http::HttpFeedSource;
pub use ingestor::{IngestSettings, StreamIngestor};
pub use parser::ItemParser;
pub use source::{FeedConnection, FeedSource};
