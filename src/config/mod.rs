pub mod feed;

pub use feed::{FeedConfig, GatewayMode, SourceMode};
