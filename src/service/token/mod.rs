pub mod cache;
pub mod claims;
pub mod rotation;
pub mod source;

pub use cache::{CacheSnapshot, RefreshResult, TokenCache, TokenLookup};
pub use source::{HttpTokenSource, TokenSource};
