// Handler modules
pub mod errors;
pub mod jobs;
pub mod tokens;
pub mod visits;

pub use errors::ApiError;
