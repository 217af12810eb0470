pub mod config;
pub mod logger;
pub mod request_context;
pub mod scheduler;
pub mod validation;
