pub mod client;
pub mod payload;
pub mod retry;

pub use client::{HttpVisitSender, VisitOutcome, VisitSender};
pub use payload::{encoder_from_config, PayloadEncoder};
pub use retry::RetryPolicy;
