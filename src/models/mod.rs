pub mod config;
pub mod job;
pub mod token;

pub use config::{
    AppConfig, CorsConfig, CorsMode, DispatchConfig, JobsConfig, PayloadConfig, PayloadMode,
    ServerConfig, TokenSourceConfig, UpstreamConfig, UpstreamProxyConfig,
};
pub use job::{JobRecord, JobStatus, JobSummary, RegionTally, StopReason, VisitTally};
pub use token::{RawToken, TokenClaims, TokenRecord};
