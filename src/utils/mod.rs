pub mod http;
pub mod protobuf;
