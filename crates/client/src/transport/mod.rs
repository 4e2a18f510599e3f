//! Transport layer for the shell client.

pub mod http;

pub use http::HttpTransport;
