//! HTTP request pipeline for the Gosub engine.
//!
//! Requests go through an ordered interceptor chain, per-URL de-duplication
//! of in-flight requests, an optional response cache and a coalescer that
//! batches completions. The network itself is reached through a
//! [`Transport`](net::Transport).
pub mod config;
pub mod cookies;
pub mod errors;
pub mod net;

pub use config::{PipelineConfig, PipelineConfigBuilder, PipelineConfigError};
pub use errors::NetError;
pub use net::{Dispatcher, RequestConfig, Response};
