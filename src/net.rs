//! The request pipeline.
//!
//! [`Dispatcher`] is the entry point; everything else in this module is
//! either a stage it runs or a collaborator it talks to.
pub mod cache;
pub mod coalesce;
pub mod dispatcher;
pub mod fetch;
pub mod headers;
pub mod interceptor;
pub mod location;
pub mod pending;
pub mod query;
pub mod request;
pub mod response;
pub mod step;
pub mod transport;

pub use cache::{CacheHandle, InMemoryCache, ResponseCache};
pub use coalesce::{Coalescer, FlushHook, Timer, TimerHandle, TimerRef, TokioTimer};
pub use dispatcher::{Dispatcher, DispatcherBuilder, LocationHandle};
pub use fetch::HttpTransport;
pub use headers::{DefaultHeaders, HeaderPolicy};
pub use interceptor::{Interceptor, InterceptorChain};
pub use location::{DocumentOrigin, FixedLocation, LocationResolver};
pub use pending::PendingRequestTable;
pub use query::{ParamSerializer, QueryEncoder};
pub use request::{Body, CachePolicy, HeaderValue, Params, RequestConfig, RequestHeaders, RequestId};
pub use response::{Response, ResponseHeaders};
pub use step::Step;
pub use transport::{RawReply, Transport, TransportError, TransportHandle, TransportRequest};
