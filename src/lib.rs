#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod common;
pub use common::*;

mod key;
pub use key::*;

mod clock;
pub use clock::{Clock, SystemClock};

mod instrumentation;
pub use instrumentation::{FacadeMetrics, MetricsSink, NoopMetrics};

mod span;

mod context;
pub use context::*;

mod store;
pub use store::*;

mod cluster_limiter;
pub use cluster_limiter::*;

mod limiter;
pub use limiter::*;

mod registry;
pub use registry::*;

pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;
