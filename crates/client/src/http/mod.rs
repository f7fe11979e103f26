//! HTTP request execution.

pub mod executor;
pub mod request;

pub use executor::{ApiResponse, ExecutorBuilder, RequestExecutor};
pub use request::{RequestDescriptor, ResponseType, TimeoutClass};
