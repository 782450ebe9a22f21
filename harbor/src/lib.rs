pub mod client;
pub mod currency;
pub mod domain;
pub mod errors;
pub mod network;
pub mod persistence;
pub mod planes;
pub mod ports;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{ApiError, ErrorHandler, ErrorKind, RawError, RetryPolicy};
pub use worker::{OfflineWorker, WorkerOptions};
