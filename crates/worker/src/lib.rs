//! Long-lived automation worker.

pub mod worker;

pub use worker::{DispatchRequest, Worker, WORKER_KEY};
