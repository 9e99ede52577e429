//! HTTP layer: signed requests with bounded retry
//!
//! Wraps outbound calls to the export endpoint with exponential-backoff
//! retry, permanent-vs-transient failure classification, request signing
//! and a liveness probe.

mod client;
mod sign;

pub use client::{RetryPolicy, RetryingFetcher, Sleeper, TokioSleeper};
pub use sign::{sign_params, signature};
