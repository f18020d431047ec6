#![forbid(unsafe_code)]

//! `toolbus`, an editor tool broker.
//!
//! Accepts newline-delimited JSON requests on an input stream, dispatches
//! each to a named handler through a worker pool, and writes
//! newline-delimited JSON responses to an output stream, correlated by an
//! opaque caller-chosen token.

pub mod broker;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod methods;
pub mod procs;
pub mod proto;
pub mod supervisor;

pub use config::BrokerConfig;
pub use errors::{AppError, Result};
