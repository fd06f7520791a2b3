//! Core types and the temporal-join engine for the Lockstep
//! coordination-network toolkit.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; the SQLite backend lives in
//! `lockstep-store-sqlite`, the network-facing URL resolver in
//! `lockstep-cli`.

pub mod cancel;
pub mod compute;
pub mod error;
pub mod join;
pub mod message;
pub mod network;
pub mod resolver;
pub mod store;
pub mod text;
pub mod window;

pub use cancel::CancelToken;
pub use error::{Cancelled, EngineError, RowViolation};
pub use message::NormalizedMessage;
pub use network::{Edge, EdgeCounts, NetworkKind};
