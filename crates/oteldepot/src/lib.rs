//! oteldepot - an OpenTelemetry signal depot.
//!
//! This crate provides a depot service that:
//! - Receives standard OTLP (gRPC + HTTP) for traces, metrics, and logs
//! - Persists signal batches as hour-partitioned OTLP-JSON objects in an
//!   object store (S3-compatible, local filesystem, or in-memory)
//! - Serves a paginated fetch API that walks the partitions by time range,
//!   resuming from an encrypted opaque cursor
//!
//! ## Architecture
//!
//! ```text
//! OTLP gRPC/HTTP → Signal Repository → hour-partitioned objects
//!                                              ↓
//!                              fetch walk (cursor-resumable)
//!                                              ↓
//!                                 HTTP fetch API (/api/*)
//! ```

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
mod cursor;
pub mod error;
pub mod ingest;
pub mod repository;
pub mod server;
mod signal;
pub mod storage;
mod wire;

pub use config::ServerConfig;
pub use error::DepotError;
pub use repository::SignalRepository;
pub use server::Server;
pub use storage::SignalKind;
