//! # Gateway Database Crate
//!
//! This crate owns every database handle in the gateway: the single
//! control-plane pool holding API metadata, and one pool per registered
//! tenant source.
//!
//! ## Architectural Principles
//!
//! - **One registry, no globals:** `PoolRegistry` is built once at startup and
//!   shared behind an `Arc`. It is the only place pool state lives.
//! - **Create slowly, look up cheaply:** creating a pool pings the database;
//!   looking one up never performs I/O and is safe from any number of tasks.
//! - **Dialect at runtime:** pools are `sqlx::AnyPool`s, so the same code path
//!   serves MySQL, PostgreSQL and SQLite sources.
//!
//! ## Public API
//!
//! - `PoolRegistry` / `ConnectionPool`: pool creation, lookup, health checks.
//! - `ApiStore`: reads and writes API definitions and sources in the control plane.
//! - `ensure_schema`: creates the control-plane tables when they are missing.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;
pub mod schema;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{control_plane_source, ConnectionPool, PoolRegistry};
pub use error::DbError;
pub use repository::ApiStore;
pub use schema::ensure_schema;
