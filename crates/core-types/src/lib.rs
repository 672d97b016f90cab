//! # Gateway Core Types
//!
//! The shared vocabulary of the control plane: registered data sources, API
//! definitions, de-identification options and the tagged request parameter
//! values. Every other crate in the workspace depends on this one and on
//! nothing more specific.

pub mod enums;
pub mod error;
pub mod sql;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{ApiStatus, Dialect, PoolClass};
pub use error::CoreError;
pub use structs::{
    AnoParamOption, ApiDefinition, DidOptions, NewApiDefinition, ParamValue, QueryContent, Source,
    DATETIME_FORMAT,
};
