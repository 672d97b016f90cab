//! # Gateway
//!
//! API resolution and registration on top of the pool registry.
//!
//! - `ApiResolver` turns an external alias into a ready-to-run definition.
//! - `Registrar` writes new API definitions and sources and provisions tenant pools.
//! - `AccessPipeline` runs a full request: authenticate, resolve, validate, dispatch.

pub mod error;
pub mod pipeline;
pub mod registrar;
pub mod resolver;
pub mod validation;

pub use error::GatewayError;
pub use pipeline::{AccessPipeline, Authenticator, Dispatcher, EvaluationSummary};
pub use registrar::Registrar;
pub use resolver::ApiResolver;
