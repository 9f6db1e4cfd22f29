//! # an-core
//!
//! Domain logic and port definitions for the page annotation engine: actors,
//! threads and comments, mention tokens, access control, collaborator
//! sessions and the service exposing every boundary operation.

pub mod access;
pub mod actor;
pub mod context;
pub mod directory;
pub mod error;
pub mod invite;
pub mod mention;
pub mod models;
pub mod notify;
pub mod resolver;
pub mod service;
pub mod session;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exporting for easier access in other crates
pub use actor::*;
pub use context::RequestContext;
pub use error::*;
pub use models::*;
pub use service::{AnnotationService, ServiceConfig};
pub use traits::*;
