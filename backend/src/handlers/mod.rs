//! API handlers module.
//!
//! One submodule per resource. Handlers resolve the principal, apply the
//! data scope, call into the service layer and map typed errors to HTTP.

pub mod admin;
pub mod analytics;
pub mod applications;
pub mod audit;
pub mod chat;
pub mod compliance;
pub mod conditions;
pub mod decisions;
pub mod documents;
pub mod hmda;
pub mod kb;
