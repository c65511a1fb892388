//! Pipewright core.
//!
//! The domain model and validation engine shared by the Pipewright control
//! plane. Everything in this crate is pure: no store access, no network, no
//! background tasks. The control plane crate composes these types with the
//! KV/catalog store to form the running system.

pub mod error;
pub mod model;
pub mod validation;

pub use error::AppError;
