//! Shared primitives and traits for the molkit chemistry toolkit.
//!
//! `molkit-core` provides the foundation the domain crates build on:
//!
//! - **Error types**: [`MolkitError`] and [`Result`] for structured error handling
//! - **Traits**: [`ContentAddressable`], [`Annotated`], [`Summarizable`]
//! - **Hashing**: SHA-256 content addressing
//! - **Cancellation**: [`CancelToken`] polled by long-running operations

pub mod cancel;
pub mod error;
pub mod hash;
pub mod traits;

pub use cancel::CancelToken;
pub use error::{MolkitError, Result};
pub use traits::*;
