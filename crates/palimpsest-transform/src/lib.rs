//! Palimpsest Transform - the opaque content-synthesis capability
//!
//! Everything the restoration pipeline asks of the outside world goes through
//! one abstraction:
//! - [`ContentTransform`]: a single `invoke` seam over any hosted or local
//!   model service
//! - [`TransformError`]: the closed failure classification retry and
//!   fail-open policy key on
//! - [`retry`]: the shared exponential-backoff envelope
//!
//! # Example
//!
//! ```rust,ignore
//! use palimpsest_transform::{retry, ContentTransform, RetryPolicy, TransformRequest};
//!
//! # async fn example(transform: &dyn ContentTransform) -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::default();
//! let response = retry::execute(&policy, || {
//!     transform.invoke(TransformRequest::text("describe the damage"))
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod retry;
pub mod transform;

pub use error::TransformError;
pub use retry::RetryPolicy;
pub use transform::{
    ContentTransform, ImageInput, TransformOptions, TransformRequest, TransformResponse,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
