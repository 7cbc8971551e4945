//! Pipeline errors
//!
//! Only two things are user-visible hard failures: an input that is not an
//! image at all, and a restoration stage that could not produce a candidate.
//! Every other stage degrades gracefully and surfaces only in the log and
//! report. The restoration error carries the upstream classification
//! unmodified so callers can decide whether to re-authenticate, retry, or
//! abandon.

use palimpsest_imageops::ImageOpsError;
use palimpsest_transform::TransformError;

/// Pipeline failure
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input bytes did not decode as an image
    #[error("invalid input image: {0}")]
    InvalidInput(#[from] ImageOpsError),

    /// The restoration stage failed; the upstream classification is preserved
    #[error("restoration failed: {0}")]
    Restoration(#[source] TransformError),
}

impl PipelineError {
    /// The original upstream classification, when one exists
    #[inline]
    #[must_use]
    pub fn upstream(&self) -> Option<&TransformError> {
        match self {
            Self::Restoration(err) => Some(err),
            Self::InvalidInput(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restoration_preserves_upstream_classification() {
        let err = PipelineError::Restoration(TransformError::InvalidAuth("expired".into()));
        assert!(matches!(
            err.upstream(),
            Some(TransformError::InvalidAuth(_))
        ));
        assert!(err.upstream().unwrap().is_auth());
    }
}
