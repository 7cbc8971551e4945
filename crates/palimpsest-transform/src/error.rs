//! Classified errors for the content-transform capability
//!
//! Every failure from an external transform service is mapped into one of a
//! closed set of classes. The pipeline's retry and fail-open decisions key on
//! this classification, so it must survive propagation unmodified.

/// Classified transform failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Upstream rejected the call due to rate limiting
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Upstream service unavailable
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Transient internal failure on the upstream side
    #[error("internal transient failure: {0}")]
    InternalTransient(String),

    /// Authentication or authorization failure
    #[error("invalid auth: {0}")]
    InvalidAuth(String),

    /// Non-retryable failure
    #[error("fatal transform failure: {0}")]
    Fatal(String),
}

impl TransformError {
    /// Check whether this failure class is safe to retry
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Unavailable(_) | Self::InternalTransient(_)
        )
    }

    /// Check whether the caller should prompt for re-authentication
    #[inline]
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::InvalidAuth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classes() {
        assert!(TransformError::RateLimited("429".into()).is_transient());
        assert!(TransformError::Unavailable("503".into()).is_transient());
        assert!(TransformError::InternalTransient("flaky".into()).is_transient());
        assert!(!TransformError::Fatal("bad request".into()).is_transient());
        assert!(!TransformError::InvalidAuth("expired key".into()).is_transient());
    }

    #[test]
    fn display_carries_detail() {
        let err = TransformError::Unavailable("maintenance window".into());
        assert!(err.to_string().contains("maintenance window"));
    }
}
