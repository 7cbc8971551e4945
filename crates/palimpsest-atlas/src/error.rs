//! Error types for atlas construction and payload parsing

/// Atlas data-model errors
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    /// Bounding box violates the normalized-space invariants
    #[error("invalid bbox [{ymin}, {xmin}, {ymax}, {xmax}]: {detail}")]
    InvalidBBox {
        ymin: u16,
        xmin: u16,
        ymax: u16,
        xmax: u16,
        detail: String,
    },

    /// Response text contained no balanced JSON payload
    #[error("no JSON payload found in transform response")]
    NoJsonPayload,

    /// JSON deserialization failure
    #[error("payload parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
