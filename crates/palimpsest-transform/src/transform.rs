//! The opaque `ContentTransform` capability
//!
//! Every generative or perceptive call the pipeline makes goes through this
//! one trait. Implementations may be a hosted model service, a local model,
//! or a scripted test double; orchestration logic never depends on which.

use crate::error::TransformError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One input image for a transform call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// Mime type of `bytes` (e.g. `image/png`)
    pub mime_type: String,
}

impl ImageInput {
    /// Create a new image input
    #[inline]
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// PNG-typed input
    #[inline]
    #[must_use]
    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/png")
    }
}

/// Options for a transform call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Expected response schema, when the caller wants structured output
    pub schema: Option<serde_json::Value>,
    /// Upper bound on the response size in bytes
    pub max_output_bytes: Option<usize>,
    /// Free-form quality hints forwarded to the backing service
    pub quality_hints: Vec<String>,
}

impl TransformOptions {
    /// Options requesting structured output against `schema`
    #[inline]
    #[must_use]
    pub fn structured(schema: serde_json::Value) -> Self {
        Self {
            schema: Some(schema),
            ..Self::default()
        }
    }

    /// Add a quality hint
    #[inline]
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.quality_hints.push(hint.into());
        self
    }
}

/// A single transform request: images plus an instruction text
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Input images, in caller-defined order
    pub images: Vec<ImageInput>,
    /// Instruction / prompt text
    pub text: String,
    /// Call options
    pub options: TransformOptions,
}

impl TransformRequest {
    /// Text-only request
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            images: Vec::new(),
            text: text.into(),
            options: TransformOptions::default(),
        }
    }

    /// Attach an image
    #[inline]
    #[must_use]
    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.images.push(image);
        self
    }

    /// Set call options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }
}

/// Response from a transform call
#[derive(Debug, Clone, Default)]
pub struct TransformResponse {
    /// Textual output, possibly wrapped in prose or code fences
    pub text: Option<String>,
    /// Generated images, encoded
    pub images: Vec<Vec<u8>>,
}

impl TransformResponse {
    /// Text-only response
    #[inline]
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            images: Vec::new(),
        }
    }

    /// Image-only response
    #[inline]
    #[must_use]
    pub fn from_image(bytes: Vec<u8>) -> Self {
        Self {
            text: None,
            images: vec![bytes],
        }
    }

    /// First generated image, if any
    #[inline]
    #[must_use]
    pub fn first_image(&self) -> Option<&[u8]> {
        self.images.first().map(Vec::as_slice)
    }
}

/// The capability every pipeline stage consumes
///
/// Swapping the backing service must require no change to orchestration
/// logic; only this trait's implementor changes.
#[async_trait]
pub trait ContentTransform: Send + Sync {
    /// Execute one transform call
    async fn invoke(&self, request: TransformRequest) -> Result<TransformResponse, TransformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let req = TransformRequest::text("describe this")
            .with_image(ImageInput::png(vec![1, 2, 3]))
            .with_options(TransformOptions::structured(serde_json::json!({"type": "object"})));

        assert_eq!(req.images.len(), 1);
        assert_eq!(req.images[0].mime_type, "image/png");
        assert!(req.options.schema.is_some());
    }

    #[test]
    fn response_first_image() {
        let resp = TransformResponse::from_image(vec![9, 9]);
        assert_eq!(resp.first_image(), Some(&[9u8, 9][..]));
        assert!(TransformResponse::from_text("hi").first_image().is_none());
    }
}
