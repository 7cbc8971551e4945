//! Testing utilities for the Palimpsest workspace
//!
//! Shared transform doubles and fixtures: a scripted transform that replays
//! queued responses while recording every request, an always-failing
//! transform, and small image/atlas builders.

#![allow(missing_docs)]

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use palimpsest_atlas::{
    AtlasRegion, BBox, GlobalPhysics, RegionId, RestorationStrategy, SemanticAtlas, SemanticType,
};
use palimpsest_transform::{
    ContentTransform, TransformError, TransformRequest, TransformResponse,
};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Transform double that replays a scripted sequence of outcomes
///
/// Each `invoke` pops the next scripted outcome and records the request.
/// When the script runs dry the fallback response (if any) is returned,
/// otherwise a fatal "script exhausted" error.
#[derive(Default)]
pub struct ScriptedTransform {
    script: Mutex<VecDeque<Result<TransformResponse, TransformError>>>,
    requests: Mutex<Vec<TransformRequest>>,
    fallback: Mutex<Option<TransformResponse>>,
}

impl ScriptedTransform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text response
    pub fn respond_with_text(&self, text: impl Into<String>) -> &Self {
        self.script
            .lock()
            .push_back(Ok(TransformResponse::from_text(text)));
        self
    }

    /// Queue an image response
    pub fn respond_with_image(&self, bytes: Vec<u8>) -> &Self {
        self.script
            .lock()
            .push_back(Ok(TransformResponse::from_image(bytes)));
        self
    }

    /// Queue a failure
    pub fn fail_with(&self, error: TransformError) -> &Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Response returned once the script is exhausted
    pub fn set_fallback(&self, response: TransformResponse) -> &Self {
        *self.fallback.lock() = Some(response);
        self
    }

    /// Requests observed so far, in call order
    #[must_use]
    pub fn requests(&self) -> Vec<TransformRequest> {
        self.requests.lock().clone()
    }

    /// Number of invocations observed
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ContentTransform for ScriptedTransform {
    async fn invoke(&self, request: TransformRequest) -> Result<TransformResponse, TransformError> {
        self.requests.lock().push(request);
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        match self.fallback.lock().clone() {
            Some(response) => Ok(response),
            None => Err(TransformError::Fatal("script exhausted".to_string())),
        }
    }
}

/// Transform double that always fails with a clone of the given error
pub struct FailingTransform {
    error: TransformError,
    calls: Mutex<usize>,
}

impl FailingTransform {
    #[must_use]
    pub fn new(error: TransformError) -> Self {
        Self {
            error,
            calls: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ContentTransform for FailingTransform {
    async fn invoke(&self, _request: TransformRequest) -> Result<TransformResponse, TransformError> {
        *self.calls.lock() += 1;
        Err(self.error.clone())
    }
}

/// Encode a solid-color PNG fixture
///
/// # Panics
/// Panics on encoder failure (test-only code).
#[must_use]
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode(&DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba(rgba),
    )))
}

/// Encode a horizontal-gradient PNG fixture
///
/// # Panics
/// Panics on encoder failure (test-only code).
#[must_use]
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbaImage::new(width, height);
    for (x, _, p) in img.enumerate_pixels_mut() {
        #[allow(clippy::cast_possible_truncation)]
        let v = ((x * 255) / width.max(1)) as u8;
        *p = Rgba([v, v, v, 255]);
    }
    encode(&DynamicImage::ImageRgba8(img))
}

fn encode(image: &DynamicImage) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encode");
    out.into_inner()
}

/// A text region fixture covering the top half of the image
#[must_use]
pub fn sample_text_region(id: &str, content: &str) -> AtlasRegion {
    AtlasRegion::new(
        RegionId::new(id),
        BBox::new(0, 0, 500, 1000),
        content,
        SemanticType::InkText,
        RestorationStrategy::Sharpen,
        0.9,
    )
}

/// A stain region fixture covering the bottom half of the image
#[must_use]
pub fn sample_stain_region(id: &str) -> AtlasRegion {
    AtlasRegion::new(
        RegionId::new(id),
        BBox::new(500, 0, 1000, 1000),
        "",
        SemanticType::BackgroundStain,
        RestorationStrategy::DenoiseOnly,
        0.7,
    )
}

/// A small atlas with one text region and one stain region
#[must_use]
pub fn sample_atlas() -> SemanticAtlas {
    SemanticAtlas::new(
        GlobalPhysics::neutral(),
        55,
        vec![
            sample_text_region("r1", "INVOICE #42"),
            sample_stain_region("r2"),
        ],
    )
}

/// The judge-verdict JSON a scripted transform should return for a clean pass
#[must_use]
pub fn judge_pass_json(extracted_text: &str) -> String {
    format!(
        r#"{{"extractedText": "{extracted_text}", "originalLegible": true, "artifactsVisible": false}}"#
    )
}

/// The judge-verdict JSON for a region whose candidate text is illegible
#[must_use]
pub fn judge_illegible_json() -> String {
    r#"{"extractedText": "", "originalLegible": true, "artifactsVisible": false}"#.to_string()
}
