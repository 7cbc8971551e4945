//! Atlas builder: the perception stage
//!
//! Turns a raw document image into a [`SemanticAtlas`]. Perception is
//! advisory, so this stage is fail-open: a transform error, an unparseable
//! response, or undecodable input all yield a safe empty atlas plus a
//! degraded note, never an error to the caller. The pipeline then restores
//! without semantic guidance rather than aborting.

use image::GenericImageView;
use palimpsest_atlas::{extract, AtlasRegion, GlobalPhysics, SemanticAtlas};
use palimpsest_imageops as imageops;
use palimpsest_transform::{
    retry, ContentTransform, ImageInput, RetryPolicy, TransformOptions, TransformRequest,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

const PERCEPTION_PROMPT: &str = "\
Analyze this damaged document image. Respond with a single JSON object:
{
  \"globalPhysics\": {
    \"substrateColor\": \"<dominant substrate color>\",
    \"noiseProfile\": \"clean|gaussian|salt_pepper|paper_grain|jpeg_artifacts\",
    \"blurClass\": \"none|motion|defocus|lens_softness\",
    \"lighting\": \"<lighting condition>\"
  },
  \"degradationScore\": <0-100 overall severity>,
  \"regions\": [
    {
      \"id\": \"<stable unique id>\",
      \"bbox\": [ymin, xmin, ymax, xmax],  // normalized 0-1000, min < max
      \"content\": \"<exact text or semantic payload the region should carry>\",
      \"semanticType\": \"ink_text|stamp_pigment|signature_ink|halftone_photo|background_stain\",
      \"restorationStrategy\": \"sharpen|preserve_color|denoise_only|descreen\",
      \"confidence\": <0-1>
    }
  ]
}
List every semantically meaningful region. Read text verbatim.";

/// Wire shape of the perception response; `globalPhysics` is the structural
/// minimum, regions are validated individually so one bad entry cannot sink
/// the payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerceptionPayload {
    global_physics: Option<GlobalPhysics>,
    #[serde(default)]
    degradation_score: f64,
    #[serde(default)]
    regions: Vec<serde_json::Value>,
}

/// Result of a perception pass; never an error
#[derive(Debug)]
pub struct PerceptionOutcome {
    /// The atlas, possibly empty
    pub atlas: SemanticAtlas,
    /// Present when perception degraded to the empty atlas
    pub note: Option<String>,
}

impl PerceptionOutcome {
    fn degraded(note: impl Into<String>) -> Self {
        Self {
            atlas: SemanticAtlas::empty(),
            note: Some(note.into()),
        }
    }
}

/// Perception stage: builds the semantic atlas
pub struct AtlasBuilder {
    transform: Arc<dyn ContentTransform>,
    retry: RetryPolicy,
    max_dim: u32,
}

impl AtlasBuilder {
    /// Create a builder
    #[must_use]
    pub fn new(transform: Arc<dyn ContentTransform>, retry: RetryPolicy, max_dim: u32) -> Self {
        Self {
            transform,
            retry,
            max_dim,
        }
    }

    /// Build an atlas for the image
    ///
    /// Infallible by contract: every failure path resolves to a structurally
    /// valid (possibly empty) atlas with a degraded note.
    pub async fn build(&self, image: &[u8], mime_type: &str) -> PerceptionOutcome {
        let input = match self.bounded_payload(image, mime_type) {
            Ok(input) => input,
            Err(note) => {
                tracing::warn!("perception degraded: {note}");
                return PerceptionOutcome::degraded(note);
            }
        };

        let request = TransformRequest::text(PERCEPTION_PROMPT)
            .with_image(input)
            .with_options(TransformOptions::default().with_hint("precise region geometry"));

        let response = match retry::execute(&self.retry, || self.transform.invoke(request.clone())).await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("perception transform failed after retries: {err}");
                return PerceptionOutcome::degraded(format!("perception unavailable: {err}"));
            }
        };

        let Some(text) = response.text else {
            return PerceptionOutcome::degraded("perception returned no text");
        };

        match self.parse_atlas(&text) {
            Ok(atlas) => PerceptionOutcome { atlas, note: None },
            Err(note) => {
                tracing::warn!("perception degraded: {note}");
                PerceptionOutcome::degraded(note)
            }
        }
    }

    /// Deterministic pre-processing: decode and bound the long edge so the
    /// perception payload stays small. Not part of the transform's contract.
    fn bounded_payload(&self, image: &[u8], mime_type: &str) -> Result<ImageInput, String> {
        let decoded = imageops::decode(image).map_err(|e| format!("input not decodable: {e}"))?;

        let (w, h) = (decoded.width(), decoded.height());
        if w.max(h) <= self.max_dim {
            // Within bounds: submit the original bytes untouched.
            return Ok(ImageInput::new(image.to_vec(), mime_type));
        }

        let scaled = imageops::downscale(&decoded, self.max_dim);
        let bytes = imageops::encode_png(&scaled).map_err(|e| format!("downscale encode failed: {e}"))?;
        Ok(ImageInput::png(bytes))
    }

    fn parse_atlas(&self, text: &str) -> Result<SemanticAtlas, String> {
        let payload: PerceptionPayload =
            extract::parse_payload(text).map_err(|e| format!("unparseable perception payload: {e}"))?;

        let Some(global_physics) = payload.global_physics else {
            return Err("perception payload missing globalPhysics".to_string());
        };

        let mut seen = HashSet::new();
        let mut regions = Vec::new();
        for value in payload.regions {
            let region: AtlasRegion = match serde_json::from_value::<AtlasRegion>(value) {
                Ok(region) => region.sanitized(),
                Err(err) => {
                    tracing::warn!("dropping malformed region: {err}");
                    continue;
                }
            };
            if let Err(err) = region.bbox.validate() {
                tracing::warn!(region = region.id.as_str(), "dropping region: {err}");
                continue;
            }
            if !seen.insert(region.id.clone()) {
                tracing::warn!(region = region.id.as_str(), "dropping duplicate region id");
                continue;
            }
            regions.push(region);
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = payload.degradation_score.clamp(0.0, 100.0) as u8;
        Ok(SemanticAtlas::new(global_physics, score, regions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palimpsest_test_utils::{gradient_png, ScriptedTransform};
    use palimpsest_transform::TransformError;

    fn builder(transform: Arc<ScriptedTransform>) -> AtlasBuilder {
        AtlasBuilder::new(transform, RetryPolicy::none(), 1024)
    }

    fn atlas_json() -> &'static str {
        r#"Here is my analysis:
```json
{
  "globalPhysics": {
    "substrateColor": "aged ivory",
    "noiseProfile": "paper_grain",
    "blurClass": "defocus",
    "lighting": "even diffuse"
  },
  "degradationScore": 62,
  "regions": [
    {"id": "r1", "bbox": [0, 0, 500, 1000], "content": "INVOICE #42",
     "semanticType": "ink_text", "restorationStrategy": "sharpen", "confidence": 0.9},
    {"id": "bad", "bbox": [500, 0, 100, 1000], "content": "",
     "semanticType": "background_stain", "restorationStrategy": "denoise_only", "confidence": 0.5}
  ]
}
```"#
    }

    #[tokio::test]
    async fn parses_atlas_and_drops_invalid_regions() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_text(atlas_json());

        let outcome = builder(transform).build(&gradient_png(64, 64), "image/png").await;
        assert!(outcome.note.is_none());
        assert_eq!(outcome.atlas.degradation_score, 62);
        // "bad" has ymin > ymax and is dropped; "r1" survives.
        assert_eq!(outcome.atlas.regions.len(), 1);
        assert_eq!(outcome.atlas.regions[0].id.as_str(), "r1");
    }

    #[tokio::test]
    async fn permanent_transform_failure_yields_empty_atlas() {
        let transform = Arc::new(ScriptedTransform::new());
        for _ in 0..4 {
            transform.fail_with(TransformError::Unavailable("down".into()));
        }

        let outcome = builder(transform).build(&gradient_png(64, 64), "image/png").await;
        assert!(outcome.atlas.is_empty());
        assert_eq!(outcome.atlas.degradation_score, 0);
        assert!(outcome.note.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn missing_global_physics_is_degraded_not_fatal() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_text(r#"{"degradationScore": 10, "regions": []}"#);

        let outcome = builder(transform).build(&gradient_png(64, 64), "image/png").await;
        assert!(outcome.atlas.is_empty());
        assert!(outcome.note.unwrap().contains("globalPhysics"));
    }

    #[tokio::test]
    async fn prose_without_json_is_degraded() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_text("I cannot analyze this image, sorry.");

        let outcome = builder(transform).build(&gradient_png(64, 64), "image/png").await;
        assert!(outcome.atlas.is_empty());
        assert!(outcome.note.is_some());
    }

    #[tokio::test]
    async fn undecodable_input_is_degraded() {
        let transform = Arc::new(ScriptedTransform::new());
        let outcome = builder(transform.clone()).build(b"not an image", "image/png").await;
        assert!(outcome.atlas.is_empty());
        // Perception never even reached the transform.
        assert_eq!(transform.call_count(), 0);
    }

    #[tokio::test]
    async fn large_input_is_downscaled_before_submission() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_text(atlas_json());

        let big = gradient_png(2048, 1024);
        let _ = builder(transform.clone()).build(&big, "image/png").await;

        let requests = transform.requests();
        assert_eq!(requests.len(), 1);
        let submitted = imageops::decode(&requests[0].images[0].bytes).unwrap();
        let (w, h) = submitted.dimensions();
        assert!(w.max(h) <= 1024);
    }

    #[tokio::test]
    async fn duplicate_region_ids_are_dropped() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_text(
            r#"{
              "globalPhysics": {"substrateColor": "white", "noiseProfile": "clean",
                                "blurClass": "none", "lighting": "even"},
              "degradationScore": 5,
              "regions": [
                {"id": "r1", "bbox": [0,0,100,100], "content": "a",
                 "semanticType": "ink_text", "restorationStrategy": "sharpen", "confidence": 0.9},
                {"id": "r1", "bbox": [100,100,200,200], "content": "b",
                 "semanticType": "ink_text", "restorationStrategy": "sharpen", "confidence": 0.8}
              ]
            }"#,
        );

        let outcome = builder(transform).build(&gradient_png(32, 32), "image/png").await;
        assert_eq!(outcome.atlas.regions.len(), 1);
        assert_eq!(outcome.atlas.regions[0].content, "a");
    }

    #[tokio::test]
    async fn out_of_range_region_confidence_is_clamped() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_text(
            r#"{
              "globalPhysics": {"substrateColor": "white", "noiseProfile": "clean",
                                "blurClass": "none", "lighting": "even"},
              "degradationScore": 5,
              "regions": [
                {"id": "r1", "bbox": [0,0,100,100], "content": "a",
                 "semanticType": "ink_text", "restorationStrategy": "sharpen", "confidence": 5.0}
              ]
            }"#,
        );

        let outcome = builder(transform).build(&gradient_png(32, 32), "image/png").await;
        assert_eq!(outcome.atlas.regions.len(), 1);
        assert_eq!(outcome.atlas.regions[0].confidence, 1.0);
    }
}
