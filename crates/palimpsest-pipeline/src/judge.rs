//! Consistency judge
//!
//! Independently re-validates the restored candidate region-by-region.
//! Checks fan out concurrently, each task owning its own crop buffers and its
//! own retry envelope; one region's transform failure never fails the others.
//! The judge is a quality gate, not a hard dependency: it is infallible by
//! construction, and a region whose check could not run maps to a default
//! PASS with low confidence and a "validation error" reason rather than being
//! dropped from the report.

use futures::future::join_all;
use image::DynamicImage;
use palimpsest_atlas::{extract, AtlasRegion, RegionVerdict, SemanticAtlas, ValidationReport};
use palimpsest_imageops as imageops;
use palimpsest_transform::{
    retry, ContentTransform, ImageInput, RetryPolicy, TransformRequest,
};
use serde::Deserialize;
use std::sync::Arc;

/// Confidence attached to a verdict the judge could not actually compute.
const VALIDATION_ERROR_CONFIDENCE: f64 = 0.2;

/// Wire shape of the per-region reading returned by the transform
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionReading {
    /// Text the transform read from the candidate crop
    #[serde(default)]
    extracted_text: String,
    /// Whether the original crop was legible at all
    #[serde(default = "default_true")]
    original_legible: bool,
    /// Whether synthetic artifacts are visible in the candidate crop
    #[serde(default)]
    artifacts_visible: bool,
}

fn default_true() -> bool {
    true
}

/// Judging stage: validates candidate regions against the atlas
pub struct ConsistencyJudge {
    transform: Arc<dyn ContentTransform>,
    retry: RetryPolicy,
    similarity_threshold: f64,
    critical_limit: usize,
}

impl ConsistencyJudge {
    /// Create a judge
    #[must_use]
    pub fn new(
        transform: Arc<dyn ContentTransform>,
        retry: RetryPolicy,
        similarity_threshold: f64,
        critical_limit: usize,
    ) -> Self {
        Self {
            transform,
            retry,
            similarity_threshold,
            critical_limit,
        }
    }

    /// Judge the critical subset of atlas regions
    pub async fn judge(
        &self,
        original: &DynamicImage,
        candidate: &DynamicImage,
        atlas: &SemanticAtlas,
    ) -> ValidationReport {
        let subset = atlas.critical_regions(self.critical_limit);
        self.judge_regions(original, candidate, &subset).await
    }

    /// Judge an explicit region subset
    ///
    /// Used both for the full critical pass and for re-judging only the
    /// regions a refinement pass touched.
    pub async fn judge_regions(
        &self,
        original: &DynamicImage,
        candidate: &DynamicImage,
        regions: &[&AtlasRegion],
    ) -> ValidationReport {
        if regions.is_empty() {
            return ValidationReport::new(Vec::new(), "no critical regions to validate");
        }

        // Crop and score synchronously; each task then owns its buffers.
        let checks = regions.iter().map(|region| {
            let original_crop = imageops::crop(original, &region.bbox);
            let candidate_crop = imageops::crop(candidate, &region.bbox);
            let score = imageops::similarity(&original_crop, &candidate_crop);
            self.check_region(region, original_crop, candidate_crop, score)
        });

        let results: Vec<RegionVerdict> = join_all(checks).await;
        let failing = results.iter().filter(|v| v.is_fail()).count();
        let critique = format!(
            "checked {} critical region(s), {} failing",
            results.len(),
            failing
        );
        ValidationReport::new(results, critique)
    }

    /// Check one region; never errors
    async fn check_region(
        &self,
        region: &AtlasRegion,
        original_crop: DynamicImage,
        candidate_crop: DynamicImage,
        score: f64,
    ) -> RegionVerdict {
        let id = region.id.clone();

        let reading = match self.read_region(region, &original_crop, &candidate_crop).await {
            Ok(reading) => reading,
            Err(detail) => {
                tracing::warn!(region = id.as_str(), "region check degraded: {detail}");
                return RegionVerdict::pass(
                    id,
                    format!("validation error: {detail}"),
                    VALIDATION_ERROR_CONFIDENCE,
                );
            }
        };

        if reading.artifacts_visible {
            return RegionVerdict::fail(id, "synthetic artifacts visible in candidate", 0.85);
        }

        if !region.content.is_empty() {
            let expected = normalize(&region.content);
            let read = normalize(&reading.extracted_text);
            if read.is_empty() {
                return RegionVerdict::fail(id, "illegible text in candidate crop", 0.85);
            }
            if read != expected {
                return RegionVerdict::fail(
                    id,
                    format!(
                        "content mismatch: expected \"{}\", read \"{}\"",
                        region.content, reading.extracted_text
                    ),
                    0.85,
                );
            }
        }

        if score < self.similarity_threshold && reading.original_legible {
            return RegionVerdict::fail(
                id,
                format!(
                    "structural similarity {score:.2} below threshold {:.2}",
                    self.similarity_threshold
                ),
                0.8,
            );
        }

        RegionVerdict::pass(id, format!("consistent (similarity {score:.2})"), 0.9)
    }

    /// Ask the transform to read the region out of both crops
    async fn read_region(
        &self,
        region: &AtlasRegion,
        original_crop: &DynamicImage,
        candidate_crop: &DynamicImage,
    ) -> Result<RegionReading, String> {
        let original_png = imageops::encode_png(original_crop).map_err(|e| e.to_string())?;
        let candidate_png = imageops::encode_png(candidate_crop).map_err(|e| e.to_string())?;

        let prompt = format!(
            "Image 1 is a crop from the original damaged document; image 2 is the same crop \
             from a restored candidate. The region is expected to contain: \"{}\".\n\
             Respond with a single JSON object:\n\
             {{\"extractedText\": \"<text read verbatim from image 2, empty if unreadable>\", \
             \"originalLegible\": <is image 1 readable at all>, \
             \"artifactsVisible\": <does image 2 show synthetic generation artifacts>}}",
            region.content
        );

        let request = TransformRequest::text(prompt)
            .with_image(ImageInput::png(original_png))
            .with_image(ImageInput::png(candidate_png));

        let response = retry::execute(&self.retry, || self.transform.invoke(request.clone()))
            .await
            .map_err(|e| e.to_string())?;

        let text = response.text.ok_or_else(|| "no text in response".to_string())?;
        extract::parse_payload::<RegionReading>(&text).map_err(|e| e.to_string())
    }
}

/// Whitespace-normalized comparison form; content must otherwise match
/// verbatim.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
