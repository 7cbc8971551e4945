//! Surgical refiner
//!
//! Re-synthesizes a single failing region rather than the whole image. The
//! failure reason is classified into a diagnosis by keyword, and the
//! correction directive is diagnosis-specific. The refiner never blocks the
//! pipeline: on any failure the original patch comes back unchanged and the
//! run proceeds.

use image::DynamicImage;
use palimpsest_atlas::{AtlasRegion, RegionVerdict};
use palimpsest_imageops as imageops;
use palimpsest_transform::{
    retry, ContentTransform, ImageInput, RetryPolicy, TransformRequest,
};
use std::sync::Arc;

/// Failure diagnosis, derived from the verdict reason by keyword match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    /// Text is wrong or unreadable: re-render it as exact typography
    ForceTypography,
    /// Surface looks oversmoothed/plastic: re-inject substrate grain
    GrainInjection,
    /// The transform invented content: remove the hallucinated artifacts
    ArtifactRemoval,
    /// No specific signature matched: general enhancement
    GeneralEnhancement,
}

impl Diagnosis {
    /// Classify a failure reason
    #[must_use]
    pub fn classify(reason: &str) -> Self {
        let reason = reason.to_lowercase();
        if reason.contains("illegible") || reason.contains("ocr") || reason.contains("mismatch") {
            Self::ForceTypography
        } else if reason.contains("oversmooth")
            || reason.contains("smooth")
            || reason.contains("plastic")
        {
            Self::GrainInjection
        } else if reason.contains("hallucinat") || reason.contains("artifact") {
            Self::ArtifactRemoval
        } else {
            Self::GeneralEnhancement
        }
    }
}

/// Refinement stage: corrects one failing patch at a time
pub struct SurgicalRefiner {
    transform: Arc<dyn ContentTransform>,
    retry: RetryPolicy,
}

impl SurgicalRefiner {
    /// Create a refiner
    #[must_use]
    pub fn new(transform: Arc<dyn ContentTransform>, retry: RetryPolicy) -> Self {
        Self { transform, retry }
    }

    /// Re-synthesize a failing patch; returns the original on any failure
    pub async fn refine(
        &self,
        patch: &DynamicImage,
        verdict: &RegionVerdict,
        region: &AtlasRegion,
    ) -> DynamicImage {
        let diagnosis = Diagnosis::classify(&verdict.reason);
        tracing::debug!(
            region = region.id.as_str(),
            ?diagnosis,
            "refining failed region"
        );

        let Ok(patch_png) = imageops::encode_png(patch) else {
            return patch.clone();
        };

        let prompt = correction_directive(diagnosis, region, &verdict.reason);
        let request = TransformRequest::text(prompt).with_image(ImageInput::png(patch_png));

        let response =
            match retry::execute(&self.retry, || self.transform.invoke(request.clone())).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        region = region.id.as_str(),
                        "refinement failed, keeping original patch: {err}"
                    );
                    return patch.clone();
                }
            };

        match response.first_image().map(imageops::decode) {
            Some(Ok(corrected)) => corrected,
            _ => {
                tracing::warn!(
                    region = region.id.as_str(),
                    "refinement returned no usable image, keeping original patch"
                );
                patch.clone()
            }
        }
    }
}

/// Diagnosis-specific directive, always constrained for seamless compositing
fn correction_directive(diagnosis: Diagnosis, region: &AtlasRegion, reason: &str) -> String {
    let strategy = match diagnosis {
        Diagnosis::ForceTypography => format!(
            "Re-render the text in this patch so it reads exactly: \"{}\". Match the original \
             stroke style and weight.",
            region.content
        ),
        Diagnosis::GrainInjection => "The surface looks artificially smooth. Re-inject natural \
             substrate grain matching a scanned document."
            .to_string(),
        Diagnosis::ArtifactRemoval => "Remove the synthetic artifacts and hallucinated content \
             from this patch; keep only what the region genuinely contains."
            .to_string(),
        Diagnosis::GeneralEnhancement => "Enhance this patch: recover legibility and remove \
             degradation without changing content."
            .to_string(),
    };

    format!(
        "This patch failed validation ({reason}).\n{strategy}\n\
         Constraints: preserve the patch's exact aspect ratio and its border lighting so it \
         composites back seamlessly."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use palimpsest_atlas::RegionId;
    use palimpsest_test_utils::{sample_text_region, solid_png, ScriptedTransform};
    use palimpsest_transform::TransformError;

    #[test]
    fn classification_by_keyword() {
        assert_eq!(Diagnosis::classify("illegible text"), Diagnosis::ForceTypography);
        assert_eq!(
            Diagnosis::classify("OCR mismatch against ground truth"),
            Diagnosis::ForceTypography
        );
        assert_eq!(
            Diagnosis::classify("surface looks oversmoothed and plastic"),
            Diagnosis::GrainInjection
        );
        assert_eq!(
            Diagnosis::classify("hallucinated stamp in corner"),
            Diagnosis::ArtifactRemoval
        );
        assert_eq!(
            Diagnosis::classify("synthetic artifacts visible in candidate"),
            Diagnosis::ArtifactRemoval
        );
        assert_eq!(
            Diagnosis::classify("structural similarity 0.41 below threshold 0.85"),
            Diagnosis::GeneralEnhancement
        );
    }

    #[test]
    fn typography_directive_carries_ground_truth() {
        let region = sample_text_region("r1", "INVOICE #42");
        let directive =
            correction_directive(Diagnosis::ForceTypography, &region, "illegible text");
        assert!(directive.contains("INVOICE #42"));
        assert!(directive.contains("aspect ratio"));
        assert!(directive.contains("border lighting"));
    }

    #[tokio::test]
    async fn successful_refinement_returns_corrected_patch() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_image(solid_png(8, 8, [9, 9, 9, 255]));

        let refiner = SurgicalRefiner::new(transform, RetryPolicy::none());
        let patch = imageops::decode(&solid_png(8, 8, [0, 0, 0, 255])).unwrap();
        let verdict = RegionVerdict::fail(RegionId::new("r1"), "illegible text", 0.85);
        let region = sample_text_region("r1", "INVOICE #42");

        let corrected = refiner.refine(&patch, &verdict, &region).await;
        assert_eq!(corrected.to_rgba8().get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[tokio::test]
    async fn transform_failure_returns_original_patch() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.fail_with(TransformError::Fatal("refused".into()));

        let refiner = SurgicalRefiner::new(transform, RetryPolicy::none());
        let patch = imageops::decode(&solid_png(8, 8, [7, 7, 7, 255])).unwrap();
        let verdict = RegionVerdict::fail(RegionId::new("r1"), "illegible text", 0.85);
        let region = sample_text_region("r1", "INVOICE #42");

        let out = refiner.refine(&patch, &verdict, &region).await;
        assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [7, 7, 7, 255]);
    }

    #[tokio::test]
    async fn undecodable_refinement_output_returns_original_patch() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_image(b"garbage".to_vec());

        let refiner = SurgicalRefiner::new(transform, RetryPolicy::none());
        let patch = imageops::decode(&solid_png(8, 8, [7, 7, 7, 255])).unwrap();
        let verdict = RegionVerdict::fail(RegionId::new("r1"), "plastic texture", 0.85);
        let region = sample_text_region("r1", "");

        let out = refiner.refine(&patch, &verdict, &region).await;
        assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [7, 7, 7, 255]);
    }
}
