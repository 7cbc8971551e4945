//! Restoration renderer
//!
//! Produces one candidate restored image from the input plus the atlas's
//! per-region priors. Directive blocks are composed conditionally on data
//! presence: a block whose atlas prerequisite is empty is omitted entirely,
//! because a vacuous directive dilutes the signal of the ones that matter.
//!
//! This is the one load-bearing stage: failures propagate verbatim to the
//! orchestrator, with no fallback.

use crate::config::RenderSettings;
use palimpsest_atlas::{RestorationStrategy, SemanticAtlas, SemanticType};
use palimpsest_transform::{
    retry, ContentTransform, ImageInput, RetryPolicy, TransformError, TransformRequest,
};
use std::fmt::Write as _;
use std::sync::Arc;

/// Rendering stage: produces the restored candidate
pub struct RestorationRenderer {
    transform: Arc<dyn ContentTransform>,
    retry: RetryPolicy,
}

impl RestorationRenderer {
    /// Create a renderer
    #[must_use]
    pub fn new(transform: Arc<dyn ContentTransform>, retry: RetryPolicy) -> Self {
        Self { transform, retry }
    }

    /// Render one candidate restored image
    ///
    /// # Errors
    /// Propagates the transform's classified error unchanged, or a fatal
    /// error when the transform returned no image.
    pub async fn render(
        &self,
        image: &[u8],
        mime_type: &str,
        atlas: &SemanticAtlas,
        settings: &RenderSettings,
    ) -> Result<Vec<u8>, TransformError> {
        let directives = compose_directives(atlas, settings);
        tracing::debug!(len = directives.len(), "composed restoration directives");

        let request = TransformRequest::text(directives)
            .with_image(ImageInput::new(image.to_vec(), mime_type));

        let response = retry::execute(&self.retry, || self.transform.invoke(request.clone())).await?;

        response
            .first_image()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| TransformError::Fatal("transform returned no restored image".to_string()))
    }
}

/// Build the directive set from the atlas and user settings
///
/// Each block is keyed on data presence; nothing is emitted for a feature
/// whose prerequisite is empty.
fn compose_directives(atlas: &SemanticAtlas, settings: &RenderSettings) -> String {
    let mut out = String::from(
        "Restore this damaged document image. Recover legibility and remove degradation \
         while keeping the content identical.\n",
    );

    let _ = writeln!(
        out,
        "Output: {}; {}.",
        settings.resolution.directive(),
        settings.color_style.directive()
    );
    if let Some(aspect) = &settings.aspect_ratio {
        let _ = writeln!(out, "Target aspect ratio: {aspect}.");
    }

    if !atlas.is_empty() {
        let physics = &atlas.global_physics;
        let _ = writeln!(
            out,
            "Substrate: {}; noise profile {:?}; blur {:?}; lighting {}. Overall degradation {}/100.",
            physics.substrate_color,
            physics.noise_profile,
            physics.blur_class,
            physics.lighting,
            atlas.degradation_score
        );

        for strategy in [
            RestorationStrategy::Sharpen,
            RestorationStrategy::PreserveColor,
            RestorationStrategy::DenoiseOnly,
            RestorationStrategy::Descreen,
        ] {
            let ids: Vec<&str> = atlas
                .regions
                .iter()
                .filter(|r| r.restoration_strategy == strategy)
                .map(|r| r.id.as_str())
                .collect();
            if !ids.is_empty() {
                let _ = writeln!(out, "Regions {}: {}.", ids.join(", "), strategy.directive());
            }
        }
    }

    if settings.text_priors {
        let textual: Vec<_> = atlas
            .regions
            .iter()
            .filter(|r| r.semantic_type.is_textual() && !r.content.is_empty())
            .collect();
        if !textual.is_empty() {
            out.push_str("Text ground truth; each region must read exactly as given:\n");
            for region in textual {
                let _ = writeln!(out, "  - {}: \"{}\"", region.id.as_str(), region.content);
            }
        }
    }

    if settings.texture_transfer
        && atlas
            .regions_of_type(SemanticType::BackgroundStain)
            .next()
            .is_some()
    {
        out.push_str(
            "Stain regions carry substrate texture: replace staining with clean substrate \
             matching the surrounding grain, do not invent content there.\n",
        );
    }

    if settings.semantic_repair && !atlas.is_empty() {
        out.push_str(
            "Where strokes are broken or pigment is missing, repair them to match the region's \
             stated content and type.\n",
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use palimpsest_atlas::{GlobalPhysics, SemanticAtlas};
    use palimpsest_test_utils::{sample_atlas, sample_text_region, solid_png, ScriptedTransform};

    #[test]
    fn empty_atlas_emits_no_vacuous_blocks() {
        let directives = compose_directives(&SemanticAtlas::empty(), &RenderSettings::default());
        assert!(!directives.contains("ground truth"));
        assert!(!directives.contains("Stain regions"));
        assert!(!directives.contains("repair"));
        assert!(!directives.contains("Substrate:"));
        // The base restoration instruction is always present.
        assert!(directives.contains("Restore this damaged document"));
    }

    #[test]
    fn text_priors_block_requires_textual_regions() {
        let atlas = sample_atlas();
        let with = compose_directives(&atlas, &RenderSettings::default());
        assert!(with.contains("INVOICE #42"));

        let disabled = RenderSettings {
            text_priors: false,
            ..RenderSettings::default()
        };
        assert!(!compose_directives(&atlas, &disabled).contains("INVOICE #42"));
    }

    #[test]
    fn texture_block_requires_stain_regions() {
        let no_stains = SemanticAtlas::new(
            GlobalPhysics::neutral(),
            30,
            vec![sample_text_region("r1", "TEXT")],
        );
        let directives = compose_directives(&no_stains, &RenderSettings::default());
        assert!(!directives.contains("Stain regions"));

        let directives = compose_directives(&sample_atlas(), &RenderSettings::default());
        assert!(directives.contains("Stain regions"));
    }

    #[test]
    fn strategy_hints_are_grouped_by_strategy() {
        let directives = compose_directives(&sample_atlas(), &RenderSettings::default());
        assert!(directives.contains("Regions r1: sharpen edges"));
        assert!(directives.contains("Regions r2: denoise only"));
    }

    #[tokio::test]
    async fn render_returns_first_image() {
        let transform = Arc::new(ScriptedTransform::new());
        let candidate = solid_png(10, 10, [1, 2, 3, 255]);
        transform.respond_with_image(candidate.clone());

        let renderer = RestorationRenderer::new(transform, RetryPolicy::none());
        let out = renderer
            .render(&solid_png(10, 10, [0, 0, 0, 255]), "image/png", &sample_atlas(), &RenderSettings::default())
            .await
            .unwrap();
        assert_eq!(out, candidate);
    }

    #[tokio::test]
    async fn render_failure_propagates_classification() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.fail_with(TransformError::InvalidAuth("key revoked".into()));

        let renderer = RestorationRenderer::new(transform, RetryPolicy::none());
        let err = renderer
            .render(&solid_png(4, 4, [0, 0, 0, 255]), "image/png", &SemanticAtlas::empty(), &RenderSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidAuth(_)));
    }

    #[tokio::test]
    async fn imageless_response_is_fatal() {
        let transform = Arc::new(ScriptedTransform::new());
        transform.respond_with_text("I restored it, trust me");

        let renderer = RestorationRenderer::new(transform, RetryPolicy::none());
        let err = renderer
            .render(&solid_png(4, 4, [0, 0, 0, 255]), "image/png", &SemanticAtlas::empty(), &RenderSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Fatal(_)));
    }
}
