//! The semantic atlas: global physics plus a region inventory
//!
//! Built once per run by the perception stage and read-only afterwards.
//! Restoration, judging, and refinement all read the same shared atlas.

use crate::region::{AtlasRegion, RegionId};
use serde::{Deserialize, Serialize};

/// Overall noise characterization of the substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseProfile {
    Clean,
    Gaussian,
    SaltPepper,
    PaperGrain,
    JpegArtifacts,
}

/// Dominant blur kernel class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurClass {
    None,
    Motion,
    Defocus,
    LensSoftness,
}

/// Global physical properties of the document image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalPhysics {
    /// Dominant substrate color, e.g. `"aged ivory"` or `"#f2e8d0"`
    pub substrate_color: String,
    /// Noise characterization
    pub noise_profile: NoiseProfile,
    /// Blur characterization
    pub blur_class: BlurClass,
    /// Lighting condition, free text (e.g. `"raking light from upper left"`)
    pub lighting: String,
}

impl GlobalPhysics {
    /// Neutral physics used by the empty atlas
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            substrate_color: "neutral white".to_string(),
            noise_profile: NoiseProfile::Clean,
            blur_class: BlurClass::None,
            lighting: "even diffuse".to_string(),
        }
    }
}

/// Structured, region-indexed description of one document image
///
/// Immutable after construction; share as `Arc<SemanticAtlas>` across stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticAtlas {
    /// Global physical properties
    pub global_physics: GlobalPhysics,
    /// Overall degradation severity, 0-100
    pub degradation_score: u8,
    /// Semantic regions, perception order
    pub regions: Vec<AtlasRegion>,
}

impl SemanticAtlas {
    /// Create an atlas, clamping the degradation score into range
    #[must_use]
    pub fn new(global_physics: GlobalPhysics, degradation_score: u8, regions: Vec<AtlasRegion>) -> Self {
        Self {
            global_physics,
            degradation_score: degradation_score.min(100),
            regions,
        }
    }

    /// The safe fail-open atlas: neutral physics, no regions, zero severity
    #[must_use]
    pub fn empty() -> Self {
        Self {
            global_physics: GlobalPhysics::neutral(),
            degradation_score: 0,
            regions: Vec::new(),
        }
    }

    /// Whether the atlas carries no semantic guidance
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Look up a region by id
    #[must_use]
    pub fn region(&self, id: &RegionId) -> Option<&AtlasRegion> {
        self.regions.iter().find(|r| &r.id == id)
    }

    /// Select the critical validation subset: up to `limit` regions ordered
    /// by semantic-type priority, ties broken by descending confidence
    ///
    /// Not every region is re-validated; this sampling bounds judging cost.
    #[must_use]
    pub fn critical_regions(&self, limit: usize) -> Vec<&AtlasRegion> {
        let mut ranked: Vec<&AtlasRegion> = self.regions.iter().collect();
        ranked.sort_by(|a, b| {
            a.semantic_type
                .priority()
                .cmp(&b.semantic_type.priority())
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        ranked.truncate(limit);
        ranked
    }

    /// Regions of a given semantic class
    pub fn regions_of_type(
        &self,
        semantic_type: crate::region::SemanticType,
    ) -> impl Iterator<Item = &AtlasRegion> {
        self.regions
            .iter()
            .filter(move |r| r.semantic_type == semantic_type)
    }
}
