//! Pipeline configuration
//!
//! Every heuristic constant in the pipeline (similarity cutoff, critical
//! subset size, refinement budget, perception payload bound) is a tunable
//! field here rather than a magic number in stage code.

use palimpsest_transform::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Output resolution requested from the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputResolution {
    /// Match the source resolution
    Source,
    /// Render at roughly 2K on the long edge
    TwoK,
    /// Render at roughly 4K on the long edge
    FourK,
}

impl OutputResolution {
    /// Phrasing used in render directives
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Source => "keep the source resolution",
            Self::TwoK => "render at 2K resolution",
            Self::FourK => "render at 4K resolution",
        }
    }
}

/// Color treatment requested from the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorStyle {
    /// Reproduce the original palette faithfully
    Faithful,
    /// Gently lift saturation and contrast
    Vivid,
    /// Neutral monochrome output
    Monochrome,
}

impl ColorStyle {
    /// Phrasing used in render directives
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Faithful => "reproduce the original colors faithfully",
            Self::Vivid => "gently lift saturation and contrast",
            Self::Monochrome => "render in neutral monochrome",
        }
    }
}

/// User-facing render settings consumed by the restoration renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Requested output resolution
    pub resolution: OutputResolution,
    /// Optional aspect ratio, e.g. `"3:4"`; source aspect when absent
    pub aspect_ratio: Option<String>,
    /// Color treatment
    pub color_style: ColorStyle,
    /// Guide the renderer with ground-truth text from the atlas
    pub text_priors: bool,
    /// Transfer substrate texture over stain regions
    pub texture_transfer: bool,
    /// Allow semantic repair of damaged regions
    pub semantic_repair: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: OutputResolution::Source,
            aspect_ratio: None,
            color_style: ColorStyle::Faithful,
            text_priors: true,
            texture_transfer: true,
            semantic_repair: true,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Render settings forwarded to the restoration renderer
    pub render: RenderSettings,
    /// Structural-similarity cutoff below which a legible region fails
    pub similarity_threshold: f64,
    /// Upper bound on the critical validation subset
    pub critical_region_limit: usize,
    /// Maximum surgical-refinement passes per run (and per region)
    pub max_refinement_passes: u32,
    /// Long-edge bound applied before submitting the image to perception
    pub perception_max_dim: u32,
    /// Retry policy applied to every transform call
    pub retry: RetryPolicy,
    /// Capacity of the per-image atlas cache
    pub atlas_cache_capacity: u64,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With render settings
    #[inline]
    #[must_use]
    pub fn with_render(mut self, render: RenderSettings) -> Self {
        self.render = render;
        self
    }

    /// With similarity threshold
    #[inline]
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// With critical-region limit
    #[inline]
    #[must_use]
    pub fn with_critical_region_limit(mut self, limit: usize) -> Self {
        self.critical_region_limit = limit;
        self
    }

    /// With refinement-pass budget
    #[inline]
    #[must_use]
    pub fn with_max_refinement_passes(mut self, passes: u32) -> Self {
        self.max_refinement_passes = passes;
        self
    }

    /// With perception payload bound
    #[inline]
    #[must_use]
    pub fn with_perception_max_dim(mut self, max_dim: u32) -> Self {
        self.perception_max_dim = max_dim;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render: RenderSettings::default(),
            similarity_threshold: 0.85,
            critical_region_limit: 5,
            max_refinement_passes: 2,
            perception_max_dim: 1024,
            retry: RetryPolicy::default(),
            atlas_cache_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.critical_region_limit, 5);
        assert_eq!(config.max_refinement_passes, 2);
        assert_eq!(config.perception_max_dim, 1024);
    }

    #[test]
    fn builder_clamps_threshold() {
        let config = PipelineConfig::new().with_similarity_threshold(1.5);
        assert_eq!(config.similarity_threshold, 1.0);
    }

    #[test]
    fn serde_round_trip() {
        let config = PipelineConfig::new().with_max_refinement_passes(1);
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_refinement_passes, 1);
    }
}
