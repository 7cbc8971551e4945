//! Atlas regions: identifiers, bounding boxes, and semantic classification
//!
//! The `RegionId` is the join key across the atlas, validation reports, and
//! refinement requests. It is deliberately opaque: code that wants the text
//! form must go through `as_str`, which keeps ids from leaking into display
//! strings by accident.

use crate::error::AtlasError;
use serde::{Deserialize, Serialize};

/// Opaque region identifier, unique within one atlas
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Create a region id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Normalized bounding box in a 0-1000 coordinate space
///
/// Stored as `[ymin, xmin, ymax, xmax]` on the wire. Invariants (checked by
/// [`BBox::validate`]): `ymin < ymax`, `xmin < xmax`, all components within
/// `[0, 1000]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u16; 4]", into = "[u16; 4]")]
pub struct BBox {
    pub ymin: u16,
    pub xmin: u16,
    pub ymax: u16,
    pub xmax: u16,
}

/// Pixel-space rectangle derived from a normalized bbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BBox {
    /// Coordinate-space upper bound
    pub const SCALE: u16 = 1000;

    /// Create a bbox without validating it
    #[inline]
    #[must_use]
    pub fn new(ymin: u16, xmin: u16, ymax: u16, xmax: u16) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    /// Check the normalized-space invariants
    ///
    /// # Errors
    /// Returns [`AtlasError::InvalidBBox`] describing the first violated
    /// invariant.
    pub fn validate(&self) -> Result<(), AtlasError> {
        let detail = if self.ymin >= self.ymax {
            Some("ymin must be < ymax")
        } else if self.xmin >= self.xmax {
            Some("xmin must be < xmax")
        } else if self.ymax > Self::SCALE || self.xmax > Self::SCALE {
            Some("components must be <= 1000")
        } else {
            None
        };

        match detail {
            None => Ok(()),
            Some(detail) => Err(AtlasError::InvalidBBox {
                ymin: self.ymin,
                xmin: self.xmin,
                ymax: self.ymax,
                xmax: self.xmax,
                detail: detail.to_string(),
            }),
        }
    }

    /// Map to pixel space for an image of `width` x `height`
    ///
    /// Min edges floor, max edges ceil, so a valid bbox yields a rectangle
    /// with positive width and height for any positive image dimensions.
    #[must_use]
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> PixelRect {
        let scale = u64::from(Self::SCALE);
        let floor = |coord: u16, dim: u32| -> u64 { u64::from(coord) * u64::from(dim) / scale };
        let ceil = |coord: u16, dim: u32| -> u64 {
            (u64::from(coord) * u64::from(dim)).div_ceil(scale).min(u64::from(dim))
        };

        // For a valid bbox, min < max guarantees x0 < width and y0 < height,
        // so the +1 lower bound never pushes past the image edge.
        let x0 = floor(self.xmin, width);
        let y0 = floor(self.ymin, height);
        let x1 = ceil(self.xmax, width).max(x0 + 1);
        let y1 = ceil(self.ymax, height).max(y0 + 1);

        #[allow(clippy::cast_possible_truncation)]
        PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }
}

impl From<[u16; 4]> for BBox {
    fn from([ymin, xmin, ymax, xmax]: [u16; 4]) -> Self {
        Self::new(ymin, xmin, ymax, xmax)
    }
}

impl From<BBox> for [u16; 4] {
    fn from(b: BBox) -> Self {
        [b.ymin, b.xmin, b.ymax, b.xmax]
    }
}

/// Closed set of semantic region classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// Printed or handwritten text in ink
    InkText,
    /// Stamp or seal pigment
    StampPigment,
    /// Signature ink
    SignatureInk,
    /// Halftone photographic content
    HalftonePhoto,
    /// Background staining or discoloration
    BackgroundStain,
}

impl SemanticType {
    /// Validation priority; lower ranks earlier in critical-subset selection
    ///
    /// Text-bearing classes outrank everything else: a wrong character is a
    /// worse restoration defect than an off-texture stain.
    #[inline]
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::InkText => 0,
            Self::SignatureInk => 1,
            Self::StampPigment => 2,
            Self::HalftonePhoto => 3,
            Self::BackgroundStain => 4,
        }
    }

    /// Whether this class carries textual ground truth
    #[inline]
    #[must_use]
    pub fn is_textual(self) -> bool {
        matches!(self, Self::InkText | Self::SignatureInk)
    }
}

/// Per-region restoration hint consumed by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorationStrategy {
    Sharpen,
    PreserveColor,
    DenoiseOnly,
    Descreen,
}

impl RestorationStrategy {
    /// Directive phrasing forwarded to the transform
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Sharpen => "sharpen edges and recover stroke contrast",
            Self::PreserveColor => "preserve the original pigment color exactly",
            Self::DenoiseOnly => "denoise only, do not reshape content",
            Self::Descreen => "remove the halftone screen without blurring detail",
        }
    }
}

/// One semantically meaningful sub-area of the document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasRegion {
    /// Stable identifier, unique within the atlas
    pub id: RegionId,
    /// Normalized bounding box
    pub bbox: BBox,
    /// Ground-truth content the region should carry (e.g. the exact text)
    pub content: String,
    /// Semantic class
    pub semantic_type: SemanticType,
    /// Hint for the restoration renderer
    pub restoration_strategy: RestorationStrategy,
    /// Perception confidence, 0-1
    pub confidence: f64,
}

/// Force a confidence into the unit interval; non-finite values map to zero
fn unit_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl AtlasRegion {
    /// Create a region
    #[must_use]
    pub fn new(
        id: RegionId,
        bbox: BBox,
        content: impl Into<String>,
        semantic_type: SemanticType,
        restoration_strategy: RestorationStrategy,
        confidence: f64,
    ) -> Self {
        Self {
            id,
            bbox,
            content: content.into(),
            semantic_type,
            restoration_strategy,
            confidence: unit_confidence(confidence),
        }
    }

    /// Re-apply the construction-time clamps after wire deserialization
    ///
    /// Serde fills fields directly and bypasses [`AtlasRegion::new`], so
    /// values arriving off the wire re-enter the invariant range here.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.confidence = unit_confidence(self.confidence);
        self
    }
}
