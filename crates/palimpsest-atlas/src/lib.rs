//! Palimpsest Atlas - the shared data model of the restoration pipeline
//!
//! The **semantic atlas** is a structured, region-indexed description of a
//! document image: global physical properties plus a list of semantic regions
//! with ground-truth content. It is built once per run, immutable after
//! construction, and correlates with validation verdicts and refinement
//! requests through opaque [`RegionId`]s.
//!
//! Also here: [`ValidationReport`] (the judge's ephemeral output) and the
//! lenient JSON [`extract`] helpers for parsing model free-text responses.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod atlas;
pub mod error;
pub mod extract;
pub mod region;
pub mod report;

pub use atlas::{BlurClass, GlobalPhysics, NoiseProfile, SemanticAtlas};
pub use error::AtlasError;
pub use extract::{extract_json, parse_payload};
pub use region::{AtlasRegion, BBox, PixelRect, RegionId, RestorationStrategy, SemanticType};
pub use report::{RegionStatus, RegionVerdict, ValidationReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
