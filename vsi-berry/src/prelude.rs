//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx2dF};

pub use crate::{
    BoundingBox, Cell, CompactHemisphereMap, CompactRegionMap, PhysicalCell, SlideRecord,
};

pub use crate::chunk::{AccumChunker, ChunkConfig, ChunkDescriptor, DuplicateFilter, ImageChunker};
pub use crate::detect::{detect_into_record, detect_slide, Detector};

pub use crate::consts::hemisphere::{HEMI_LEFT, HEMI_NONE, HEMI_RIGHT};
pub use crate::consts::{ATLAS_LAST_INDEX, ATLAS_MAP_SHAPE, ATLAS_SCALE, VSI_PIXEL_SCALE};

pub use crate::analysis::{region_of_cell, tally_experiment, RegionHit, RegionTally};
pub use crate::atlas::{Structure, StructureIndex};
pub use crate::conversion::compute_region_offset;

pub use crate::io::metadata::{ExperimentMetadata, SlideMeta};
pub use crate::io::store::RecordDb;
