//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{Geometry, Mask, SpatialAttr, Volume, VolumePair};
pub use crate::error::{
    ExtractionError, GeometryError, LoadError, PsqcError, PsqcResult, ScoringError,
};

pub use crate::prepare::{
    prepare_data, DualReferenceNormalizer, IntensityNormalizer, MaskSource, VolumeSource,
};
pub use crate::radiomics::{extract_features, ExtractionSettings, FeatureClass, FeatureVector, Region};

pub use crate::model::{Coefficient, ModelCoefficients, QualityClass};
pub use crate::pipeline::{psqc, Psqc, PsqcOptions, QualityResult};

pub use crate::consts::DEFAULT_QUALITY_CLASS_THRESHOLD;
