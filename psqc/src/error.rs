//! 运行时错误.
//!
//! 所有阶段的错误最终都汇总为 [`PsqcError`], 并原样传递给顶层调用者.

use std::path::PathBuf;

use thiserror::Error;

use crate::radiomics::{FeatureClass, Region};

/// 质量预测统一错误类型.
#[derive(Debug, Error)]
pub enum PsqcError {
    /// 输入无法读取, 或模型系数文件无法解析.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// 图像与标注的空间网格无法对齐.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// 标注退化, 或某类特征无法计算.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// 特征向量与模型系数不匹配.
    #[error("scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// 参数非法, 例如阈值不在 `[0, 100]` 内.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// 质量预测运行时结果.
pub type PsqcResult<T> = Result<T, PsqcError>;

/// 读取 3D 数据或模型系数时的错误.
#[derive(Debug, Error)]
pub enum LoadError {
    /// 路径不存在.
    #[error("path `{0}` does not exist")]
    NotFound(PathBuf),

    /// nifti 文件读取失败.
    #[error("failed to read nifti file `{path}`: {source}")]
    Nifti {
        /// 文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: nifti::NiftiError,
    },

    /// DICOM 文件读取或解析失败.
    #[error("failed to read DICOM file `{path}`: {message}")]
    Dicom {
        /// 文件路径.
        path: PathBuf,
        /// 错误描述.
        message: String,
    },

    /// 二维切片图像读取失败.
    #[error("failed to read slice image `{path}`: {source}")]
    Raster {
        /// 文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: image::ImageError,
    },

    /// 其他底层 I/O 错误.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        /// 出错路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// 文件格式或数据布局不受支持.
    #[error("unsupported volume `{path}`: {reason}")]
    Unsupported {
        /// 文件路径.
        path: PathBuf,
        /// 原因.
        reason: String,
    },

    /// 目录中没有可读取的切片.
    #[error("no readable slice in directory `{0}`")]
    EmptySeries(PathBuf),

    /// 切片序列不一致 (尺寸不同等).
    #[error("inconsistent slice series in `{path}`: {reason}")]
    InconsistentSeries {
        /// 目录路径.
        path: PathBuf,
        /// 原因.
        reason: String,
    },

    /// 模型系数文件非法.
    #[error("invalid model artifact: {0}")]
    Model(String),
}

/// 空间网格错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// 某个轴的体素个数为 0. 参数为数据名称.
    #[error("{0} has an empty voxel grid")]
    EmptyGrid(&'static str),

    /// 体素分辨率不是正的有限值. 按 `[x, y, z]` 给出.
    #[error("invalid voxel spacing {0:?}")]
    InvalidSpacing([f64; 3]),

    /// 方向矩阵奇异或含非有限值.
    #[error("direction matrix is singular")]
    SingularDirection,

    /// 标注前景在物理空间中与图像网格不相交.
    #[error("mask foreground lies outside the image grid")]
    Disjoint,
}

/// 特征提取错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    /// 标注没有前景体素.
    #[error("mask has no foreground voxel")]
    EmptyMask,

    /// 某个区域 (如 apex) 没有分到任何切片.
    #[error("region `{0}` is empty")]
    EmptyRegion(Region),

    /// 区域内强度为常数, 无法确定离散化 bin 宽度.
    #[error("intensities inside region `{0}` are flat")]
    FlatIntensity(Region),

    /// 区域内存在 NaN 或无穷强度.
    #[error("non-finite intensity inside region `{0}`")]
    NonFiniteIntensity(Region),

    /// 形状特征无法计算 (体素不足).
    #[error("degenerate shape in region `{0}`")]
    DegenerateShape(Region),

    /// 纹理矩阵在所有方向上均为空.
    #[error("empty `{1}` matrix in region `{0}`")]
    DegenerateTexture(Region, FeatureClass),
}

/// 打分错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// 特征向量中缺少模型需要的特征.
    #[error("feature `{0}` is missing from the feature vector")]
    MissingFeature(String),

    /// 特征值不是有限实数.
    #[error("feature `{0}` has non-finite value {1}")]
    NonFiniteFeature(String, f64),

    /// 线性模型输出不是有限实数.
    #[error("raw score is not finite")]
    NonFiniteScore,
}
