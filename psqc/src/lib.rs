#![warn(missing_docs)]
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 前列腺自动分割质量控制 (PSQC).
//!
//! 对 T2 加权 MRI 的 3D 图像及其自动分割标注, 提取三个区域 (整个前列腺, 尖部, 底部)
//! 的 radiomics 特征, 以冻结的 LASSO 线性模型给出 `[0, 100]` 内的质量分数,
//! 并按阈值判定 "Acceptable" / "NOT Acceptable".
//!
//! 该 crate 仅提供 `safe` 接口, 且只是一个同步库: 不提供命令行, 不训练模型.
//!
//! # 注意
//!
//! 1. 库本身不安装任何 logger, 日志通过 `log` 门面输出, 由调用者决定去向.
//! 2. 内置模型只在首次使用时解析一次, 可以在线程间共享.
//!    设置环境变量 `PSQC_MODEL_COEF` 可以替换为其他模型文件
//!    (见 [`ModelCoefficients::from_env_or_bundled`]).
//!
//! # 示例
//!
//! ```no_run
//! let result = psqc::psqc("case01/t2.nii.gz", "case01/mask.nii.gz", false, 85.0)?;
//! println!("{result}");
//! # Ok::<(), psqc::PsqcError>(())
//! ```
//!
//! # 开发计划
//!
//! ### 数据读取 ✅
//!
//! nii / nii.gz 单文件, DICOM 序列目录, 二维切片图像目录 (png / tif / bmp / pgm).
//! 空间信息统一转换到 LPS 物理坐标系.
//!
//! 实现位于 `psqc/src/data`.
//!
//! ### 网格对齐与强度归一化 ✅
//!
//! 标注与图像网格不一致时, 以最近邻插值将标注重采样到图像网格.
//! 归一化方法以 trait 注入, 默认为双参考线性变换.
//!
//! 实现位于 `psqc/src/prepare`.
//!
//! ### radiomics 特征 ✅
//!
//! firstorder, shape, glcm, glrlm, glszm, ngtdm, gldm 共 7 类, 每个区域 107 个,
//! 总计 321 个. 定义与 PyRadiomics 一致.
//!
//! 实现位于 `psqc/src/radiomics`.
//!
//! ### 质量预测与分类 ✅
//!
//! 1. 模型文件格式与校验 ✅
//! 2. 分数截断到 `[0, 100]` 并保留两位小数 ✅
//! 3. 阈值校验 ✅
//!
//! 实现位于 `psqc/src/model` 与 `psqc/src/pipeline.rs`.
//!
//! ### 训练所得的模型系数 ⌛️
//!
//! 内置模型目前只包含截距, 全部权重为 0. 训练所得的权重需要替换
//! `psqc/src/model/model_coef.json`.

/// 二维索引, 按 `(y, x)` 排列.
pub type Idx2d = (usize, usize);

/// 三维索引, 按 `(z, y, x)` 排列.
pub type Idx3d = (usize, usize, usize);

pub mod consts;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prepare;
pub mod radiomics;

mod stats;

#[cfg(test)]
mod phantom;

pub mod prelude;

pub use data::{Geometry, Mask, SpatialAttr, Volume, VolumePair};
pub use error::{PsqcError, PsqcResult};
pub use model::{ModelCoefficients, QualityClass};
pub use pipeline::{psqc, Psqc, PsqcOptions, QualityResult};
pub use prepare::{MaskSource, VolumeSource};
