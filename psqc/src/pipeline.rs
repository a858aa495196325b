//! 分割质量评估的完整流程: 数据准备, 特征提取, 质量预测, 分类.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_QUALITY_CLASS_THRESHOLD;
use crate::error::PsqcResult;
use crate::model::{validate_threshold, ModelCoefficients, QualityClass};
use crate::prepare::{prepare_data, DualReferenceNormalizer, IntensityNormalizer};
use crate::prepare::{MaskSource, VolumeSource};
use crate::radiomics::extract_features;

/// 单次评估的参数.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsqcOptions {
    /// 输入图像是否已经归一化. 为 `false` 时先进行强度归一化.
    pub input_normalized: bool,

    /// 质量分类阈值, 取值 `[0, 100]`.
    pub quality_class_threshold: f64,
}

impl Default for PsqcOptions {
    fn default() -> Self {
        Self {
            input_normalized: false,
            quality_class_threshold: DEFAULT_QUALITY_CLASS_THRESHOLD,
        }
    }
}

/// 评估结果.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    /// 质量分数, 取值 `[0, 100]`, 保留两位小数.
    pub score: f64,

    /// 质量类别.
    pub class: QualityClass,
}

impl fmt::Display for QualityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quality Score = {}%, Quality Class: {}", self.score, self.class)
    }
}

/// 质量评估器. 持有只读的模型与归一化方法, 可在线程间共享.
pub struct Psqc<'m> {
    model: &'m ModelCoefficients,
    normalizer: Box<dyn IntensityNormalizer>,
}

impl Psqc<'static> {
    /// 使用内置模型与默认归一化方法.
    pub fn bundled() -> PsqcResult<Self> {
        Ok(Self::new(ModelCoefficients::bundled()?))
    }
}

impl<'m> Psqc<'m> {
    /// 使用给定模型与默认归一化方法.
    pub fn new(model: &'m ModelCoefficients) -> Self {
        Self {
            model,
            normalizer: Box::<DualReferenceNormalizer>::default(),
        }
    }

    /// 替换强度归一化方法.
    pub fn with_normalizer<N: IntensityNormalizer + 'static>(mut self, normalizer: N) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    /// 使用的模型.
    #[inline]
    pub fn model(&self) -> &ModelCoefficients {
        self.model
    }

    /// 评估 `mask` 对 `image` 的分割质量.
    ///
    /// 阈值非法时不做任何读取, 直接返回错误.
    pub fn run<I, M>(&self, image: I, mask: M, options: &PsqcOptions) -> PsqcResult<QualityResult>
    where
        I: Into<VolumeSource>,
        M: Into<MaskSource>,
    {
        let threshold = validate_threshold(options.quality_class_threshold)?;
        let (image, mask) = (image.into(), mask.into());
        let start = Instant::now();
        log::info!(
            "started measuring the quality of automated prostate segmentation of: image {image} and mask {mask}"
        );

        let pair = prepare_data(
            image,
            mask,
            options.input_normalized,
            self.normalizer.as_ref(),
        )?;
        log::debug!("data prepared in {:?}", start.elapsed());

        let features = extract_features(&pair, self.model.extraction())?;
        log::debug!(
            "{} features extracted in {:?}",
            features.len(),
            start.elapsed()
        );

        let score = self.model.predict(&features)?;
        let class = QualityClass::classify(score, threshold)?;
        let result = QualityResult { score, class };
        log::info!("{result}");
        log::info!(
            "done with measuring the quality of automated prostate segmentation. Time taken: {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(result)
    }
}

/// 以内置模型和默认归一化方法评估分割质量.
///
/// `image` 与 `mask` 可以是文件路径, 切片目录路径或内存中的数据.
pub fn psqc<I, M>(
    image: I,
    mask: M,
    input_normalized: bool,
    quality_class_threshold: f64,
) -> PsqcResult<QualityResult>
where
    I: Into<VolumeSource>,
    M: Into<MaskSource>,
{
    validate_threshold(quality_class_threshold)?;
    let options = PsqcOptions {
        input_normalized,
        quality_class_threshold,
    };
    Psqc::bundled()?.run(image, mask, &options)
}
