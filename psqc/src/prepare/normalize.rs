//! 强度归一化.

use crate::consts::normalize::{
    HIGH_REFERENCE_PERCENTILE, HIGH_REFERENCE_TARGET, LOW_REFERENCE_PERCENTILE,
    LOW_REFERENCE_TARGET,
};
use crate::data::Volume;
use crate::error::{PsqcError, PsqcResult};
use crate::stats::{percentile_sorted, sorted_finite};

/// 将任意 T2 加权图像的强度映射到模型训练时使用的标准尺度.
///
/// 实现必须是确定性的, 且可以在线程之间共享.
pub trait IntensityNormalizer: Send + Sync {
    /// 返回归一化后的新图像, 空间信息保持不变.
    fn normalize(&self, image: &Volume) -> PsqcResult<Volume>;
}

/// 双参考线性归一化.
///
/// 以整幅图像强度的低, 高两个百分位作为参考 (分别近似肌肉与脂肪组织),
/// 线性映射到两个固定目标值. 该变换是只读的; 若要修改参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DualReferenceNormalizer {
    low_percentile: f64,
    high_percentile: f64,
    low_target: f32,
    high_target: f32,
}

impl Default for DualReferenceNormalizer {
    fn default() -> Self {
        Self {
            low_percentile: LOW_REFERENCE_PERCENTILE,
            high_percentile: HIGH_REFERENCE_PERCENTILE,
            low_target: LOW_REFERENCE_TARGET,
            high_target: HIGH_REFERENCE_TARGET,
        }
    }
}

impl DualReferenceNormalizer {
    /// 构建归一化器.
    ///
    /// 要求 `0 <= low_percentile < high_percentile <= 100`, 目标值有限.
    pub fn new(
        low_percentile: f64,
        high_percentile: f64,
        low_target: f32,
        high_target: f32,
    ) -> PsqcResult<Self> {
        let valid = (0.0..=100.0).contains(&low_percentile)
            && (0.0..=100.0).contains(&high_percentile)
            && low_percentile < high_percentile
            && low_target.is_finite()
            && high_target.is_finite();
        if !valid {
            return Err(PsqcError::InvalidArgument(format!(
                "invalid normalizer references ({low_percentile}, {high_percentile}) -> \
                 ({low_target}, {high_target})"
            )));
        }
        Ok(Self {
            low_percentile,
            high_percentile,
            low_target,
            high_target,
        })
    }

    /// 估计 `image` 的低, 高参考强度. 忽略非有限体素; 没有有限体素时返回 `None`.
    pub fn references(&self, image: &Volume) -> Option<(f64, f64)> {
        let sorted = sorted_finite(image.data().iter().map(|v| *v as f64));
        if sorted.is_empty() {
            return None;
        }
        Some((
            percentile_sorted(&sorted, self.low_percentile),
            percentile_sorted(&sorted, self.high_percentile),
        ))
    }

    /// 在给定参考强度下, 强度 `x` 对应的归一化值.
    ///
    /// 两个参考相同时, 所有有限强度都映射到低目标值. 非有限值原样返回.
    #[inline]
    pub fn eval(&self, x: f32, (low, high): (f64, f64)) -> f32 {
        if !x.is_finite() {
            return x;
        }
        let range = high - low;
        if range <= 0.0 {
            return self.low_target;
        }
        let t = (x as f64 - low) / range;
        (self.low_target as f64 + t * (self.high_target - self.low_target) as f64) as f32
    }
}

impl IntensityNormalizer for DualReferenceNormalizer {
    fn normalize(&self, image: &Volume) -> PsqcResult<Volume> {
        let mut out = image.clone();
        let Some(refs) = self.references(image) else {
            log::debug!("no finite intensity, normalization skipped");
            return Ok(out);
        };
        log::debug!("normalization references: {refs:?}");
        out.data_mut().mapv_inplace(|v| self.eval(v, refs));
        Ok(out)
    }
}
