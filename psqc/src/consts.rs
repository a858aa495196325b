//! 通用常量.

/// 质量分数下限.
pub const SCORE_MIN: f64 = 0.0;

/// 质量分数上限.
pub const SCORE_MAX: f64 = 100.0;

/// 质量分数保留的小数位数.
pub const SCORE_DECIMALS: i32 = 2;

/// 默认质量分类阈值. 分数不低于该值即为 "Acceptable".
pub const DEFAULT_QUALITY_CLASS_THRESHOLD: f64 = 85.0;

/// 指定替换模型系数文件路径的环境变量.
pub const MODEL_COEF_ENV: &str = "PSQC_MODEL_COEF";

/// 质量类别的展示文本.
pub mod label {
    /// 分割质量可接受.
    pub const ACCEPTABLE: &str = "Acceptable";

    /// 分割质量不可接受.
    pub const NOT_ACCEPTABLE: &str = "NOT Acceptable";
}

/// 判定两个网格一致时使用的容差 (分辨率, 原点, 方向).
pub const GEOMETRY_TOLERANCE: f64 = 1e-4;

/// radiomics 特征计算相关常量.
pub mod radiomics {
    /// 熵计算中防止 `log2(0)` 的偏移量, 即 `f64` 的机器精度.
    pub const EPS: f64 = f64::EPSILON;

    /// 默认离散化 bin 个数. bin 宽度 = 区域内强度极差 / bin 个数.
    pub const DEFAULT_BIN_COUNT: u32 = 64;

    /// 计算能量类特征时对强度施加的平移量.
    pub const VOXEL_ARRAY_SHIFT: f64 = 0.0;

    /// GLDM 中判定两个体素 "相依" 的最大灰度差.
    pub const GLDM_ALPHA: u32 = 0;

    /// NGTDM 粗糙度分母为 0 时的取值.
    pub const COARSENESS_ON_ZERO: f64 = 1e6;

    /// 协方差矩阵特征值的负数容忍度. 绝对值小于它的负数视为 0.
    pub const EIGEN_NEGATIVE_TOLERANCE: f64 = 1e-10;
}

/// 默认的双参考强度归一化参数.
///
/// 低参考 (类肌肉组织) 与高参考 (类脂肪组织) 由整幅图像的固定百分位估计,
/// 并被线性映射到固定目标值. 这些值与模型训练时的预处理一同冻结.
pub mod normalize {
    /// 低参考强度所在百分位.
    pub const LOW_REFERENCE_PERCENTILE: f64 = 5.0;

    /// 高参考强度所在百分位.
    pub const HIGH_REFERENCE_PERCENTILE: f64 = 95.0;

    /// 低参考强度的目标值.
    pub const LOW_REFERENCE_TARGET: f32 = 40.0;

    /// 高参考强度的目标值.
    pub const HIGH_REFERENCE_TARGET: f32 = 121.0;
}
