//! GLRLM, GLSZM 与 GLDM 共用的 "灰度 × 长度" 计数矩阵统计量.
//!
//! 矩阵第 `r` 行对应灰度 `i = gray_levels[r]`, 第 `c` 列对应长度 `j = c + 1`
//! (游程长度, 区域大小或相依体素个数).

use ndarray::{Array2, Axis};

use crate::consts::radiomics::EPS;

/// 由计数矩阵 `P(i, j)` 推导的一组统计量, 均已除以总计数 `N = Σ P`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EmphasisStats {
    /// `N = Σ P`.
    pub total: f64,
    /// `Σ P j`, 不做归一化.
    pub mass: f64,
    /// `Σ P / j²`.
    pub short: f64,
    /// `Σ P j²`.
    pub long: f64,
    /// `Σ P / i²`.
    pub low_gray: f64,
    /// `Σ P i²`.
    pub high_gray: f64,
    /// `Σ P / (i² j²)`.
    pub short_low_gray: f64,
    /// `Σ P i² / j²`.
    pub short_high_gray: f64,
    /// `Σ P j² / i²`.
    pub long_low_gray: f64,
    /// `Σ P i² j²`.
    pub long_high_gray: f64,
    /// `Σ_i (Σ_j P)² / N`.
    pub gray_non_uniformity: f64,
    /// `Σ_j (Σ_i P)² / N`.
    pub length_non_uniformity: f64,
    pub gray_variance: f64,
    pub length_variance: f64,
    pub entropy: f64,
}

impl EmphasisStats {
    /// 计算统计量. 矩阵为空 (总计数为 0) 时返回 `None`.
    pub fn new(gray_levels: &[u32], counts: &Array2<f64>) -> Option<Self> {
        debug_assert_eq!(gray_levels.len(), counts.nrows());
        let total = counts.sum();
        if total <= 0.0 {
            return None;
        }

        let mut s = Self {
            total,
            mass: 0.0,
            short: 0.0,
            long: 0.0,
            low_gray: 0.0,
            high_gray: 0.0,
            short_low_gray: 0.0,
            short_high_gray: 0.0,
            long_low_gray: 0.0,
            long_high_gray: 0.0,
            gray_non_uniformity: 0.0,
            length_non_uniformity: 0.0,
            gray_variance: 0.0,
            length_variance: 0.0,
            entropy: 0.0,
        };

        let mut mean_i = 0.0;
        let mut mean_j = 0.0;
        for ((r, c), p) in counts.indexed_iter() {
            if *p == 0.0 {
                continue;
            }
            let i2 = (gray_levels[r] as f64).powi(2);
            let j2 = ((c + 1) as f64).powi(2);
            s.mass += p * (c + 1) as f64;
            s.short += p / j2;
            s.long += p * j2;
            s.low_gray += p / i2;
            s.high_gray += p * i2;
            s.short_low_gray += p / (i2 * j2);
            s.short_high_gray += p * i2 / j2;
            s.long_low_gray += p * j2 / i2;
            s.long_high_gray += p * i2 * j2;

            let q = p / total;
            mean_i += q * gray_levels[r] as f64;
            mean_j += q * (c + 1) as f64;
            s.entropy -= q * (q + EPS).log2();
        }
        for ((r, c), p) in counts.indexed_iter() {
            if *p == 0.0 {
                continue;
            }
            let q = p / total;
            s.gray_variance += q * (gray_levels[r] as f64 - mean_i).powi(2);
            s.length_variance += q * ((c + 1) as f64 - mean_j).powi(2);
        }

        s.gray_non_uniformity = counts
            .sum_axis(Axis(1))
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            / total;
        s.length_non_uniformity = counts
            .sum_axis(Axis(0))
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            / total;

        for v in [
            &mut s.short,
            &mut s.long,
            &mut s.low_gray,
            &mut s.high_gray,
            &mut s.short_low_gray,
            &mut s.short_high_gray,
            &mut s.long_low_gray,
            &mut s.long_high_gray,
        ] {
            *v /= total;
        }
        Some(s)
    }

    /// `Σ_i (Σ_j P)² / N²`.
    #[inline]
    pub fn gray_non_uniformity_normalized(&self) -> f64 {
        self.gray_non_uniformity / self.total
    }

    /// `Σ_j (Σ_i P)² / N²`.
    #[inline]
    pub fn length_non_uniformity_normalized(&self) -> f64 {
        self.length_non_uniformity / self.total
    }
}

/// 按列 (长度) 增长的计数矩阵.
#[derive(Debug, Clone)]
pub(crate) struct LengthCounter {
    counts: Array2<f64>,
}

impl LengthCounter {
    pub fn new(n_levels: usize) -> Self {
        Self {
            counts: Array2::zeros((n_levels, 0)),
        }
    }

    /// 灰度行 `row` 上长度为 `length` (`>= 1`) 的计数加一.
    pub fn add(&mut self, row: usize, length: usize) {
        debug_assert!(length >= 1);
        let cols = self.counts.ncols();
        if length > cols {
            let mut grown = Array2::zeros((self.counts.nrows(), length));
            grown.slice_mut(ndarray::s![.., ..cols]).assign(&self.counts);
            self.counts = grown;
        }
        self.counts[(row, length - 1)] += 1.0;
    }

    #[inline]
    pub fn into_counts(self) -> Array2<f64> {
        self.counts
    }
}
