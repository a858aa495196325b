//! radiomics 特征提取.
//!
//! 特征定义与 PyRadiomics 一致 (3D, 距离 1, 对称 GLCM, 各方向取平均, 熵以 2 为底).
//! 每个区域分别裁剪与离散化, 再逐类计算特征. 完整特征向量按
//! "区域 - 特征类 - 特征名" 的顺序排列, 特征标识符形如 `wholeprostate_glcm_Idmn`.
//!
//! 所有迭代顺序固定, 不使用并行归约, 因此相同输入总是得到逐位相同的结果.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;

use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::consts::radiomics::DEFAULT_BIN_COUNT;
use crate::data::{SpatialAttr, VolumePair};
use crate::error::ExtractionError;

mod cube_table;
mod firstorder;
mod glcm;
mod gldm;
mod glrlm;
mod glszm;
mod matrix;
mod neighbours;
mod ngtdm;
mod roi;
mod shape;

use roi::Roi;

/// 单个特征类的计算结果: `(特征名, 值)`.
pub(crate) type NamedFeatures = Vec<(&'static str, f64)>;

/// 前列腺区域.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// 整个前列腺 (全部含前景的切片).
    WholeProstate,
    /// 尖部: 含前景切片中 z 索引最小的三分之一.
    Apex,
    /// 底部: 含前景切片中 z 索引最大的三分之一.
    Base,
}

impl Region {
    /// 全部区域, 按特征向量中的顺序排列.
    pub const ALL: [Region; 3] = [Region::WholeProstate, Region::Apex, Region::Base];

    /// 特征标识符中使用的区域名.
    pub const fn name(self) -> &'static str {
        match self {
            Region::WholeProstate => "wholeprostate",
            Region::Apex => "apex",
            Region::Base => "base",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 特征类.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureClass {
    /// 一阶统计 (18 个).
    Firstorder,
    /// 三维形状 (14 个).
    Shape,
    /// 灰度共生矩阵 (24 个).
    Glcm,
    /// 灰度游程矩阵 (16 个).
    Glrlm,
    /// 灰度区域大小矩阵 (16 个).
    Glszm,
    /// 邻域灰度差矩阵 (5 个).
    Ngtdm,
    /// 灰度相依矩阵 (14 个).
    Gldm,
}

impl FeatureClass {
    /// 全部特征类, 按特征向量中的顺序排列.
    pub const ALL: [FeatureClass; 7] = [
        FeatureClass::Firstorder,
        FeatureClass::Shape,
        FeatureClass::Glcm,
        FeatureClass::Glrlm,
        FeatureClass::Glszm,
        FeatureClass::Ngtdm,
        FeatureClass::Gldm,
    ];

    /// 特征标识符中使用的类名.
    pub const fn name(self) -> &'static str {
        match self {
            FeatureClass::Firstorder => "firstorder",
            FeatureClass::Shape => "shape",
            FeatureClass::Glcm => "glcm",
            FeatureClass::Glrlm => "glrlm",
            FeatureClass::Glszm => "glszm",
            FeatureClass::Ngtdm => "ngtdm",
            FeatureClass::Gldm => "gldm",
        }
    }

    /// 该类包含的特征个数.
    pub const fn feature_count(self) -> usize {
        match self {
            FeatureClass::Firstorder => 18,
            FeatureClass::Shape => 14,
            FeatureClass::Glcm => 24,
            FeatureClass::Glrlm | FeatureClass::Glszm => 16,
            FeatureClass::Ngtdm => 5,
            FeatureClass::Gldm => 14,
        }
    }

    fn compute(self, roi: &Roi) -> Result<NamedFeatures, ExtractionError> {
        match self {
            FeatureClass::Firstorder => Ok(firstorder::compute(roi)),
            FeatureClass::Shape => shape::compute(roi),
            FeatureClass::Glcm => glcm::compute(roi),
            FeatureClass::Glrlm => glrlm::compute(roi),
            FeatureClass::Glszm => glszm::compute(roi),
            FeatureClass::Ngtdm => ngtdm::compute(roi),
            FeatureClass::Gldm => gldm::compute(roi),
        }
    }
}

impl fmt::Display for FeatureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 特征提取参数. 与模型系数一同冻结在模型文件中.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// 离散化 bin 个数, bin 宽度为区域内强度极差除以该值.
    pub bin_count: NonZeroU32,

    /// 参与计算的区域, 按输出顺序排列.
    pub regions: Vec<Region>,

    /// 参与计算的特征类, 按输出顺序排列.
    pub feature_classes: Vec<FeatureClass>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            bin_count: NonZeroU32::new(DEFAULT_BIN_COUNT).unwrap_or(NonZeroU32::MIN),
            regions: Region::ALL.to_vec(),
            feature_classes: FeatureClass::ALL.to_vec(),
        }
    }
}

impl ExtractionSettings {
    /// 完整特征向量的长度.
    pub fn feature_count(&self) -> usize {
        self.regions.len()
            * self
                .feature_classes
                .iter()
                .map(|c| c.feature_count())
                .sum::<usize>()
    }

    /// 检查区域与特征类非空且不重复.
    pub fn validate(&self) -> Result<(), String> {
        if self.regions.is_empty() || self.feature_classes.is_empty() {
            return Err("extraction settings select no feature".to_owned());
        }
        for (i, r) in self.regions.iter().enumerate() {
            if self.regions[..i].contains(r) {
                return Err(format!("region `{r}` is listed twice"));
            }
        }
        for (i, c) in self.feature_classes.iter().enumerate() {
            if self.feature_classes[..i].contains(c) {
                return Err(format!("feature class `{c}` is listed twice"));
            }
        }
        Ok(())
    }
}

/// 有序的特征向量: 特征标识符到值的映射, 保持插入顺序.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl FeatureVector {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            names: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// 追加一个特征. 已存在的标识符会被覆盖, 但保持原有位置.
    pub fn insert(&mut self, name: String, value: f64) {
        match self.index.get(&name) {
            Some(&i) => self.values[i] = value,
            None => {
                self.index.insert(name.clone(), self.names.len());
                self.names.push(name);
                self.values.push(value);
            }
        }
    }

    /// 按标识符查询特征值.
    #[inline]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|i| self.values[*i])
    }

    /// 特征个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 按顺序排列的特征标识符.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 按顺序排列的特征值.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// 按顺序迭代 `(标识符, 值)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// 计算 `pair` 在 `settings` 下的完整特征向量.
///
/// 各区域的强度离散化独立进行. 任意一个区域或特征类无法计算时整体失败.
///
/// # 注意
///
/// `pair` 中图像与标注的形状必须一致, 否则 panic.
/// 由 [`crate::prepare::prepare_data`] 得到的数据总是满足该条件.
pub fn extract_features(
    pair: &VolumePair,
    settings: &ExtractionSettings,
) -> Result<FeatureVector, ExtractionError> {
    let slices = pair.mask.foreground_slices();
    if slices.is_empty() {
        return Err(ExtractionError::EmptyMask);
    }
    let mask = pair.mask.binarized();
    let spacing = pair.image.pix_dim();

    let mut features = FeatureVector::with_capacity(settings.feature_count());
    for &region in &settings.regions {
        let region_mask = region_mask(&mask, &slices, region)?;
        let roi = Roi::new(
            pair.image.data(),
            region_mask.view(),
            spacing,
            region,
            settings.bin_count.get(),
        )?;
        log::debug!(
            "region {region}: {} voxels, {} gray levels",
            roi.voxel_count(),
            roi.gray_levels.len()
        );

        for &class in &settings.feature_classes {
            let mut named = class.compute(&roi)?;
            // 按 `{name}FeatureValue` 排序, 因此 MeanAbsoluteDeviation 在 Mean 之前.
            named.sort_by_cached_key(|(name, _)| format!("{name}FeatureValue"));
            for (name, value) in named {
                features.insert(format!("{region}_{class}_{name}"), value);
            }
        }
    }
    log::debug!("extracted {} features", features.len());
    Ok(features)
}

/// 仅保留 `region` 所含切片上的前景.
///
/// `slices` 为升序的含前景切片索引. 设其个数为 `n`, apex 取前 `n / 3` 个,
/// base 取后 `n / 3` 个 (向下取整).
fn region_mask(
    mask: &Array3<bool>,
    slices: &[usize],
    region: Region,
) -> Result<Array3<bool>, ExtractionError> {
    let n = slices.len();
    let kept = match region {
        Region::WholeProstate => slices,
        Region::Apex => &slices[..n / 3],
        Region::Base => &slices[n - n / 3..],
    };
    if kept.is_empty() {
        return Err(ExtractionError::EmptyRegion(region));
    }
    log::debug!("region {region}: slices {:?}", kept);

    let mut out = Array3::from_elem(mask.dim(), false);
    for &z in kept {
        out.index_axis_mut(Axis(0), z)
            .assign(&mask.index_axis(Axis(0), z));
    }
    Ok(out)
}

/// 对各方向的特征取算术平均. 各方向的特征名与顺序相同.
pub(crate) fn average_features(per_angle: Vec<NamedFeatures>) -> Option<NamedFeatures> {
    let n = per_angle.len() as f64;
    let mut iter = per_angle.into_iter();
    let mut sum = iter.next()?;
    for angle in iter {
        for ((_, acc), (_, v)) in sum.iter_mut().zip(angle) {
            *acc += v;
        }
    }
    for (_, v) in sum.iter_mut() {
        *v /= n;
    }
    Some(sum)
}

#[cfg(test)]
mod tests {
    use super::{
        average_features, extract_features, region_mask, ExtractionSettings, FeatureClass,
        Region,
    };
    use crate::data::{Geometry, Mask, Volume, VolumePair};
    use crate::error::ExtractionError;
    use crate::phantom;
    use ndarray::Array3;

    #[test]
    fn test_region_slices() {
        let mut mask = Array3::from_elem((8, 1, 1), false);
        for z in 1..8 {
            mask[(z, 0, 0)] = true;
        }
        // 7 个含前景切片: apex 取 1, 2; base 取 6, 7.
        let slices: Vec<usize> = (1..8).collect();
        let apex = region_mask(&mask, &slices, Region::Apex).unwrap();
        let base = region_mask(&mask, &slices, Region::Base).unwrap();
        let whole = region_mask(&mask, &slices, Region::WholeProstate).unwrap();
        let kept = |m: &Array3<bool>| {
            m.indexed_iter()
                .filter_map(|((z, _, _), v)| v.then_some(z))
                .collect::<Vec<_>>()
        };
        assert_eq!(kept(&apex), [1, 2]);
        assert_eq!(kept(&base), [6, 7]);
        assert_eq!(kept(&whole), slices);

        assert_eq!(
            region_mask(&mask, &[1, 2], Region::Apex),
            Err(ExtractionError::EmptyRegion(Region::Apex))
        );
    }

    #[test]
    fn test_average_features() {
        let avg = average_features(vec![vec![("a", 1.0), ("b", 4.0)], vec![("a", 3.0), ("b", 0.0)]]);
        assert_eq!(avg, Some(vec![("a", 2.0), ("b", 2.0)]));
        assert_eq!(average_features(vec![]), None);
    }

    #[test]
    fn test_settings() {
        let settings = ExtractionSettings::default();
        assert_eq!(settings.bin_count.get(), 64);
        assert_eq!(settings.feature_count(), 321);
        assert!(settings.validate().is_ok());

        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"wholeprostate\"") && json.contains("\"firstorder\""));
        assert_eq!(serde_json::from_str::<ExtractionSettings>(&json).unwrap(), settings);
        let zero = r#"{"bin_count": 0, "regions": ["apex"], "feature_classes": ["shape"]}"#;
        assert!(serde_json::from_str::<ExtractionSettings>(zero).is_err());

        let twice = ExtractionSettings {
            regions: vec![Region::Apex, Region::Apex],
            ..Default::default()
        };
        assert!(twice.validate().is_err());
    }

    #[test]
    fn test_phantom_feature_vector() {
        let settings = ExtractionSettings::default();
        let features = extract_features(&phantom::sphere_pair(), &settings).unwrap();
        assert_eq!(features.len(), 321);
        assert!(features.iter().all(|(_, v)| v.is_finite()));

        let names = features.names();
        assert_eq!(names[0], "wholeprostate_firstorder_10Percentile");
        assert_eq!(names[7], "wholeprostate_firstorder_MeanAbsoluteDeviation");
        assert_eq!(names[8], "wholeprostate_firstorder_Mean");
        assert_eq!(names[18], "wholeprostate_shape_Elongation");
        assert_eq!(names[107], "apex_firstorder_10Percentile");
        assert_eq!(names[114], "apex_firstorder_MeanAbsoluteDeviation");
        assert_eq!(names[320], "base_gldm_SmallDependenceLowGrayLevelEmphasis");
        // 每个区域, 特征类内的名称按 `{name}FeatureValue` 的字节序排列.
        for chunk in names.chunks(107) {
            let mut start = 0;
            for class in FeatureClass::ALL {
                let block = &chunk[start..start + class.feature_count()];
                assert!(block
                    .windows(2)
                    .all(|w| format!("{}FeatureValue", w[0]) < format!("{}FeatureValue", w[1])));
                start += class.feature_count();
            }
        }

        let [sx, sy, sz] = phantom::SPACING;
        let voxel = features.get("wholeprostate_shape_VoxelVolume").unwrap();
        assert!((voxel - phantom::SPHERE_VOXELS as f64 * sx * sy * sz).abs() < 1e-6);
        assert!(features.get("apex_shape_VoxelVolume").unwrap() < voxel);
        assert_eq!(features.get("nothing"), None);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let pair = phantom::sphere_pair();
        let settings = ExtractionSettings::default();
        let a = extract_features(&pair, &settings).unwrap();
        let b = extract_features(&pair, &settings).unwrap();
        assert_eq!(a.names(), b.names());
        assert!(a
            .values()
            .iter()
            .zip(b.values())
            .all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_extraction_errors() {
        let geometry = Geometry::default();
        let image = Volume::new(Array3::zeros((4, 4, 4)), geometry.clone());
        let empty = VolumePair {
            image: image.clone(),
            mask: Mask::new(Array3::zeros((4, 4, 4)), geometry.clone()),
        };
        let settings = ExtractionSettings::default();
        assert_eq!(
            extract_features(&empty, &settings),
            Err(ExtractionError::EmptyMask)
        );

        let flat = VolumePair {
            image,
            mask: Mask::new(Array3::ones((4, 4, 4)), geometry.clone()),
        };
        assert_eq!(
            extract_features(&flat, &settings),
            Err(ExtractionError::FlatIntensity(Region::WholeProstate))
        );

        // 两个含前景切片时 apex 为空.
        let mut data = Array3::zeros((4, 4, 4));
        data[(0, 1, 1)] = 1;
        data[(1, 2, 2)] = 1;
        let two = VolumePair {
            image: Volume::new(
                Array3::from_shape_fn((4, 4, 4), |(z, y, x)| (z + y + x) as f32),
                geometry.clone(),
            ),
            mask: Mask::new(data, geometry),
        };
        let apex_only = ExtractionSettings {
            regions: vec![Region::Apex],
            ..Default::default()
        };
        assert_eq!(
            extract_features(&two, &apex_only),
            Err(ExtractionError::EmptyRegion(Region::Apex))
        );
    }
}
