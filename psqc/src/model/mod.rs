//! 冻结的 LASSO 线性模型与质量分类.
//!
//! 模型文件为 JSON, 包含截距, 特征提取参数以及按特征向量顺序排列的系数.
//! 内置模型在编译期嵌入 crate, 首次使用时解析一次, 之后在线程间共享.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::consts::{label, MODEL_COEF_ENV, SCORE_DECIMALS, SCORE_MAX, SCORE_MIN};
use crate::error::{LoadError, PsqcError, PsqcResult, ScoringError};
use crate::radiomics::{ExtractionSettings, FeatureVector};

/// 内置模型文件内容.
const BUNDLED_MODEL: &str = include_str!("model_coef.json");

/// 单个特征的模型权重.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    /// 特征标识符, 如 `wholeprostate_glcm_Idmn`.
    pub feature: String,

    /// 权重.
    pub weight: f64,
}

/// 线性模型 `intercept + Σ weight · feature`.
///
/// 该结构是只读的, 构造时完成校验.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCoefficients {
    intercept: f64,
    #[serde(default)]
    extraction: ExtractionSettings,
    coefficients: Vec<Coefficient>,
}

impl ModelCoefficients {
    /// 创建并校验模型.
    ///
    /// 系数必须非空, 标识符互不相同, 权重与截距均为有限值.
    pub fn new(
        intercept: f64,
        extraction: ExtractionSettings,
        coefficients: Vec<Coefficient>,
    ) -> Result<Self, LoadError> {
        let model = Self {
            intercept,
            extraction,
            coefficients,
        };
        model.validate()?;
        Ok(model)
    }

    /// 从 JSON 文本解析模型.
    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        let model: Self = serde_json::from_str(json).map_err(|e| LoadError::Model(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// 从 JSON 文件读取模型.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_owned()));
        }
        let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// 内置模型. 首次调用时解析.
    pub fn bundled() -> Result<&'static Self, LoadError> {
        static MODEL: OnceCell<ModelCoefficients> = OnceCell::new();
        MODEL.get_or_try_init(|| Self::from_json_str(BUNDLED_MODEL))
    }

    /// 环境变量 `PSQC_MODEL_COEF` 指向替换的模型文件时读取该文件, 否则使用内置模型.
    pub fn from_env_or_bundled() -> Result<Cow<'static, Self>, LoadError> {
        match std::env::var_os(MODEL_COEF_ENV) {
            Some(path) => {
                log::debug!("loading model coefficients from {:?}", path);
                Self::from_path(path).map(Cow::Owned)
            }
            None => Self::bundled().map(Cow::Borrowed),
        }
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.coefficients.is_empty() {
            return Err(LoadError::Model("no coefficient".to_owned()));
        }
        if !self.intercept.is_finite() {
            return Err(LoadError::Model(format!(
                "intercept {} is not finite",
                self.intercept
            )));
        }
        let mut seen = HashSet::with_capacity(self.coefficients.len());
        for c in &self.coefficients {
            if !seen.insert(c.feature.as_str()) {
                return Err(LoadError::Model(format!(
                    "feature `{}` is listed twice",
                    c.feature
                )));
            }
            if !c.weight.is_finite() {
                return Err(LoadError::Model(format!(
                    "weight of `{}` is not finite",
                    c.feature
                )));
            }
        }
        self.extraction.validate().map_err(LoadError::Model)
    }

    /// 截距.
    #[inline]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// 训练时使用的特征提取参数.
    #[inline]
    pub fn extraction(&self) -> &ExtractionSettings {
        &self.extraction
    }

    /// 按顺序排列的系数.
    #[inline]
    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    /// 未截断的线性输出.
    ///
    /// 按系数顺序累加. 特征缺失或非有限值时报错, 权重为 0 的特征也不例外.
    pub fn raw_score(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        let mut raw = self.intercept;
        for Coefficient { feature, weight } in &self.coefficients {
            let value = features
                .get(feature)
                .ok_or_else(|| ScoringError::MissingFeature(feature.clone()))?;
            if !value.is_finite() {
                return Err(ScoringError::NonFiniteFeature(feature.clone(), value));
            }
            raw += weight * value;
        }
        match raw.is_finite() {
            true => Ok(raw),
            false => Err(ScoringError::NonFiniteScore),
        }
    }

    /// 质量分数: 线性输出截断到 `[0, 100]` 后保留两位小数.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        let raw = self.raw_score(features)?;
        Ok(round_score(raw.clamp(SCORE_MIN, SCORE_MAX)))
    }
}

/// 四舍五入到 [`SCORE_DECIMALS`] 位小数.
#[inline]
fn round_score(score: f64) -> f64 {
    let scale = 10_f64.powi(SCORE_DECIMALS);
    (score * scale).round() / scale
}

/// 分割质量类别.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityClass {
    /// 分数不低于阈值.
    #[serde(rename = "Acceptable")]
    Acceptable,

    /// 分数低于阈值.
    #[serde(rename = "NOT Acceptable")]
    NotAcceptable,
}

impl QualityClass {
    /// 以 `threshold` 为界对 `score` 分类. 阈值须为 `[0, 100]` 内的有限值.
    pub fn classify(score: f64, threshold: f64) -> PsqcResult<Self> {
        let threshold = validate_threshold(threshold)?;
        Ok(match score >= threshold {
            true => QualityClass::Acceptable,
            false => QualityClass::NotAcceptable,
        })
    }

    /// 展示文本.
    pub const fn label(self) -> &'static str {
        match self {
            QualityClass::Acceptable => label::ACCEPTABLE,
            QualityClass::NotAcceptable => label::NOT_ACCEPTABLE,
        }
    }

    /// 是否可接受.
    #[inline]
    pub fn is_acceptable(self) -> bool {
        self == QualityClass::Acceptable
    }
}

impl fmt::Display for QualityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 检查分类阈值是否为 `[0, 100]` 内的有限值.
pub fn validate_threshold(threshold: f64) -> PsqcResult<f64> {
    match (SCORE_MIN..=SCORE_MAX).contains(&threshold) {
        true => Ok(threshold),
        false => Err(PsqcError::InvalidArgument(format!(
            "quality class threshold {threshold} is not within [{SCORE_MIN}, {SCORE_MAX}]"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_threshold, Coefficient, ModelCoefficients, QualityClass};
    use crate::consts::MODEL_COEF_ENV;
    use crate::error::{LoadError, PsqcError, ScoringError};
    use crate::radiomics::{ExtractionSettings, FeatureVector};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn model(intercept: f64, weights: &[(&str, f64)]) -> ModelCoefficients {
        let coefficients = weights
            .iter()
            .map(|(f, w)| Coefficient {
                feature: f.to_string(),
                weight: *w,
            })
            .collect();
        ModelCoefficients::new(intercept, ExtractionSettings::default(), coefficients).unwrap()
    }

    fn features(values: &[(&str, f64)]) -> FeatureVector {
        let mut fv = FeatureVector::default();
        for (name, value) in values {
            fv.insert(name.to_string(), *value);
        }
        fv
    }

    #[test]
    fn test_bundled_model() {
        let model = ModelCoefficients::bundled().unwrap();
        assert_eq!(model.coefficients().len(), 321);
        assert!(f64_eq(model.intercept(), -589.6493539841075));
        assert_eq!(model.extraction(), &ExtractionSettings::default());
        assert_eq!(
            model.coefficients()[0].feature,
            "wholeprostate_firstorder_10Percentile"
        );
        // 第二次调用返回同一实例.
        assert!(std::ptr::eq(model, ModelCoefficients::bundled().unwrap()));
    }

    #[test]
    fn test_bundled_model_follows_extraction_order() {
        let model = ModelCoefficients::bundled().unwrap();
        let features =
            crate::radiomics::extract_features(&crate::phantom::sphere_pair(), model.extraction())
                .unwrap();
        let expected: Vec<&str> = model.coefficients().iter().map(|c| c.feature.as_str()).collect();
        assert_eq!(features.names(), expected.as_slice());
    }

    #[test]
    fn test_invalid_artifacts() {
        let cases = [
            "not json",
            r#"{"intercept": 1.0, "coefficients": []}"#,
            r#"{"intercept": 1.0, "coefficients": [
                {"feature": "a", "weight": 1.0}, {"feature": "a", "weight": 2.0}]}"#,
            r#"{"intercept": 1.0,
                "extraction": {"bin_count": 0, "regions": ["apex"], "feature_classes": ["shape"]},
                "coefficients": [{"feature": "a", "weight": 1.0}]}"#,
            r#"{"intercept": 1.0,
                "extraction": {"bin_count": 8, "regions": [], "feature_classes": ["shape"]},
                "coefficients": [{"feature": "a", "weight": 1.0}]}"#,
        ];
        for json in cases {
            assert!(matches!(
                ModelCoefficients::from_json_str(json),
                Err(LoadError::Model(_))
            ));
        }
        let ok = r#"{"intercept": 1.0, "coefficients": [{"feature": "a", "weight": 1.0}]}"#;
        let model = ModelCoefficients::from_json_str(ok).unwrap();
        assert_eq!(model.extraction(), &ExtractionSettings::default());

        assert!(ModelCoefficients::new(f64::NAN, ExtractionSettings::default(), vec![]).is_err());
    }

    #[test]
    fn test_model_from_path_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coef.json");
        let json = r#"{"intercept": 50.0, "coefficients": [{"feature": "x", "weight": 2.0}]}"#;
        std::fs::write(&path, json).unwrap();

        let model = ModelCoefficients::from_path(&path).unwrap();
        assert!(f64_eq(model.intercept(), 50.0));
        assert!(matches!(
            ModelCoefficients::from_path(dir.path().join("missing.json")),
            Err(LoadError::NotFound(_))
        ));

        std::env::set_var(MODEL_COEF_ENV, &path);
        let from_env = ModelCoefficients::from_env_or_bundled().unwrap();
        std::env::remove_var(MODEL_COEF_ENV);
        assert_eq!(from_env.into_owned(), model);
    }

    #[test]
    fn test_raw_score_and_clamp() {
        let m = model(10.0, &[("a", 2.0), ("b", -1.0)]);
        let fv = features(&[("b", 4.0), ("a", 3.0), ("unused", f64::NAN)]);
        assert!(f64_eq(m.raw_score(&fv).unwrap(), 12.0));
        assert!(f64_eq(m.predict(&fv).unwrap(), 12.0));

        let high = features(&[("a", 1e6), ("b", 0.0)]);
        assert_eq!(m.predict(&high).unwrap(), 100.0);
        let low = features(&[("a", -1e6), ("b", 0.0)]);
        assert_eq!(m.predict(&low).unwrap(), 0.0);

        let fraction = features(&[("a", 1.23456), ("b", 0.0)]);
        assert!(f64_eq(m.predict(&fraction).unwrap(), 12.47));
    }

    #[test]
    fn test_scoring_errors() {
        let m = model(0.0, &[("a", 0.0), ("b", 1.0)]);
        assert_eq!(
            m.raw_score(&features(&[("b", 1.0)])),
            Err(ScoringError::MissingFeature("a".to_owned()))
        );
        assert!(matches!(
            m.raw_score(&features(&[("a", f64::INFINITY), ("b", 1.0)])),
            Err(ScoringError::NonFiniteFeature(name, _)) if name == "a"
        ));
        let huge = model(0.0, &[("a", f64::MAX), ("b", f64::MAX)]);
        assert_eq!(
            huge.raw_score(&features(&[("a", f64::MAX), ("b", 1.0)])),
            Err(ScoringError::NonFiniteScore)
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(QualityClass::classify(85.0, 85.0).unwrap(), QualityClass::Acceptable);
        assert_eq!(
            QualityClass::classify(84.99, 85.0).unwrap(),
            QualityClass::NotAcceptable
        );
        assert_eq!(QualityClass::classify(0.0, 0.0).unwrap(), QualityClass::Acceptable);
        assert_eq!(
            QualityClass::classify(99.99, 100.0).unwrap(),
            QualityClass::NotAcceptable
        );
        for t in [f64::NAN, -0.01, 100.01, f64::INFINITY] {
            assert!(matches!(
                validate_threshold(t),
                Err(PsqcError::InvalidArgument(_))
            ));
        }
        assert_eq!(QualityClass::Acceptable.to_string(), "Acceptable");
        assert_eq!(QualityClass::NotAcceptable.to_string(), "NOT Acceptable");
        assert_eq!(
            serde_json::to_string(&QualityClass::NotAcceptable).unwrap(),
            "\"NOT Acceptable\""
        );
    }
}
