//! Global tunables loaded from TOML.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub clustering: ClusteringSettings,
    pub similarity: SimilaritySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSettings {
    pub total_order_time_gap: f64,
    pub total_order_unit_gap: i32,
    pub reachability_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilaritySettings {
    pub min_similarity: f64,
    pub posterior_floor: f64,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check {
        ($cond:expr, $section:ident . $field:ident, $reason:literal) => {
            if !$cond {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: $reason.to_string(),
                });
            }
        };
    }

    check!(
        s.clustering.total_order_time_gap >= 0.0,
        clustering.total_order_time_gap,
        "must be non-negative"
    );
    check!(
        s.clustering.total_order_unit_gap >= 0,
        clustering.total_order_unit_gap,
        "must be non-negative"
    );
    check!(
        s.similarity.min_similarity > 0.0 && s.similarity.min_similarity <= 1.0,
        similarity.min_similarity,
        "must be in (0, 1]"
    );
    check!(
        s.similarity.posterior_floor < 0.0,
        similarity.posterior_floor,
        "must be negative"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_toml() {
        let s = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap();
        assert!((s.clustering.total_order_time_gap - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.clustering.total_order_unit_gap, 20);
        assert_eq!(s.clustering.reachability_depth, 10);
        assert!((s.similarity.min_similarity - 0.0001).abs() < f64::EPSILON);
        assert!((s.similarity.posterior_floor + 0.0001).abs() < f64::EPSILON);
    }

    #[test]
    fn default_toml_accessor() {
        assert_eq!(default_toml(), DEFAULT_SETTINGS_TOML);
    }

    #[test]
    fn parse_valid_custom_toml() {
        let toml = r#"
[clustering]
total_order_time_gap = 1.25
total_order_unit_gap = 8
reachability_depth = 4

[similarity]
min_similarity = 0.01
posterior_floor = -0.001
"#;
        let s = parse_settings_toml(toml).unwrap();
        assert_eq!(s.clustering.total_order_unit_gap, 8);
        assert_eq!(s.clustering.reachability_depth, 4);
        assert!((s.similarity.min_similarity - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn error_negative_gap() {
        let toml = r#"
[clustering]
total_order_time_gap = -0.5
total_order_unit_gap = 20
reachability_depth = 10

[similarity]
min_similarity = 0.0001
posterior_floor = -0.0001
"#;
        let err = parse_settings_toml(toml).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
        assert!(err.to_string().contains("clustering.total_order_time_gap"));
    }

    #[test]
    fn error_zero_min_similarity() {
        let toml = r#"
[clustering]
total_order_time_gap = 0.5
total_order_unit_gap = 20
reachability_depth = 10

[similarity]
min_similarity = 0.0
posterior_floor = -0.0001
"#;
        let err = parse_settings_toml(toml).unwrap_err();
        assert!(err.to_string().contains("similarity.min_similarity"));
    }

    #[test]
    fn error_non_negative_posterior_floor() {
        let toml = r#"
[clustering]
total_order_time_gap = 0.5
total_order_unit_gap = 20
reachability_depth = 10

[similarity]
min_similarity = 0.0001
posterior_floor = 0.0
"#;
        let err = parse_settings_toml(toml).unwrap_err();
        assert!(err.to_string().contains("posterior_floor"));
    }

    #[test]
    fn error_invalid_toml() {
        let err = parse_settings_toml("not valid toml {{{").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn error_missing_section() {
        let toml = r#"
[clustering]
total_order_time_gap = 0.5
total_order_unit_gap = 20
reachability_depth = 10
"#;
        let err = parse_settings_toml(toml).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
