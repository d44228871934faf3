use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub status: StatusThresholds,
    #[serde(default)]
    pub outcomes: OutcomeRules,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

fn default_name() -> String {
    "reconciliation".into()
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            inputs: InputsConfig::default(),
            matching: MatchingConfig::default(),
            status: StatusThresholds::default(),
            outcomes: OutcomeRules::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Snapshot file locations. The engine never opens these itself; the CLI
/// resolves them relative to the config file's directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputsConfig {
    pub beneficiaries: Option<String>,
    pub operators: Option<String>,
    pub assignments: Option<String>,
    pub calls: Option<String>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    #[serde(default = "default_name_threshold")]
    pub name_threshold: f64,
    #[serde(default = "default_min_phone_length")]
    pub min_phone_length: usize,
    #[serde(default)]
    pub strategy: MatchStrategy,
}

fn default_name_threshold() -> f64 {
    0.8
}

fn default_min_phone_length() -> usize {
    8
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            name_threshold: default_name_threshold(),
            min_phone_length: default_min_phone_length(),
            strategy: MatchStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Every beneficiary is compared against every assignment entry.
    #[default]
    Scan,
    /// Exact phone hits first; the name scan only runs for beneficiaries
    /// without a phone hit.
    PhoneIndex,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::PhoneIndex => write!(f, "phone_index"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status thresholds
// ---------------------------------------------------------------------------

/// Recency windows (in days since the last successful call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StatusThresholds {
    #[serde(default = "default_up_to_date_days")]
    pub up_to_date_days: i64,
    #[serde(default = "default_pending_days")]
    pub pending_days: i64,
}

fn default_up_to_date_days() -> i64 {
    15
}

fn default_pending_days() -> i64 {
    30
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            up_to_date_days: default_up_to_date_days(),
            pending_days: default_pending_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome keywords
// ---------------------------------------------------------------------------

const DEFAULT_SUCCESS_KEYWORDS: &[&str] = &[
    "exitoso",
    "exitosa",
    "successful",
    "answered",
    "contacted",
    "contactado",
    "contactada",
    "atendido",
    "atendida",
    "completado",
    "completada",
    "completed",
];

const DEFAULT_FAILURE_KEYWORDS: &[&str] = &[
    "no contesta",
    "no contactado",
    "no contactada",
    "sin respuesta",
    "fallido",
    "fallida",
    "unsuccessful",
    "not answered",
    "no answer",
    "buzon",
    "ocupado",
    "busy",
];

/// Keyword rules for the successful/failed call split.
///
/// Failure keywords are checked first so negated phrases ("no contactado",
/// "unsuccessful") never fall through to a success keyword they contain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutcomeRules {
    #[serde(default = "default_success_keywords")]
    pub success_keywords: Vec<String>,
    #[serde(default = "default_failure_keywords")]
    pub failure_keywords: Vec<String>,
}

fn default_success_keywords() -> Vec<String> {
    DEFAULT_SUCCESS_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

fn default_failure_keywords() -> Vec<String> {
    DEFAULT_FAILURE_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

impl Default for OutcomeRules {
    fn default() -> Self {
        Self {
            success_keywords: default_success_keywords(),
            failure_keywords: default_failure_keywords(),
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    200
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let threshold = self.matching.name_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "matching.name_threshold must be in (0, 1], got {threshold}"
            )));
        }

        if self.matching.min_phone_length == 0 {
            return Err(ReconError::ConfigValidation(
                "matching.min_phone_length must be at least 1".into(),
            ));
        }

        if self.status.up_to_date_days < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "status.up_to_date_days must not be negative, got {}",
                self.status.up_to_date_days
            )));
        }

        if self.status.pending_days < self.status.up_to_date_days {
            return Err(ReconError::ConfigValidation(format!(
                "status.pending_days ({}) must be >= status.up_to_date_days ({})",
                self.status.pending_days, self.status.up_to_date_days
            )));
        }

        if self
            .outcomes
            .success_keywords
            .iter()
            .all(|k| k.trim().is_empty())
        {
            return Err(ReconError::ConfigValidation(
                "outcomes.success_keywords must contain at least one keyword".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "Weekly close"

[inputs]
beneficiaries = "beneficiarios.json"
assignments = "asignaciones.csv"
calls = "llamadas.json"

[matching]
name_threshold = 0.75
min_phone_length = 9
strategy = "phone_index"

[status]
up_to_date_days = 7
pending_days = 21

[outcomes]
success_keywords = ["exitoso", "contactado"]
failure_keywords = ["no contesta"]

[diagnostics]
max_entries = 50
"#;

    #[test]
    fn parse_full_config() {
        let config = ReconConfig::from_toml(FULL).unwrap();
        assert_eq!(config.name, "Weekly close");
        assert_eq!(config.inputs.beneficiaries.as_deref(), Some("beneficiarios.json"));
        assert!(config.inputs.operators.is_none());
        assert_eq!(config.matching.name_threshold, 0.75);
        assert_eq!(config.matching.min_phone_length, 9);
        assert_eq!(config.matching.strategy, MatchStrategy::PhoneIndex);
        assert_eq!(config.status.up_to_date_days, 7);
        assert_eq!(config.status.pending_days, 21);
        assert_eq!(config.outcomes.success_keywords, vec!["exitoso", "contactado"]);
        assert_eq!(config.diagnostics.max_entries, 50);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ReconConfig::from_toml("").unwrap();
        assert_eq!(config.name, "reconciliation");
        assert_eq!(config.matching.name_threshold, 0.8);
        assert_eq!(config.matching.min_phone_length, 8);
        assert_eq!(config.matching.strategy, MatchStrategy::Scan);
        assert_eq!(config.status, StatusThresholds { up_to_date_days: 15, pending_days: 30 });
        assert!(config.outcomes.success_keywords.iter().any(|k| k == "exitoso"));
        assert!(config.outcomes.failure_keywords.iter().any(|k| k == "no contesta"));
        assert_eq!(config.diagnostics.max_entries, 200);
    }

    #[test]
    fn reject_threshold_out_of_range() {
        let err = ReconConfig::from_toml("[matching]\nname_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("name_threshold"));

        let err = ReconConfig::from_toml("[matching]\nname_threshold = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("name_threshold"));
    }

    #[test]
    fn reject_inverted_status_thresholds() {
        let err = ReconConfig::from_toml("[status]\nup_to_date_days = 30\npending_days = 10\n")
            .unwrap_err();
        assert!(err.to_string().contains("pending_days"));
    }

    #[test]
    fn reject_empty_success_keywords() {
        let err = ReconConfig::from_toml("[outcomes]\nsuccess_keywords = []\n").unwrap_err();
        assert!(err.to_string().contains("success_keywords"));
    }

    #[test]
    fn reject_unknown_strategy() {
        let err = ReconConfig::from_toml("[matching]\nstrategy = \"phonetic\"\n");
        assert!(err.is_err(), "unknown strategy should fail deserialization");
    }

    #[test]
    fn reject_unknown_field() {
        let err = ReconConfig::from_toml("[matching]\nthreshold = 0.8\n");
        assert!(matches!(err, Err(ReconError::ConfigParse(_))));
    }
}
