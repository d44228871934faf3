use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (threshold out of range, empty keyword list, etc.).
    ConfigValidation(String),
    /// A snapshot's text could not be read as records at all.
    InputParse { source_name: String, message: String },
    /// Per-operator totals disagree with the global totals.
    Integrity(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InputParse { source_name, message } => {
                write!(f, "input '{source_name}': {message}")
            }
            Self::Integrity(msg) => write!(f, "metrics integrity check failed: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
