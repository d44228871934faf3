//! Canonical forms for free-text names and phone strings.
//!
//! Everything here is referentially transparent: no configuration beyond the
//! arguments, no shared state.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, accent-free, punctuation-free, single-spaced name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedName(String);

impl NormalizedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whitespace-separated words.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|t| !t.is_empty())
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bare digit string of a usable phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a phone string is not usable for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPhone {
    /// No digits at all.
    Empty,
    /// Only zeros ("000000000"), the upstream "no phone" placeholder.
    Sentinel,
    /// Fewer digits than the configured minimum.
    TooShort { digits: usize },
}

impl fmt::Display for InvalidPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no digits"),
            Self::Sentinel => write!(f, "all-zero placeholder"),
            Self::TooShort { digits } => write!(f, "only {digits} digit(s)"),
        }
    }
}

/// Normalize a free-text name for comparison.
///
/// Strips diacritics ("á" -> "a"), lowercases, drops every character that is
/// neither alphanumeric nor whitespace, collapses whitespace runs and trims.
/// Applying it to its own output is a no-op.
pub fn normalize_name(raw: &str) -> NormalizedName {
    let folded: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    NormalizedName(folded.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Reduce a phone string to its digits and decide whether it is usable.
///
/// No country-code handling: "+56 9 8765 4321" and "56987654321" are equal,
/// "987654321" is a different value.
pub fn normalize_phone(raw: &str, min_len: usize) -> Result<NormalizedPhone, InvalidPhone> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        return Err(InvalidPhone::Empty);
    }
    if digits.chars().all(|c| c == '0') {
        return Err(InvalidPhone::Sentinel);
    }
    if digits.len() < min_len {
        return Err(InvalidPhone::TooShort { digits: digits.len() });
    }

    Ok(NormalizedPhone(digits))
}

/// Normalize every phone-bearing value of a record, dropping the unusable
/// ones and duplicates.
pub fn extract_valid_phones<I, S>(raws: I, min_len: usize) -> BTreeSet<NormalizedPhone>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raws.into_iter()
        .filter_map(|raw| normalize_phone(raw.as_ref(), min_len).ok())
        .collect()
}
