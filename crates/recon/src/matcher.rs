use std::collections::{BTreeSet, HashSet};

use crate::model::MatchEvidence;
use crate::normalize::{extract_valid_phones, normalize_name, NormalizedName, NormalizedPhone};

pub const DEFAULT_NAME_THRESHOLD: f64 = 0.8;

/// The comparable part of any record that names a beneficiary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Identity {
    pub name: NormalizedName,
    pub phones: BTreeSet<NormalizedPhone>,
}

impl Identity {
    pub fn new<S: AsRef<str>>(raw_name: Option<&str>, raw_phones: &[S], min_phone_len: usize) -> Self {
        Self {
            name: raw_name.map(normalize_name).unwrap_or_default(),
            phones: extract_valid_phones(raw_phones, min_phone_len),
        }
    }

    /// Neither a usable name nor a usable phone.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.phones.is_empty()
    }
}

/// Jaccard similarity of the two names' word sets.
pub fn token_similarity(a: &NormalizedName, b: &NormalizedName) -> f64 {
    let ta: HashSet<&str> = a.tokens().collect();
    let tb: HashSet<&str> = b.tokens().collect();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

/// Name comparison on already-normalized names: exact, then substring
/// ("juan perez" inside "juan perez lopez"), then word-set similarity.
/// An empty name never matches anything.
pub fn normalized_names_similar(a: &NormalizedName, b: &NormalizedName, threshold: f64) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    if a.as_str().contains(b.as_str()) || b.as_str().contains(a.as_str()) {
        return true;
    }
    token_similarity(a, b) >= threshold
}

/// Free-text name comparison; both sides are normalized first.
pub fn names_similar(a: &str, b: &str, threshold: f64) -> bool {
    normalized_names_similar(&normalize_name(a), &normalize_name(b), threshold)
}

/// Any phone in common. Empty sets never match.
pub fn phones_match(a: &BTreeSet<NormalizedPhone>, b: &BTreeSet<NormalizedPhone>) -> bool {
    !a.is_disjoint(b)
}

/// How two identities match, if they do. Name and phone are alternative
/// evidence; either one is enough.
pub fn match_evidence(a: &Identity, b: &Identity, threshold: f64) -> Option<MatchEvidence> {
    let by_name = normalized_names_similar(&a.name, &b.name, threshold);
    let by_phone = phones_match(&a.phones, &b.phones);
    match (by_name, by_phone) {
        (true, true) => Some(MatchEvidence::NameAndPhone),
        (true, false) => Some(MatchEvidence::Name),
        (false, true) => Some(MatchEvidence::Phone),
        (false, false) => None,
    }
}

pub fn records_match(a: &Identity, b: &Identity, threshold: f64) -> bool {
    match_evidence(a, b, threshold).is_some()
}
