//! Per-run data-quality accumulator.
//!
//! One `Diagnostics` is created per run and passed `&mut` through every stage.
//! Nothing here is fatal: records are skipped or degraded, and the counts
//! are reported alongside the result.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Beneficiaries,
    Operators,
    Assignments,
    Calls,
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beneficiaries => write!(f, "beneficiaries"),
            Self::Operators => write!(f, "operators"),
            Self::Assignments => write!(f, "assignments"),
            Self::Calls => write!(f, "calls"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Record lacks every identifying field; skipped.
    Malformed,
    /// Beneficiary had no id; a positional one was generated.
    GeneratedId,
    /// Beneficiary id seen before; later record skipped.
    DuplicateId,
    /// Beneficiary kept, but none of its phones is usable.
    NoValidPhone,
    /// Operator reference not found on a non-empty roster.
    UnknownOperator,
    /// Matching assignments name different operators; first one kept.
    AmbiguousMatch,
    /// Several matching assignments name the same operator.
    DuplicateAssignment,
    /// Assignment matches no beneficiary.
    OrphanAssignment,
    /// Call names an operator other than the one its beneficiary maps to.
    OperatorConflict,
    /// Call's beneficiary identity matches no registry record.
    UnresolvedBeneficiary,
    /// Duration negative or unreadable; counted as 0.
    InvalidDuration,
    /// Timestamp unreadable; call excluded from recency.
    UnparseableTimestamp,
    /// Per-operator metric sums disagree with the global totals.
    IntegrityMismatch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounts {
    pub malformed_beneficiaries: usize,
    pub malformed_operators: usize,
    pub malformed_assignments: usize,
    pub malformed_calls: usize,
    pub generated_ids: usize,
    pub duplicate_beneficiary_ids: usize,
    pub beneficiaries_without_valid_phone: usize,
    pub unknown_operator_refs: usize,
    pub ambiguous_matches: usize,
    pub duplicate_assignments: usize,
    pub orphan_assignments: usize,
    pub operator_conflicts: usize,
    pub unresolved_call_beneficiaries: usize,
    pub invalid_durations: usize,
    pub unparseable_timestamps: usize,
    pub integrity_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub kind: DiagnosticKind,
    pub source: RecordSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub counts: DiagnosticCounts,
    pub entries: Vec<DiagnosticEntry>,
    pub truncated: bool,
    #[serde(skip)]
    max_entries: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Diagnostics {
    pub fn new(max_entries: usize) -> Self {
        Self {
            counts: DiagnosticCounts::default(),
            entries: Vec::new(),
            truncated: false,
            max_entries,
        }
    }

    /// Count one occurrence and keep its detail while under the entry cap.
    pub fn record(
        &mut self,
        kind: DiagnosticKind,
        source: RecordSource,
        index: Option<usize>,
        detail: impl Into<String>,
    ) {
        let c = &mut self.counts;
        match (kind, source) {
            (DiagnosticKind::Malformed, RecordSource::Beneficiaries) => c.malformed_beneficiaries += 1,
            (DiagnosticKind::Malformed, RecordSource::Operators) => c.malformed_operators += 1,
            (DiagnosticKind::Malformed, RecordSource::Assignments) => c.malformed_assignments += 1,
            (DiagnosticKind::Malformed, RecordSource::Calls) => c.malformed_calls += 1,
            (DiagnosticKind::GeneratedId, _) => c.generated_ids += 1,
            (DiagnosticKind::DuplicateId, _) => c.duplicate_beneficiary_ids += 1,
            (DiagnosticKind::NoValidPhone, _) => c.beneficiaries_without_valid_phone += 1,
            (DiagnosticKind::UnknownOperator, _) => c.unknown_operator_refs += 1,
            (DiagnosticKind::AmbiguousMatch, _) => c.ambiguous_matches += 1,
            (DiagnosticKind::DuplicateAssignment, _) => c.duplicate_assignments += 1,
            (DiagnosticKind::OrphanAssignment, _) => c.orphan_assignments += 1,
            (DiagnosticKind::OperatorConflict, _) => c.operator_conflicts += 1,
            (DiagnosticKind::UnresolvedBeneficiary, _) => c.unresolved_call_beneficiaries += 1,
            (DiagnosticKind::InvalidDuration, _) => c.invalid_durations += 1,
            (DiagnosticKind::UnparseableTimestamp, _) => c.unparseable_timestamps += 1,
            (DiagnosticKind::IntegrityMismatch, _) => c.integrity_failures += 1,
        }

        let detail = detail.into();
        log::debug!("{source}[{}]: {kind:?}: {detail}", index.map_or("-".to_string(), |i| i.to_string()));

        if self.entries.len() < self.max_entries {
            self.entries.push(DiagnosticEntry { kind, source, index, detail });
        } else {
            self.truncated = true;
        }
    }

    pub fn malformed_records(&self) -> usize {
        let c = &self.counts;
        c.malformed_beneficiaries + c.malformed_operators + c.malformed_assignments + c.malformed_calls
    }

    /// Whether anything needs manual review: skipped records, orphans,
    /// ambiguous matches or a failed metrics cross-check.
    pub fn needs_review(&self) -> bool {
        self.malformed_records() > 0
            || self.counts.orphan_assignments > 0
            || self.counts.ambiguous_matches > 0
            || self.counts.integrity_failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind_and_source() {
        let mut d = Diagnostics::new(10);
        d.record(DiagnosticKind::Malformed, RecordSource::Beneficiaries, Some(0), "no name");
        d.record(DiagnosticKind::Malformed, RecordSource::Calls, Some(3), "no identity");
        d.record(DiagnosticKind::OrphanAssignment, RecordSource::Assignments, Some(1), "x");
        assert_eq!(d.counts.malformed_beneficiaries, 1);
        assert_eq!(d.counts.malformed_calls, 1);
        assert_eq!(d.counts.orphan_assignments, 1);
        assert_eq!(d.malformed_records(), 2);
        assert_eq!(d.entries.len(), 3);
        assert!(d.needs_review());
    }

    #[test]
    fn entries_capped_counts_not() {
        let mut d = Diagnostics::new(2);
        for i in 0..5 {
            d.record(DiagnosticKind::InvalidDuration, RecordSource::Calls, Some(i), "-5");
        }
        assert_eq!(d.counts.invalid_durations, 5);
        assert_eq!(d.entries.len(), 2);
        assert!(d.truncated);
    }

    #[test]
    fn soft_issues_do_not_need_review() {
        let mut d = Diagnostics::default();
        d.record(DiagnosticKind::NoValidPhone, RecordSource::Beneficiaries, Some(0), "");
        d.record(DiagnosticKind::UnparseableTimestamp, RecordSource::Calls, Some(0), "ayer");
        assert!(!d.needs_review());
        assert!(!d.truncated);
    }
}
