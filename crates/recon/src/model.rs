use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alias::LooseRecord;
use crate::config::MatchStrategy;
use crate::diagnostics::Diagnostics;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// The raw snapshots handed to one run, in loose (alias-bearing) form.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub beneficiaries: Vec<LooseRecord>,
    /// Optional roster; an empty roster leaves operator references as text.
    pub operators: Vec<LooseRecord>,
    pub assignments: Vec<LooseRecord>,
    pub calls: Vec<LooseRecord>,
}

/// Snapshots after alias resolution. Only canonical fields from here on.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub beneficiaries: Vec<BeneficiaryRecord>,
    pub operators: Vec<OperatorRecord>,
    pub assignments: Vec<AssignmentRecord>,
    pub calls: Vec<CallEventRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeneficiaryRecord {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    /// Raw phone values, at most three.
    pub phones: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRecord {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub active: bool,
}

/// One declared operator ↔ beneficiary link. The three operator fields are
/// kept apart because upstream producers fill them inconsistently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentRecord {
    pub operator_id: Option<String>,
    pub operator_name: Option<String>,
    pub operator: Option<String>,
    pub beneficiary_name: Option<String>,
    pub phones: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallEventRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    /// Structured success flag, when the producer sends one.
    pub success_flag: Option<bool>,
    pub duration_secs: u64,
    pub beneficiary: Option<String>,
    pub phones: Vec<String>,
    pub operator: Option<String>,
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// An operator reference after roster resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOperator {
    /// Roster id, or the normalized reference text when not on the roster.
    pub id: String,
    pub display_name: String,
    pub in_roster: bool,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEvidence {
    Name,
    Phone,
    NameAndPhone,
}

impl std::fmt::Display for MatchEvidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Phone => write!(f, "phone"),
            Self::NameAndPhone => write!(f, "name_and_phone"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BeneficiaryMatch {
    pub beneficiary_id: String,
    pub operator_id: String,
    pub assignment_index: usize,
    pub evidence: MatchEvidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnassignedBeneficiary {
    pub beneficiary_id: String,
    pub name: String,
    pub has_valid_phone: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrphanAssignment {
    pub assignment_index: usize,
    pub beneficiary_name: String,
    pub phones: Vec<String>,
    pub operator_id: String,
}

/// A beneficiary whose matching assignments name more than one operator.
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousMatch {
    pub beneficiary_id: String,
    pub chosen_operator: String,
    pub candidate_operators: Vec<String>,
    pub candidate_indices: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationResult {
    /// beneficiary id -> operator id, assigned beneficiaries only.
    pub mapping: BTreeMap<String, String>,
    pub matches: Vec<BeneficiaryMatch>,
    pub unassigned: Vec<UnassignedBeneficiary>,
    pub orphans: Vec<OrphanAssignment>,
    pub ambiguous: Vec<AmbiguousMatch>,
    /// Display names for every operator id that appears in the mapping or orphans.
    pub operators: BTreeMap<String, ResolvedOperator>,
}

impl ReconciliationResult {
    /// Operator assigned to a beneficiary, `None` when unassigned or unknown.
    pub fn operator_for(&self, beneficiary_id: &str) -> Option<&str> {
        self.mapping.get(beneficiary_id).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Successful,
    Failed,
}

/// Who a call is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOperator {
    Operator(String),
    Unassigned,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorMetrics {
    /// `None` for the bucket of calls no operator could be attributed to.
    pub operator_id: Option<String>,
    pub display_name: String,
    pub in_roster: bool,
    pub active: bool,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_duration_secs: u64,
    pub average_duration_secs: f64,
    /// successful / total, in [0, 1].
    pub success_rate: f64,
    pub distinct_beneficiaries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_call_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_duration_secs: u64,
    pub average_duration_secs: f64,
    pub success_rate: f64,
    pub distinct_beneficiaries: usize,
    pub operators_with_calls: usize,
    pub unassigned_calls: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsReport {
    pub per_operator: Vec<OperatorMetrics>,
    pub global: GlobalMetrics,
    /// Latest successful call per resolved beneficiary id.
    #[serde(skip)]
    pub last_success_by_beneficiary: BTreeMap<String, DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Beneficiary status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BeneficiaryStatus {
    UpToDate,
    Pending,
    Urgent,
}

impl std::fmt::Display for BeneficiaryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up_to_date"),
            Self::Pending => write!(f, "pending"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BeneficiaryStatusRow {
    pub beneficiary_id: String,
    pub name: String,
    pub operator_id: Option<String>,
    pub last_successful_call: Option<DateTime<Utc>>,
    pub days_since: Option<i64>,
    pub status: BeneficiaryStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub up_to_date: usize,
    pub pending: usize,
    pub urgent: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub summary: StatusSummary,
    pub rows: Vec<BeneficiaryStatusRow>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct InputCounts {
    pub beneficiaries: usize,
    pub operators: usize,
    pub assignments: usize,
    pub calls: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub strategy: MatchStrategy,
    pub input_counts: InputCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub meta: ReconMeta,
    pub reconciliation: ReconciliationResult,
    pub metrics: MetricsReport,
    pub statuses: StatusReport,
    pub diagnostics: Diagnostics,
}
