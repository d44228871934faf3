//! Per-operator and global call statistics.
//!
//! One pass over the call log. Global totals are accumulated alongside the
//! per-operator counters, never summed from them, so [`MetricsReport::cross_check`]
//! has something independent to compare against.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::{OutcomeRules, ReconConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics, RecordSource};
use crate::error::ReconError;
use crate::matcher::{records_match, Identity};
use crate::model::{
    BeneficiaryRecord, CallEventRecord, CallOperator, CallOutcome, GlobalMetrics, MetricsReport,
    OperatorMetrics, ReconciliationResult, ResolvedOperator,
};
use crate::normalize::{normalize_name, NormalizedName, NormalizedPhone};
use crate::roster::OperatorDirectory;

pub const UNASSIGNED_LABEL: &str = "(unassigned)";

// ---------------------------------------------------------------------------
// Outcome classification
// ---------------------------------------------------------------------------

/// Outcome keywords, normalized once per run.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    success: Vec<NormalizedName>,
    failure: Vec<NormalizedName>,
}

impl OutcomeClassifier {
    pub fn new(rules: &OutcomeRules) -> Self {
        let prepare = |keywords: &[String]| -> Vec<NormalizedName> {
            keywords
                .iter()
                .map(|k| normalize_name(k))
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            success: prepare(&rules.success_keywords),
            failure: prepare(&rules.failure_keywords),
        }
    }

    /// A structured flag wins over text. Otherwise any failure keyword makes
    /// the call Failed, then any success keyword makes it Successful, and
    /// everything else is Failed.
    pub fn classify(&self, text: Option<&str>, success_flag: Option<bool>) -> CallOutcome {
        if let Some(flag) = success_flag {
            return if flag {
                CallOutcome::Successful
            } else {
                CallOutcome::Failed
            };
        }

        let text = normalize_name(text.unwrap_or_default());
        if text.is_empty() {
            return CallOutcome::Failed;
        }
        let contains = |k: &NormalizedName| text.as_str().contains(k.as_str());
        if self.failure.iter().any(contains) {
            CallOutcome::Failed
        } else if self.success.iter().any(contains) {
            CallOutcome::Successful
        } else {
            CallOutcome::Failed
        }
    }
}

/// One-off classification; builds the keyword set on every call.
pub fn classify_outcome(text: Option<&str>, success_flag: Option<bool>, rules: &OutcomeRules) -> CallOutcome {
    OutcomeClassifier::new(rules).classify(text, success_flag)
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

/// Who a call counts for: its explicit operator, else the operator its
/// beneficiary is mapped to, else nobody. An explicit operator applies even
/// when the beneficiary itself is unassigned.
pub fn resolve_call_operator(
    explicit: Option<&ResolvedOperator>,
    beneficiary_id: Option<&str>,
    reconciliation: &ReconciliationResult,
) -> CallOperator {
    if let Some(op) = explicit {
        return CallOperator::Operator(op.id.clone());
    }
    beneficiary_id
        .and_then(|id| reconciliation.operator_for(id))
        .map_or(CallOperator::Unassigned, |id| CallOperator::Operator(id.to_string()))
}

/// Resolves a call's beneficiary identity against the registry: exact phone,
/// then exact name, then the fuzzy scan. Lives for one run only.
struct BeneficiaryResolver<'a> {
    beneficiaries: &'a [BeneficiaryRecord],
    identities: Vec<Identity>,
    by_phone: HashMap<NormalizedPhone, usize>,
    by_name: HashMap<NormalizedName, usize>,
    threshold: f64,
    memo: HashMap<Identity, Option<usize>>,
}

impl<'a> BeneficiaryResolver<'a> {
    fn new(beneficiaries: &'a [BeneficiaryRecord], threshold: f64, min_phone_len: usize) -> Self {
        let identities: Vec<Identity> = beneficiaries
            .iter()
            .map(|b| Identity::new(Some(&b.name), &b.phones, min_phone_len))
            .collect();

        let mut by_phone = HashMap::new();
        let mut by_name = HashMap::new();
        for (i, ident) in identities.iter().enumerate() {
            for phone in &ident.phones {
                by_phone.entry(phone.clone()).or_insert(i);
            }
            if !ident.name.is_empty() {
                by_name.entry(ident.name.clone()).or_insert(i);
            }
        }

        Self {
            beneficiaries,
            identities,
            by_phone,
            by_name,
            threshold,
            memo: HashMap::new(),
        }
    }

    fn resolve(&mut self, ident: &Identity) -> Option<&'a BeneficiaryRecord> {
        if ident.is_empty() {
            return None;
        }
        let found = match self.memo.get(ident) {
            Some(hit) => *hit,
            None => {
                let found = ident
                    .phones
                    .iter()
                    .find_map(|p| self.by_phone.get(p).copied())
                    .or_else(|| self.by_name.get(&ident.name).copied())
                    .or_else(|| {
                        self.identities
                            .iter()
                            .position(|b| records_match(b, ident, self.threshold))
                    });
                self.memo.insert(ident.clone(), found);
                found
            }
        };
        let beneficiaries = self.beneficiaries;
        found.map(|i| &beneficiaries[i])
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tally {
    total: u64,
    successful: u64,
    failed: u64,
    duration_secs: u64,
    beneficiaries: HashSet<String>,
    last_call_at: Option<DateTime<Utc>>,
}

impl Tally {
    fn add(&mut self, outcome: CallOutcome, duration_secs: u64, beneficiary: Option<&str>, at: Option<DateTime<Utc>>) {
        self.total += 1;
        match outcome {
            CallOutcome::Successful => self.successful += 1,
            CallOutcome::Failed => self.failed += 1,
        }
        self.duration_secs = self.duration_secs.saturating_add(duration_secs);
        if let Some(key) = beneficiary {
            self.beneficiaries.insert(key.to_string());
        }
        if at > self.last_call_at {
            self.last_call_at = at;
        }
    }

    fn average_duration(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.duration_secs as f64 / self.total as f64
        }
    }

    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }
}

/// Attribute every call to an operator and roll up the statistics.
///
/// Every operator named by the roster or the assignment list gets a row, even
/// with zero calls. Calls attributable to nobody land in one extra row with
/// `operator_id = None`.
pub fn aggregate(
    calls: &[CallEventRecord],
    beneficiaries: &[BeneficiaryRecord],
    reconciliation: &ReconciliationResult,
    directory: &mut OperatorDirectory,
    config: &ReconConfig,
    diagnostics: &mut Diagnostics,
) -> MetricsReport {
    let classifier = OutcomeClassifier::new(&config.outcomes);
    let min_phone_len = config.matching.min_phone_length;
    let mut resolver = BeneficiaryResolver::new(beneficiaries, config.matching.name_threshold, min_phone_len);

    let mut known: BTreeMap<String, ResolvedOperator> = reconciliation.operators.clone();
    for op in directory.roster() {
        known.entry(op.id.clone()).or_insert(op);
    }

    let mut per: BTreeMap<CallOperator, Tally> = known
        .keys()
        .map(|id| (CallOperator::Operator(id.clone()), Tally::default()))
        .collect();
    let mut global = Tally::default();
    let mut last_success: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();

    for (index, call) in calls.iter().enumerate() {
        let ident = Identity::new(call.beneficiary.as_deref(), &call.phones, min_phone_len);
        let beneficiary = resolver.resolve(&ident);

        let beneficiary_key = match beneficiary {
            Some(b) => Some(b.id.clone()),
            None if !ident.is_empty() => {
                diagnostics.record(
                    DiagnosticKind::UnresolvedBeneficiary,
                    RecordSource::Calls,
                    Some(index),
                    format!(
                        "'{}' matches no registered beneficiary",
                        call.beneficiary.as_deref().unwrap_or_default()
                    ),
                );
                Some(unresolved_key(&ident))
            }
            None => None,
        };

        let explicit = call
            .operator
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|raw| directory.resolve_reported(raw, RecordSource::Calls, index, diagnostics));

        let beneficiary_id = beneficiary.map(|b| b.id.as_str());
        if let (Some(op), Some(mapped)) = (
            explicit.as_ref(),
            beneficiary_id.and_then(|id| reconciliation.operator_for(id)),
        ) {
            if op.id != mapped {
                diagnostics.record(
                    DiagnosticKind::OperatorConflict,
                    RecordSource::Calls,
                    Some(index),
                    format!("call names '{}' but beneficiary is assigned to '{mapped}'", op.id),
                );
            }
        }

        let operator = resolve_call_operator(explicit.as_ref(), beneficiary_id, reconciliation);
        if let Some(op) = explicit {
            known.entry(op.id.clone()).or_insert(op);
        }

        let outcome = classifier.classify(call.outcome.as_deref(), call.success_flag);
        let key = beneficiary_key.as_deref();
        per.entry(operator)
            .or_default()
            .add(outcome, call.duration_secs, key, call.timestamp);
        global.add(outcome, call.duration_secs, key, call.timestamp);

        if let (CallOutcome::Successful, Some(b), Some(at)) = (outcome, beneficiary, call.timestamp) {
            let latest = last_success.entry(b.id.clone()).or_insert(at);
            if at > *latest {
                *latest = at;
            }
        }
    }

    let unassigned_calls = per.get(&CallOperator::Unassigned).map_or(0, |t| t.total);
    let mut per_operator: Vec<OperatorMetrics> = per
        .into_iter()
        .map(|(key, tally)| operator_row(key, tally, &known))
        .collect();
    per_operator.sort_by(|a, b| {
        b.total_calls
            .cmp(&a.total_calls)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });

    let operators_with_calls = per_operator
        .iter()
        .filter(|m| m.operator_id.is_some() && m.total_calls > 0)
        .count();

    MetricsReport {
        per_operator,
        global: GlobalMetrics {
            total_calls: global.total,
            successful_calls: global.successful,
            failed_calls: global.failed,
            total_duration_secs: global.duration_secs,
            average_duration_secs: global.average_duration(),
            success_rate: global.success_rate(),
            distinct_beneficiaries: global.beneficiaries.len(),
            operators_with_calls,
            unassigned_calls,
        },
        last_success_by_beneficiary: last_success,
    }
}

fn unresolved_key(ident: &Identity) -> String {
    match ident.phones.iter().next() {
        Some(phone) if ident.name.is_empty() => format!("phone:{phone}"),
        _ => format!("name:{}", ident.name),
    }
}

fn operator_row(key: CallOperator, tally: Tally, known: &BTreeMap<String, ResolvedOperator>) -> OperatorMetrics {
    let (operator_id, display_name, in_roster, active) = match key {
        CallOperator::Operator(id) => match known.get(&id) {
            Some(op) => (Some(id), op.display_name.clone(), op.in_roster, op.active),
            None => (Some(id.clone()), id, false, true),
        },
        CallOperator::Unassigned => (None, UNASSIGNED_LABEL.to_string(), false, false),
    };

    OperatorMetrics {
        operator_id,
        display_name,
        in_roster,
        active,
        total_calls: tally.total,
        successful_calls: tally.successful,
        failed_calls: tally.failed,
        total_duration_secs: tally.duration_secs,
        average_duration_secs: tally.average_duration(),
        success_rate: tally.success_rate(),
        distinct_beneficiaries: tally.beneficiaries.len(),
        last_call_at: tally.last_call_at,
    }
}

impl MetricsReport {
    /// Per-operator sums must equal the independently accumulated globals.
    pub fn cross_check(&self) -> Result<(), ReconError> {
        let sum = |f: fn(&OperatorMetrics) -> u64| {
            self.per_operator.iter().map(f).fold(0u64, u64::saturating_add)
        };
        let unassigned = self
            .per_operator
            .iter()
            .filter(|m| m.operator_id.is_none())
            .map(|m| m.total_calls)
            .sum::<u64>();

        let checks = [
            ("total_calls", sum(|m| m.total_calls), self.global.total_calls),
            ("successful_calls", sum(|m| m.successful_calls), self.global.successful_calls),
            ("failed_calls", sum(|m| m.failed_calls), self.global.failed_calls),
            ("total_duration_secs", sum(|m| m.total_duration_secs), self.global.total_duration_secs),
            ("unassigned_calls", unassigned, self.global.unassigned_calls),
        ];

        for (field, rows, global) in checks {
            if rows != global {
                return Err(ReconError::Integrity(format!(
                    "{field}: per-operator sum {rows} != global {global}"
                )));
            }
        }
        if self.global.successful_calls + self.global.failed_calls != self.global.total_calls {
            return Err(ReconError::Integrity(format!(
                "successful ({}) + failed ({}) != total ({})",
                self.global.successful_calls, self.global.failed_calls, self.global.total_calls
            )));
        }
        Ok(())
    }

    pub fn for_operator(&self, operator_id: &str) -> Option<&OperatorMetrics> {
        self.per_operator
            .iter()
            .find(|m| m.operator_id.as_deref() == Some(operator_id))
    }

    pub fn unassigned(&self) -> Option<&OperatorMetrics> {
        self.per_operator.iter().find(|m| m.operator_id.is_none())
    }
}
