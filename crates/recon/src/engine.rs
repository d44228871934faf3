use chrono::{DateTime, Utc};

use crate::config::ReconConfig;
use crate::diagnostics::{DiagnosticKind, Diagnostics, RecordSource};
use crate::error::ReconError;
use crate::ingest::ingest;
use crate::metrics::aggregate;
use crate::model::{InputCounts, MetricsReport, ReconInput, ReconMeta, ReconReport, RecordSet};
use crate::reconcile::{build_assignment_index, reconcile};
use crate::roster::OperatorDirectory;
use crate::status::build_status_report;

/// Run one reconciliation over loose snapshots. `now` anchors the
/// beneficiary status windows and the report timestamp.
///
/// Fails only on an invalid config; bad records end up in the report's
/// diagnostics.
pub fn run(config: &ReconConfig, input: &ReconInput, now: DateTime<Utc>) -> Result<ReconReport, ReconError> {
    config.validate()?;

    let mut diagnostics = Diagnostics::new(config.diagnostics.max_entries);
    let records = ingest(input, config.matching.min_phone_length, &mut diagnostics);
    let counts = InputCounts {
        beneficiaries: input.beneficiaries.len(),
        operators: input.operators.len(),
        assignments: input.assignments.len(),
        calls: input.calls.len(),
    };

    Ok(execute(config, &records, counts, now, diagnostics))
}

/// Same as [`run`] for callers that already hold typed records.
pub fn run_records(config: &ReconConfig, records: &RecordSet, now: DateTime<Utc>) -> Result<ReconReport, ReconError> {
    config.validate()?;

    let counts = InputCounts {
        beneficiaries: records.beneficiaries.len(),
        operators: records.operators.len(),
        assignments: records.assignments.len(),
        calls: records.calls.len(),
    };
    let diagnostics = Diagnostics::new(config.diagnostics.max_entries);

    Ok(execute(config, records, counts, now, diagnostics))
}

fn execute(
    config: &ReconConfig,
    records: &RecordSet,
    input_counts: InputCounts,
    now: DateTime<Utc>,
    mut diagnostics: Diagnostics,
) -> ReconReport {
    let min_phone_len = config.matching.min_phone_length;

    let mut directory = OperatorDirectory::new(&records.operators);
    let index = build_assignment_index(&records.assignments, &mut directory, min_phone_len, &mut diagnostics);
    let reconciliation = reconcile(&records.beneficiaries, &index, &config.matching, &mut diagnostics);

    let metrics = aggregate(
        &records.calls,
        &records.beneficiaries,
        &reconciliation,
        &mut directory,
        config,
        &mut diagnostics,
    );
    check_integrity(&config.name, &metrics, &mut diagnostics);

    let statuses = build_status_report(
        &records.beneficiaries,
        &metrics.last_success_by_beneficiary,
        &reconciliation,
        now,
        &config.status,
    );

    log::info!(
        "{}: {} beneficiaries ({} assigned, {} unassigned), {} orphan assignments, {} ambiguous, {} calls",
        config.name,
        records.beneficiaries.len(),
        reconciliation.mapping.len(),
        reconciliation.unassigned.len(),
        reconciliation.orphans.len(),
        reconciliation.ambiguous.len(),
        metrics.global.total_calls,
    );
    if diagnostics.truncated {
        log::info!(
            "{}: diagnostic details truncated at {} entries",
            config.name,
            diagnostics.entries.len()
        );
    }

    ReconReport {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: now.to_rfc3339(),
            strategy: config.matching.strategy,
            input_counts,
        },
        reconciliation,
        metrics,
        statuses,
        diagnostics,
    }
}

/// A failed cross-check is logged and counted; the run still completes.
fn check_integrity(name: &str, metrics: &MetricsReport, diagnostics: &mut Diagnostics) {
    if let Err(e) = metrics.cross_check() {
        log::warn!("{name}: {e}");
        diagnostics.record(DiagnosticKind::IntegrityMismatch, RecordSource::Calls, None, e.to_string());
    }
}
