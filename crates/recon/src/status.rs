//! Recency-based beneficiary status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::StatusThresholds;
use crate::model::{
    BeneficiaryRecord, BeneficiaryStatus, BeneficiaryStatusRow, ReconciliationResult, StatusReport,
    StatusSummary,
};

/// Whole days from `last` to `now`; a `last` in the future counts as 0.
pub fn days_since(last: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last).num_days().max(0)
}

/// Never called successfully: Urgent. Otherwise by days since the last
/// successful call, with both thresholds inclusive.
pub fn classify_beneficiary_status(
    last_successful_call: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &StatusThresholds,
) -> BeneficiaryStatus {
    let Some(last) = last_successful_call else {
        return BeneficiaryStatus::Urgent;
    };
    let days = days_since(last, now);
    if days <= thresholds.up_to_date_days {
        BeneficiaryStatus::UpToDate
    } else if days <= thresholds.pending_days {
        BeneficiaryStatus::Pending
    } else {
        BeneficiaryStatus::Urgent
    }
}

/// One row per registry beneficiary, in registry order.
pub fn build_status_report(
    beneficiaries: &[BeneficiaryRecord],
    last_success_by_id: &BTreeMap<String, DateTime<Utc>>,
    reconciliation: &ReconciliationResult,
    now: DateTime<Utc>,
    thresholds: &StatusThresholds,
) -> StatusReport {
    let mut summary = StatusSummary::default();
    let rows = beneficiaries
        .iter()
        .map(|b| {
            let last = last_success_by_id.get(&b.id).copied();
            let status = classify_beneficiary_status(last, now, thresholds);
            match status {
                BeneficiaryStatus::UpToDate => summary.up_to_date += 1,
                BeneficiaryStatus::Pending => summary.pending += 1,
                BeneficiaryStatus::Urgent => summary.urgent += 1,
            }
            BeneficiaryStatusRow {
                beneficiary_id: b.id.clone(),
                name: b.name.clone(),
                operator_id: reconciliation.operator_for(&b.id).map(str::to_string),
                last_successful_call: last,
                days_since: last.map(|l| days_since(l, now)),
                status,
            }
        })
        .collect();

    StatusReport { summary, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
    }

    fn status(days_ago: Option<i64>) -> BeneficiaryStatus {
        let last = days_ago.map(|d| now() - Duration::days(d));
        classify_beneficiary_status(last, now(), &StatusThresholds::default())
    }

    #[test]
    fn default_thresholds() {
        assert_eq!(status(Some(10)), BeneficiaryStatus::UpToDate);
        assert_eq!(status(Some(20)), BeneficiaryStatus::Pending);
        assert_eq!(status(Some(40)), BeneficiaryStatus::Urgent);
        assert_eq!(status(None), BeneficiaryStatus::Urgent);
    }

    #[test]
    fn boundaries_are_inclusive() {
        assert_eq!(status(Some(0)), BeneficiaryStatus::UpToDate);
        assert_eq!(status(Some(15)), BeneficiaryStatus::UpToDate);
        assert_eq!(status(Some(16)), BeneficiaryStatus::Pending);
        assert_eq!(status(Some(30)), BeneficiaryStatus::Pending);
        assert_eq!(status(Some(31)), BeneficiaryStatus::Urgent);
    }

    #[test]
    fn future_call_counts_as_today() {
        assert_eq!(status(Some(-3)), BeneficiaryStatus::UpToDate);
        assert_eq!(days_since(now() + Duration::days(3), now()), 0);
    }

    #[test]
    fn custom_thresholds() {
        let t = StatusThresholds {
            up_to_date_days: 7,
            pending_days: 7,
        };
        let last = Some(now() - Duration::days(8));
        assert_eq!(classify_beneficiary_status(last, now(), &t), BeneficiaryStatus::Urgent);
    }

    #[test]
    fn report_rows_and_summary() {
        let bene = |id: &str| BeneficiaryRecord {
            id: id.into(),
            name: format!("Beneficiario {id}"),
            address: None,
            phones: vec![],
            created_at: None,
        };
        let benes = vec![bene("a"), bene("b"), bene("c")];
        let mut last = BTreeMap::new();
        last.insert("a".to_string(), now() - Duration::days(2));
        last.insert("b".to_string(), now() - Duration::days(25));
        let mut recon = ReconciliationResult::default();
        recon.mapping.insert("a".into(), "carla".into());

        let report = build_status_report(&benes, &last, &recon, now(), &StatusThresholds::default());
        assert_eq!(
            report.summary,
            StatusSummary {
                up_to_date: 1,
                pending: 1,
                urgent: 1
            }
        );
        assert_eq!(report.rows[0].operator_id.as_deref(), Some("carla"));
        assert_eq!(report.rows[0].days_since, Some(2));
        assert_eq!(report.rows[2].days_since, None);
        assert_eq!(report.rows[2].status, BeneficiaryStatus::Urgent);
    }
}
