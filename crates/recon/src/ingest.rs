//! Loose snapshot text -> loose records -> typed records.
//!
//! The loaders parse already-read text; opening files is the caller's job.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::alias::{self, LooseRecord};
use crate::diagnostics::{DiagnosticKind, Diagnostics, RecordSource};
use crate::error::ReconError;
use crate::model::{
    AssignmentRecord, BeneficiaryRecord, CallEventRecord, OperatorRecord, ReconInput, RecordSet,
};
use crate::normalize::{normalize_name, normalize_phone};

const MAX_BENEFICIARY_PHONES: usize = 3;

// ---------------------------------------------------------------------------
// Snapshot loaders
// ---------------------------------------------------------------------------

/// Parse a JSON snapshot.
///
/// Accepts either an array of objects or a document-store export mapping
/// document id -> object. In the map form the key becomes `id` unless the
/// object already carries one. Non-object array elements become empty
/// records (reported as malformed downstream, keeping indices stable).
pub fn load_json_records(source_name: &str, text: &str) -> Result<Vec<LooseRecord>, ReconError> {
    let parse_err = |message: String| ReconError::InputParse {
        source_name: source_name.into(),
        message,
    };

    let value: Value = serde_json::from_str(text).map_err(|e| parse_err(e.to_string()))?;

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                _ => LooseRecord::new(),
            })
            .collect()),
        Value::Object(map) if map.values().all(Value::is_object) => Ok(map
            .into_iter()
            .filter_map(|(doc_id, item)| match item {
                Value::Object(mut record) => {
                    if alias::first_text(&record, &["id"]).is_none() {
                        record.insert("id".into(), Value::String(doc_id));
                    }
                    Some(record)
                }
                _ => None,
            })
            .collect()),
        _ => Err(parse_err(
            "expected an array of objects or an object of id -> object".into(),
        )),
    }
}

/// Parse a headed CSV snapshot. Empty cells are left out of the record.
pub fn load_csv_records(source_name: &str, text: &str) -> Result<Vec<LooseRecord>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::InputParse {
            source_name: source_name.into(),
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ReconError::InputParse {
            source_name: source_name.into(),
            message: e.to_string(),
        })?;

        let mut record = LooseRecord::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if !cell.is_empty() {
                record.insert(header.clone(), Value::String(cell.to_string()));
            }
        }
        records.push(record);
    }

    Ok(records)
}

// ---------------------------------------------------------------------------
// Typed ingestion
// ---------------------------------------------------------------------------

/// Resolve aliases on every snapshot, skipping and counting malformed records.
pub fn ingest(input: &ReconInput, min_phone_len: usize, diagnostics: &mut Diagnostics) -> RecordSet {
    RecordSet {
        beneficiaries: ingest_beneficiaries(&input.beneficiaries, min_phone_len, diagnostics),
        operators: ingest_operators(&input.operators, diagnostics),
        assignments: ingest_assignments(&input.assignments),
        calls: ingest_calls(&input.calls, diagnostics),
    }
}

pub fn ingest_beneficiaries(
    records: &[LooseRecord],
    min_phone_len: usize,
    diagnostics: &mut Diagnostics,
) -> Vec<BeneficiaryRecord> {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let Some(name) = alias::first_text(record, alias::BENEFICIARY_NAME) else {
            diagnostics.record(
                DiagnosticKind::Malformed,
                RecordSource::Beneficiaries,
                Some(index),
                "no name field",
            );
            continue;
        };

        if normalize_name(&name).is_empty() {
            diagnostics.record(
                DiagnosticKind::Malformed,
                RecordSource::Beneficiaries,
                Some(index),
                format!("name '{name}' has no letters or digits"),
            );
            continue;
        }

        let id = match alias::first_text(record, alias::BENEFICIARY_ID) {
            Some(id) => id,
            None => {
                let generated = format!("row-{index}");
                diagnostics.record(
                    DiagnosticKind::GeneratedId,
                    RecordSource::Beneficiaries,
                    Some(index),
                    format!("'{name}' has no id; using {generated}"),
                );
                generated
            }
        };

        if !seen_ids.insert(id.clone()) {
            diagnostics.record(
                DiagnosticKind::DuplicateId,
                RecordSource::Beneficiaries,
                Some(index),
                format!("id '{id}' already seen; record skipped"),
            );
            continue;
        }

        let phones = pick_beneficiary_phones(alias::all_texts(record, alias::PHONES), min_phone_len);
        if !phones.iter().any(|p| normalize_phone(p, min_phone_len).is_ok()) {
            diagnostics.record(
                DiagnosticKind::NoValidPhone,
                RecordSource::Beneficiaries,
                Some(index),
                format!("'{id}' has no usable phone"),
            );
        }

        out.push(BeneficiaryRecord {
            id,
            name,
            address: alias::first_text(record, alias::ADDRESS),
            phones,
            created_at: alias::first_value(record, alias::CREATED_AT).and_then(parse_timestamp_value),
        });
    }

    out
}

/// Distinct raw phones, usable ones first, at most three.
fn pick_beneficiary_phones(raws: Vec<String>, min_phone_len: usize) -> Vec<String> {
    let mut distinct: Vec<String> = Vec::new();
    for raw in raws {
        if !distinct.contains(&raw) {
            distinct.push(raw);
        }
    }
    let (mut valid, invalid): (Vec<String>, Vec<String>) = distinct
        .into_iter()
        .partition(|p| normalize_phone(p, min_phone_len).is_ok());
    valid.extend(invalid);
    valid.truncate(MAX_BENEFICIARY_PHONES);
    valid
}

pub fn ingest_operators(records: &[LooseRecord], diagnostics: &mut Diagnostics) -> Vec<OperatorRecord> {
    let mut out = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let id = alias::first_text(record, alias::OPERATOR_RECORD_ID);
        let display_name = alias::first_text(record, alias::OPERATOR_RECORD_NAME);

        let (id, display_name) = match (id, display_name) {
            (Some(id), Some(name)) => (id, name),
            (Some(id), None) => (id.clone(), id),
            (None, Some(name)) => (normalize_name(&name).to_string(), name),
            (None, None) => {
                diagnostics.record(
                    DiagnosticKind::Malformed,
                    RecordSource::Operators,
                    Some(index),
                    "no id or name field",
                );
                continue;
            }
        };

        out.push(OperatorRecord {
            id,
            display_name,
            email: alias::first_text(record, alias::EMAIL),
            active: alias::first_flag(record, alias::ACTIVE).unwrap_or(true),
        });
    }

    out
}

/// Assignments are kept verbatim here; whether one is usable is decided when
/// the assignment index is built.
pub fn ingest_assignments(records: &[LooseRecord]) -> Vec<AssignmentRecord> {
    records
        .iter()
        .map(|record| AssignmentRecord {
            operator_id: alias::first_text(record, alias::OPERATOR_ID),
            operator_name: alias::first_text(record, alias::OPERATOR_NAME),
            operator: alias::first_text(record, alias::OPERATOR_GENERIC),
            beneficiary_name: alias::first_text(record, alias::ASSIGNMENT_BENEFICIARY),
            phones: alias::all_texts(record, alias::PHONES),
        })
        .collect()
}

pub fn ingest_calls(records: &[LooseRecord], diagnostics: &mut Diagnostics) -> Vec<CallEventRecord> {
    let mut out = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let beneficiary = alias::first_text(record, alias::CALL_BENEFICIARY);
        let phones = alias::all_texts(record, alias::CALL_PHONES);
        let operator = alias::first_text(record, alias::CALL_OPERATOR);

        if beneficiary.is_none() && phones.is_empty() && operator.is_none() {
            diagnostics.record(
                DiagnosticKind::Malformed,
                RecordSource::Calls,
                Some(index),
                "no beneficiary, phone or operator field",
            );
            continue;
        }

        let timestamp = match alias::first_value(record, alias::CALL_TIMESTAMP) {
            None => None,
            Some(value) => {
                let parsed = parse_timestamp_value(value);
                if parsed.is_none() {
                    diagnostics.record(
                        DiagnosticKind::UnparseableTimestamp,
                        RecordSource::Calls,
                        Some(index),
                        format!("timestamp {value}"),
                    );
                }
                parsed
            }
        };

        let duration_secs = match alias::first_value(record, alias::CALL_DURATION) {
            None => 0,
            Some(value) => match parse_duration_value(value) {
                Some(secs) => secs,
                None => {
                    diagnostics.record(
                        DiagnosticKind::InvalidDuration,
                        RecordSource::Calls,
                        Some(index),
                        format!("duration {value}"),
                    );
                    0
                }
            },
        };

        out.push(CallEventRecord {
            timestamp,
            outcome: alias::first_text(record, alias::CALL_OUTCOME),
            success_flag: alias::first_flag(record, alias::CALL_SUCCESS_FLAG),
            duration_secs,
            beneficiary,
            phones,
            operator,
        });
    }

    out
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Epoch values at or above this are taken as milliseconds.
const EPOCH_MILLIS_FLOOR: i64 = 100_000_000_000;

/// Parse a timestamp in any of the shapes upstream producers emit. Zone-less
/// values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = raw.parse().ok()?;
        return epoch_to_utc(n);
    }

    None
}

fn epoch_to_utc(n: i64) -> Option<DateTime<Utc>> {
    if n >= EPOCH_MILLIS_FLOOR {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

/// Like [`parse_timestamp`], also accepting epoch numbers and the
/// `{"_seconds": .., "_nanoseconds": ..}` objects document-store exports use.
pub fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => epoch_to_utc(n.as_i64()?),
        Value::Object(map) => {
            let secs = alias::first_value(map, &["_seconds", "seconds"])?.as_i64()?;
            let nanos = alias::first_value(map, &["_nanoseconds", "nanoseconds"])
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

/// Parse a call duration as whole seconds: integer or decimal seconds, or
/// `mm:ss` / `hh:mm:ss`. Negative or unreadable values yield `None`.
pub fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();

    if raw.contains(':') {
        let mut total: u64 = 0;
        for part in raw.split(':') {
            let n: u64 = part.trim().parse().ok()?;
            total = total.checked_mul(60)?.checked_add(n)?;
        }
        return Some(total);
    }

    let secs: f64 = raw.replace(',', ".").parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| secs.round() as u64)
}

fn parse_duration_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            (secs.is_finite() && secs >= 0.0).then(|| secs.round() as u64)
        }
        Value::String(s) => parse_duration(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<LooseRecord> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn json_array_and_id_map() {
        let arr = load_json_records("b", r#"[{"nombre":"Ana"}, 3]"#).unwrap();
        assert_eq!(arr.len(), 2);
        assert!(arr[1].is_empty());

        let map = load_json_records(
            "b",
            r#"{"doc1": {"nombre": "Ana"}, "doc2": {"id": "own", "nombre": "Luis"}}"#,
        )
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0]["id"], "doc1");
        assert_eq!(map[1]["id"], "own");
    }

    #[test]
    fn json_rejects_scalars() {
        let err = load_json_records("calls", "42").unwrap_err();
        assert!(err.to_string().contains("calls"));
        assert!(load_json_records("calls", "{not json").is_err());
    }

    #[test]
    fn csv_skips_empty_cells() {
        let csv = "\u{feff}nombre,telefono,operador\nJuan Pérez,987654321,\n,  ,María\n";
        let rows = load_csv_records("asignaciones", csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["nombre"], "Juan Pérez");
        assert!(!rows[0].contains_key("operador"));
        assert_eq!(rows[1].len(), 1);
        assert_eq!(rows[1]["operador"], "María");
    }

    #[test]
    fn beneficiaries_malformed_generated_and_duplicate() {
        let input = records(json!([
            { "id": "b1", "nombre": "Juan Pérez", "telefono": "987654321" },
            { "id": "b2", "telefono": "912345678" },
            { "nombre": "Ana Soto", "fono": "000000000" },
            { "id": "b1", "nombre": "Juan Pérez (dup)" },
            { "id": "b5", "nombre": "..." },
        ]));
        let mut diag = Diagnostics::default();
        let out = ingest_beneficiaries(&input, 8, &mut diag);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "b1");
        assert_eq!(out[1].id, "row-2");
        assert_eq!(diag.counts.malformed_beneficiaries, 2);
        assert_eq!(diag.counts.generated_ids, 1);
        assert_eq!(diag.counts.duplicate_beneficiary_ids, 1);
        assert_eq!(diag.counts.beneficiaries_without_valid_phone, 1);
    }

    #[test]
    fn beneficiary_phones_capped_valid_first() {
        let input = records(json!([{
            "id": "b1",
            "nombre": "Rosa",
            "telefono": "000000000",
            "telefono1": "987654321",
            "telefono2": "987654321",
            "telefono3": "221234567",
            "celular": "955554444",
        }]));
        let mut diag = Diagnostics::default();
        let out = ingest_beneficiaries(&input, 8, &mut diag);
        assert_eq!(out[0].phones, vec!["987654321", "221234567", "955554444"]);
    }

    #[test]
    fn operators_default_active_and_name_only() {
        let input = records(json!([
            { "id": "op1", "nombre": "María González", "correo": "maria@example.org" },
            { "name": "Pedro Rojas", "activo": false },
            { "email": "nobody@example.org" },
        ]));
        let mut diag = Diagnostics::default();
        let out = ingest_operators(&input, &mut diag);
        assert_eq!(out.len(), 2);
        assert!(out[0].active);
        assert_eq!(out[0].email.as_deref(), Some("maria@example.org"));
        assert_eq!(out[1].id, "pedro rojas");
        assert!(!out[1].active);
        assert_eq!(diag.counts.malformed_operators, 1);
    }

    #[test]
    fn assignments_keep_operator_fields_apart() {
        let input = records(json!([
            { "teleoperadoraId": "op1", "teleoperadora": "María", "beneficiario": "juan perez" },
            { "operador": "Pedro", "telefono": "987654321" },
        ]));
        let out = ingest_assignments(&input);
        assert_eq!(out[0].operator_id.as_deref(), Some("op1"));
        assert_eq!(out[0].operator_name.as_deref(), Some("María"));
        assert_eq!(out[0].beneficiary_name.as_deref(), Some("juan perez"));
        assert_eq!(out[1].operator.as_deref(), Some("Pedro"));
        assert_eq!(out[1].phones, vec!["987654321"]);
    }

    #[test]
    fn calls_parse_fields_and_degrade() {
        let input = records(json!([
            { "beneficiario": "Juan", "resultado": "Llamado exitoso", "duracion": "02:30", "fecha": "2026-03-01 10:15:00" },
            { "telefono": "987654321", "duracion": -4, "fecha": "ayer" },
            { "resultado": "No contesta" },
            { "operador": "María", "exitoso": true, "fecha": { "_seconds": 1767225600, "_nanoseconds": 0 } },
        ]));
        let mut diag = Diagnostics::default();
        let out = ingest_calls(&input, &mut diag);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].duration_secs, 150);
        assert_eq!(out[0].timestamp.unwrap().to_rfc3339(), "2026-03-01T10:15:00+00:00");
        assert_eq!(out[1].duration_secs, 0);
        assert!(out[1].timestamp.is_none());
        assert_eq!(out[2].success_flag, Some(true));
        assert_eq!(out[2].timestamp.unwrap().to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(diag.counts.malformed_calls, 1);
        assert_eq!(diag.counts.invalid_durations, 1);
        assert_eq!(diag.counts.unparseable_timestamps, 1);
    }

    #[test]
    fn timestamp_shapes() {
        let expect = "2026-02-03T00:00:00+00:00";
        for raw in ["2026-02-03", "03/02/2026", "03-02-2026", "2026-02-03T00:00:00Z", "1770076800", "1770076800000"] {
            assert_eq!(parse_timestamp(raw).map(|d| d.to_rfc3339()).as_deref(), Some(expect), "{raw}");
        }
        assert!(parse_timestamp("mañana").is_none());
    }

    #[test]
    fn duration_shapes() {
        assert_eq!(parse_duration("95"), Some(95));
        assert_eq!(parse_duration("12,6"), Some(13));
        assert_eq!(parse_duration("1:02:03"), Some(3723));
        assert_eq!(parse_duration("-3"), None);
        assert_eq!(parse_duration("dos minutos"), None);
    }
}
