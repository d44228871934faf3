//! Field-alias resolution for loose upstream records.
//!
//! Upstream producers spell the same field many ways ("telefono", "fono",
//! "phone", "sim"...). Each canonical field has an ordered alias table; the
//! first alias present with a usable value wins. Key comparison ignores case,
//! `_`, `-` and spaces.

use serde_json::{Map, Value};

/// One upstream document, exactly as exported.
pub type LooseRecord = Map<String, Value>;

// ---------------------------------------------------------------------------
// Alias tables
// ---------------------------------------------------------------------------

pub const BENEFICIARY_ID: &[&str] = &["id", "beneficiaryId", "beneficiario_id", "docId", "uid"];

pub const BENEFICIARY_NAME: &[&str] = &[
    "nombre",
    "name",
    "fullName",
    "nombreCompleto",
    "beneficiario",
    "beneficiary",
];

pub const ADDRESS: &[&str] = &["direccion", "address", "domicilio"];

pub const PHONES: &[&str] = &[
    "telefono",
    "phone",
    "fono",
    "sim",
    "telefono1",
    "telefono2",
    "telefono3",
    "phone1",
    "phone2",
    "phone3",
    "celular",
    "movil",
    "mobile",
    "telefonoFijo",
    "telefonos",
    "phones",
];

pub const CREATED_AT: &[&str] = &["createdAt", "fechaCreacion", "creado", "created"];

pub const OPERATOR_RECORD_ID: &[&str] = &["id", "operatorId", "uid", "docId"];

pub const OPERATOR_RECORD_NAME: &[&str] = &["nombre", "name", "displayName", "nombreCompleto"];

pub const OPERATOR_ID: &[&str] = &["operatorId", "teleoperadoraId", "operadorId", "operator_id"];

pub const OPERATOR_NAME: &[&str] = &[
    "operatorName",
    "teleoperadora",
    "nombreTeleoperadora",
    "operadora",
];

pub const OPERATOR_GENERIC: &[&str] = &["operator", "operador", "asignadoA"];

pub const EMAIL: &[&str] = &["email", "correo"];

pub const ACTIVE: &[&str] = &["active", "activo", "activa"];

pub const ASSIGNMENT_BENEFICIARY: &[&str] = &[
    "beneficiario",
    "beneficiary",
    "nombreBeneficiario",
    "nombre",
    "name",
];

pub const CALL_TIMESTAMP: &[&str] = &[
    "fecha",
    "fechaHora",
    "timestamp",
    "date",
    "fechaLlamada",
    "createdAt",
];

pub const CALL_OUTCOME: &[&str] = &[
    "resultado",
    "result",
    "outcome",
    "estado",
    "status",
    "tipoResultado",
];

pub const CALL_SUCCESS_FLAG: &[&str] = &["exitoso", "success", "successful"];

pub const CALL_DURATION: &[&str] = &[
    "duracion",
    "duration",
    "durationSeconds",
    "segundos",
    "duracionSegundos",
];

pub const CALL_BENEFICIARY: &[&str] = &["beneficiario", "beneficiary", "nombreBeneficiario", "nombre"];

pub const CALL_PHONES: &[&str] = &[
    "telefono",
    "phone",
    "fono",
    "sim",
    "telefono1",
    "telefono2",
    "telefono3",
    "celular",
    "movil",
    "mobile",
    "numero",
    "numeroLlamado",
];

pub const CALL_OPERATOR: &[&str] = &[
    "operatorId",
    "teleoperadora",
    "operador",
    "operator",
    "operatorName",
];

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Raw JSON values for each alias present on the record, in alias order.
fn values_for<'a>(record: &'a LooseRecord, aliases: &[&str]) -> Vec<&'a Value> {
    let folded: Vec<(String, &Value)> = record.iter().map(|(k, v)| (fold_key(k), v)).collect();
    let mut out = Vec::new();
    for alias in aliases {
        let want = fold_key(alias);
        for (key, value) in &folded {
            if *key == want {
                out.push(*value);
            }
        }
    }
    out
}

/// Render a scalar JSON value as trimmed text. Empty strings, nulls and
/// containers yield `None`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    Some(format!("{}", f as i64))
                } else {
                    Some(f.to_string())
                }
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// First non-null value among the aliases, whatever its shape.
pub fn first_value<'a>(record: &'a LooseRecord, aliases: &[&str]) -> Option<&'a Value> {
    values_for(record, aliases).into_iter().find(|v| !v.is_null())
}

/// First usable text value among the aliases.
pub fn first_text(record: &LooseRecord, aliases: &[&str]) -> Option<String> {
    values_for(record, aliases).into_iter().find_map(scalar_text)
}

/// Every usable text value among the aliases, in alias order. Array values
/// (e.g. `"telefonos": ["...", "..."]`) are flattened.
pub fn all_texts(record: &LooseRecord, aliases: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for value in values_for(record, aliases) {
        match value {
            Value::Array(items) => out.extend(items.iter().filter_map(scalar_text)),
            other => out.extend(scalar_text(other)),
        }
    }
    out
}

/// First value among the aliases that reads as a boolean flag.
///
/// Accepts JSON booleans, 0/1 and the usual text spellings (`si`, `sí`,
/// `yes`, `true`, `no`, `false`).
pub fn first_flag(record: &LooseRecord, aliases: &[&str]) -> Option<bool> {
    values_for(record, aliases).into_iter().find_map(|value| match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "si" | "sí" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> LooseRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn alias_priority_order() {
        let r = record(json!({ "name": "Second", "nombre": "First" }));
        assert_eq!(first_text(&r, BENEFICIARY_NAME).as_deref(), Some("First"));
    }

    #[test]
    fn key_folding_ignores_case_and_separators() {
        let r = record(json!({ "Nombre_Completo": "Ana Soto", "FECHA-CREACION": "2026-01-02" }));
        assert_eq!(first_text(&r, BENEFICIARY_NAME).as_deref(), Some("Ana Soto"));
        assert_eq!(first_text(&r, CREATED_AT).as_deref(), Some("2026-01-02"));
    }

    #[test]
    fn blank_values_fall_through() {
        let r = record(json!({ "nombre": "   ", "name": "Luis" }));
        assert_eq!(first_text(&r, BENEFICIARY_NAME).as_deref(), Some("Luis"));
    }

    #[test]
    fn numbers_render_without_exponent() {
        let r = record(json!({ "telefono": 987654321, "fono": 912345678.0 }));
        assert_eq!(all_texts(&r, PHONES), vec!["987654321", "912345678"]);
    }

    #[test]
    fn arrays_are_flattened() {
        let r = record(json!({ "telefonos": ["+56 9 8765 4321", null, 221234567] }));
        assert_eq!(all_texts(&r, PHONES), vec!["+56 9 8765 4321", "221234567"]);
    }

    #[test]
    fn flags_accept_text_spellings() {
        assert_eq!(first_flag(&record(json!({ "activo": "Sí" })), ACTIVE), Some(true));
        assert_eq!(first_flag(&record(json!({ "active": 0 })), ACTIVE), Some(false));
        assert_eq!(first_flag(&record(json!({ "activa": "tal vez" })), ACTIVE), None);
    }

    #[test]
    fn containers_are_not_text() {
        let r = record(json!({ "nombre": { "first": "Ana" } }));
        assert_eq!(first_text(&r, BENEFICIARY_NAME), None);
    }
}
