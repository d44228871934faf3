use std::collections::{HashMap, HashSet};

use crate::diagnostics::{DiagnosticKind, Diagnostics, RecordSource};
use crate::model::{OperatorRecord, ResolvedOperator};
use crate::normalize::normalize_name;

/// Operator roster indexed by id, normalized display name and email.
///
/// Assignment operator fields and call operator fields both resolve through
/// here, so one person lands on one key however the producer spelled them.
#[derive(Debug, Default)]
pub struct OperatorDirectory {
    operators: Vec<OperatorRecord>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    by_email: HashMap<String, usize>,
    reported_unknown: HashSet<String>,
}

impl OperatorDirectory {
    pub fn new(roster: &[OperatorRecord]) -> Self {
        let mut dir = Self {
            operators: roster.to_vec(),
            ..Self::default()
        };

        for (i, op) in dir.operators.iter().enumerate() {
            dir.by_id.entry(op.id.trim().to_lowercase()).or_insert(i);
            let name = normalize_name(&op.display_name);
            if !name.is_empty() {
                dir.by_name.entry(name.as_str().to_string()).or_insert(i);
            }
            if let Some(email) = &op.email {
                dir.by_email.entry(email.trim().to_lowercase()).or_insert(i);
            }
        }

        dir
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Every roster operator in roster order, resolved.
    pub fn roster(&self) -> impl Iterator<Item = ResolvedOperator> + '_ {
        self.operators.iter().map(|op| ResolvedOperator {
            id: op.id.clone(),
            display_name: op.display_name.clone(),
            in_roster: true,
            active: op.active,
        })
    }

    fn lookup(&self, raw: &str) -> Option<&OperatorRecord> {
        let trimmed = raw.trim().to_lowercase();
        let name = normalize_name(raw);
        self.by_id
            .get(&trimmed)
            .or_else(|| self.by_name.get(name.as_str()))
            .or_else(|| self.by_email.get(&trimmed))
            .map(|&i| &self.operators[i])
    }

    /// Resolve a free-text operator reference. Off-roster references key on
    /// their normalized text.
    pub fn resolve(&self, raw: &str) -> ResolvedOperator {
        if let Some(op) = self.lookup(raw) {
            return ResolvedOperator {
                id: op.id.clone(),
                display_name: op.display_name.clone(),
                in_roster: true,
                active: op.active,
            };
        }

        let name = normalize_name(raw);
        let id = if name.is_empty() {
            raw.trim().to_lowercase()
        } else {
            name.to_string()
        };

        ResolvedOperator {
            id,
            display_name: raw.trim().to_string(),
            in_roster: false,
            active: true,
        }
    }

    /// [`resolve`](Self::resolve), reporting each distinct off-roster
    /// reference once when a roster was supplied.
    pub fn resolve_reported(
        &mut self,
        raw: &str,
        source: RecordSource,
        index: usize,
        diagnostics: &mut Diagnostics,
    ) -> ResolvedOperator {
        let resolved = self.resolve(raw);
        if !resolved.in_roster
            && !self.operators.is_empty()
            && self.reported_unknown.insert(resolved.id.clone())
        {
            diagnostics.record(
                DiagnosticKind::UnknownOperator,
                source,
                Some(index),
                format!("operator '{}' is not on the roster", raw.trim()),
            );
        }
        resolved
    }
}
