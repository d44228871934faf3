//! Beneficiary -> operator mapping from the registry and the assignment list.

use std::collections::{BTreeSet, HashMap};

use crate::config::{MatchStrategy, MatchingConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics, RecordSource};
use crate::matcher::{match_evidence, records_match, Identity};
use crate::model::{
    AmbiguousMatch, AssignmentRecord, BeneficiaryMatch, BeneficiaryRecord, MatchEvidence,
    OrphanAssignment, ReconciliationResult, ResolvedOperator, UnassignedBeneficiary,
};
use crate::normalize::NormalizedPhone;
use crate::roster::OperatorDirectory;

/// A usable assignment: normalized beneficiary identity plus resolved operator.
#[derive(Debug, Clone)]
pub struct AssignmentEntry {
    /// Position in the assignment snapshot.
    pub index: usize,
    pub identity: Identity,
    /// Beneficiary name as written, or the first phone when there is no name.
    pub label: String,
    pub operator: ResolvedOperator,
}

/// Normalize every assignment and resolve its operator reference.
///
/// The operator is taken from the first non-empty of: operator id, operator
/// display name, generic operator field. Assignments without a usable
/// beneficiary identity or without any operator are skipped and counted.
pub fn build_assignment_index(
    assignments: &[AssignmentRecord],
    directory: &mut OperatorDirectory,
    min_phone_len: usize,
    diagnostics: &mut Diagnostics,
) -> Vec<AssignmentEntry> {
    let mut entries = Vec::with_capacity(assignments.len());

    for (index, a) in assignments.iter().enumerate() {
        let operator_ref = [&a.operator_id, &a.operator_name, &a.operator]
            .into_iter()
            .find_map(|f| f.as_deref().filter(|s| !s.trim().is_empty()));

        let identity = Identity::new(a.beneficiary_name.as_deref(), &a.phones, min_phone_len);

        let problem = match (operator_ref, identity.is_empty()) {
            (None, true) => Some("no beneficiary identity and no operator"),
            (None, false) => Some("no operator reference"),
            (Some(_), true) => Some("no usable beneficiary name or phone"),
            (Some(_), false) => None,
        };
        if let Some(problem) = problem {
            diagnostics.record(
                DiagnosticKind::Malformed,
                RecordSource::Assignments,
                Some(index),
                problem,
            );
            continue;
        }
        let Some(operator_ref) = operator_ref else {
            continue;
        };

        let operator =
            directory.resolve_reported(operator_ref, RecordSource::Assignments, index, diagnostics);
        let label = a
            .beneficiary_name
            .clone()
            .or_else(|| identity.phones.iter().next().map(|p| p.to_string()))
            .unwrap_or_default();

        entries.push(AssignmentEntry {
            index,
            identity,
            label,
            operator,
        });
    }

    entries
}

/// Map each beneficiary to the operator of its first matching assignment.
///
/// With [`MatchStrategy::Scan`] every (beneficiary, assignment) pair is
/// compared and the earliest matching assignment in input order wins. With
/// [`MatchStrategy::PhoneIndex`] an exact phone hit wins outright (earliest
/// first), ahead of any earlier name-only match; the name matches are still
/// collected so conflicting operators surface as ambiguity.
///
/// Several matching assignments naming different operators are reported as
/// ambiguous; the first still wins.
pub fn reconcile(
    beneficiaries: &[BeneficiaryRecord],
    index: &[AssignmentEntry],
    matching: &MatchingConfig,
    diagnostics: &mut Diagnostics,
) -> ReconciliationResult {
    let threshold = matching.name_threshold;
    let identities: Vec<Identity> = beneficiaries
        .iter()
        .map(|b| Identity::new(Some(&b.name), &b.phones, matching.min_phone_length))
        .collect();

    let mut result = ReconciliationResult::default();
    for entry in index {
        result
            .operators
            .entry(entry.operator.id.clone())
            .or_insert_with(|| entry.operator.clone());
    }

    let phone_index = match matching.strategy {
        MatchStrategy::PhoneIndex => Some(build_phone_index(index)),
        MatchStrategy::Scan => None,
    };
    let mut entry_matched = vec![false; index.len()];

    for (bene, ident) in beneficiaries.iter().zip(&identities) {
        let candidates = match &phone_index {
            None => {
                let found = scan_candidates(ident, index, threshold);
                for (pos, _) in &found {
                    entry_matched[*pos] = true;
                }
                found
            }
            Some(by_phone) => {
                let mut hits = phone_candidates(ident, index, by_phone, threshold);
                let scanned = scan_candidates(ident, index, threshold);
                if hits.is_empty() {
                    scanned
                } else {
                    // phone hits stay in front; name-only matches still count toward ambiguity
                    let seen: BTreeSet<usize> = hits.iter().map(|(pos, _)| *pos).collect();
                    hits.extend(scanned.into_iter().filter(|(pos, _)| !seen.contains(pos)));
                    hits
                }
            }
        };

        settle(bene, ident, &candidates, index, &mut result, diagnostics);
    }

    let orphan_positions: Vec<usize> = match matching.strategy {
        MatchStrategy::Scan => (0..index.len()).filter(|&pos| !entry_matched[pos]).collect(),
        MatchStrategy::PhoneIndex => orphan_positions(index, &identities, threshold),
    };

    for pos in orphan_positions {
        let entry = &index[pos];
        diagnostics.record(
            DiagnosticKind::OrphanAssignment,
            RecordSource::Assignments,
            Some(entry.index),
            format!(
                "'{}' (operator '{}') matches no beneficiary",
                entry.label, entry.operator.display_name
            ),
        );
        result.orphans.push(orphan_row(entry));
    }

    log::debug!(
        "reconcile[{}]: {} assigned, {} unassigned, {} orphans, {} ambiguous",
        matching.strategy,
        result.mapping.len(),
        result.unassigned.len(),
        result.orphans.len(),
        result.ambiguous.len(),
    );

    result
}

/// Assignment entries that match no beneficiary, for data-quality triage.
pub fn find_orphan_assignments(
    index: &[AssignmentEntry],
    beneficiaries: &[BeneficiaryRecord],
    matching: &MatchingConfig,
) -> Vec<OrphanAssignment> {
    let identities: Vec<Identity> = beneficiaries
        .iter()
        .map(|b| Identity::new(Some(&b.name), &b.phones, matching.min_phone_length))
        .collect();

    orphan_positions(index, &identities, matching.name_threshold)
        .into_iter()
        .map(|pos| orphan_row(&index[pos]))
        .collect()
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

type Candidates = Vec<(usize, MatchEvidence)>;

fn scan_candidates(ident: &Identity, index: &[AssignmentEntry], threshold: f64) -> Candidates {
    index
        .iter()
        .enumerate()
        .filter_map(|(pos, entry)| match_evidence(ident, &entry.identity, threshold).map(|ev| (pos, ev)))
        .collect()
}

fn build_phone_index(index: &[AssignmentEntry]) -> HashMap<&NormalizedPhone, Vec<usize>> {
    let mut by_phone: HashMap<&NormalizedPhone, Vec<usize>> = HashMap::new();
    for (pos, entry) in index.iter().enumerate() {
        for phone in &entry.identity.phones {
            by_phone.entry(phone).or_default().push(pos);
        }
    }
    by_phone
}

fn phone_candidates(
    ident: &Identity,
    index: &[AssignmentEntry],
    by_phone: &HashMap<&NormalizedPhone, Vec<usize>>,
    threshold: f64,
) -> Candidates {
    let positions: BTreeSet<usize> = ident
        .phones
        .iter()
        .filter_map(|p| by_phone.get(p))
        .flatten()
        .copied()
        .collect();

    positions
        .into_iter()
        .filter_map(|pos| match_evidence(ident, &index[pos].identity, threshold).map(|ev| (pos, ev)))
        .collect()
}

fn orphan_positions(index: &[AssignmentEntry], identities: &[Identity], threshold: f64) -> Vec<usize> {
    let known_phones: BTreeSet<&NormalizedPhone> =
        identities.iter().flat_map(|i| i.phones.iter()).collect();

    index
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            let phone_hit = entry.identity.phones.iter().any(|p| known_phones.contains(p));
            !phone_hit && !identities.iter().any(|i| records_match(i, &entry.identity, threshold))
        })
        .map(|(pos, _)| pos)
        .collect()
}

fn orphan_row(entry: &AssignmentEntry) -> OrphanAssignment {
    OrphanAssignment {
        assignment_index: entry.index,
        beneficiary_name: entry.label.clone(),
        phones: entry.identity.phones.iter().map(|p| p.to_string()).collect(),
        operator_id: entry.operator.id.clone(),
    }
}

/// Record the outcome for one beneficiary given its matching entries.
fn settle(
    bene: &BeneficiaryRecord,
    ident: &Identity,
    candidates: &Candidates,
    index: &[AssignmentEntry],
    result: &mut ReconciliationResult,
    diagnostics: &mut Diagnostics,
) {
    let Some(&(first_pos, evidence)) = candidates.first() else {
        result.unassigned.push(UnassignedBeneficiary {
            beneficiary_id: bene.id.clone(),
            name: bene.name.clone(),
            has_valid_phone: !ident.phones.is_empty(),
        });
        return;
    };

    let chosen = &index[first_pos];

    if candidates.len() > 1 {
        let mut operators: Vec<String> = Vec::new();
        for (pos, _) in candidates {
            let id = &index[*pos].operator.id;
            if !operators.contains(id) {
                operators.push(id.clone());
            }
        }

        if operators.len() > 1 {
            diagnostics.record(
                DiagnosticKind::AmbiguousMatch,
                RecordSource::Beneficiaries,
                None,
                format!(
                    "'{}' matches assignments for {} operators; kept '{}'",
                    bene.id,
                    operators.len(),
                    chosen.operator.id
                ),
            );
            result.ambiguous.push(AmbiguousMatch {
                beneficiary_id: bene.id.clone(),
                chosen_operator: chosen.operator.id.clone(),
                candidate_operators: operators,
                candidate_indices: candidates.iter().map(|(pos, _)| index[*pos].index).collect(),
            });
        } else {
            diagnostics.record(
                DiagnosticKind::DuplicateAssignment,
                RecordSource::Assignments,
                Some(chosen.index),
                format!("'{}' assigned {} times to '{}'", bene.id, candidates.len(), chosen.operator.id),
            );
        }
    }

    result
        .mapping
        .insert(bene.id.clone(), chosen.operator.id.clone());
    result.matches.push(BeneficiaryMatch {
        beneficiary_id: bene.id.clone(),
        operator_id: chosen.operator.id.clone(),
        assignment_index: chosen.index,
        evidence,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bene(id: &str, name: &str, phones: &[&str]) -> BeneficiaryRecord {
        BeneficiaryRecord {
            id: id.into(),
            name: name.into(),
            address: None,
            phones: phones.iter().map(|p| p.to_string()).collect(),
            created_at: None,
        }
    }

    fn assign(name: Option<&str>, phones: &[&str], operator: &str) -> AssignmentRecord {
        AssignmentRecord {
            operator: Some(operator.into()),
            beneficiary_name: name.map(str::to_string),
            phones: phones.iter().map(|p| p.to_string()).collect(),
            ..AssignmentRecord::default()
        }
    }

    fn index_of(assignments: &[AssignmentRecord], diag: &mut Diagnostics) -> Vec<AssignmentEntry> {
        let mut dir = OperatorDirectory::new(&[]);
        build_assignment_index(assignments, &mut dir, 8, diag)
    }

    fn scan() -> MatchingConfig {
        MatchingConfig::default()
    }

    fn phone_index() -> MatchingConfig {
        MatchingConfig {
            strategy: MatchStrategy::PhoneIndex,
            ..MatchingConfig::default()
        }
    }

    #[test]
    fn index_prefers_operator_id_then_name_then_generic() {
        let records = vec![
            AssignmentRecord {
                operator_id: Some("op-7".into()),
                operator_name: Some("Carla".into()),
                operator: Some("Pedro".into()),
                beneficiary_name: Some("Ana".into()),
                ..AssignmentRecord::default()
            },
            AssignmentRecord {
                operator_id: Some("  ".into()),
                operator_name: Some("Carla".into()),
                operator: Some("Pedro".into()),
                beneficiary_name: Some("Ana".into()),
                ..AssignmentRecord::default()
            },
            assign(Some("Ana"), &[], "Pedro"),
        ];
        let mut diag = Diagnostics::default();
        let idx = index_of(&records, &mut diag);
        let ops: Vec<&str> = idx.iter().map(|e| e.operator.id.as_str()).collect();
        assert_eq!(ops, vec!["op7", "carla", "pedro"]);
    }

    #[test]
    fn index_skips_malformed() {
        let records = vec![
            assign(None, &[], "Pedro"),
            AssignmentRecord {
                beneficiary_name: Some("Ana".into()),
                ..AssignmentRecord::default()
            },
            assign(None, &["000000000"], "Pedro"),
            assign(None, &["987654321"], "Pedro"),
        ];
        let mut diag = Diagnostics::default();
        let idx = index_of(&records, &mut diag);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx[0].index, 3);
        assert_eq!(idx[0].label, "987654321");
        assert_eq!(diag.counts.malformed_assignments, 3);
    }

    #[test]
    fn empty_assignments_leave_everyone_unassigned() {
        let benes = vec![bene("b1", "Juan Pérez", &["987654321"]), bene("b2", "Ana Soto", &[])];
        let mut diag = Diagnostics::default();
        let result = reconcile(&benes, &[], &scan(), &mut diag);
        assert!(result.mapping.is_empty());
        assert_eq!(result.unassigned.len(), 2);
        assert!(result.unassigned[0].has_valid_phone);
        assert!(!result.unassigned[1].has_valid_phone);
        assert!(result.orphans.is_empty());
    }

    #[test]
    fn name_and_phone_are_alternative_evidence() {
        let benes = vec![
            bene("b1", "Juan Pérez", &["987654321"]),
            bene("b2", "Rosa Díaz", &["912345678"]),
        ];
        let mut diag = Diagnostics::default();
        let idx = index_of(
            &[
                assign(Some("juan perez"), &[], "María González"),
                assign(Some("R. Díaz"), &["+56 9 1234 5678"], "Pedro Rojas"),
            ],
            &mut diag,
        );
        let result = reconcile(&benes, &idx, &scan(), &mut diag);
        assert_eq!(result.operator_for("b1"), Some("maria gonzalez"));
        assert_eq!(result.matches[0].evidence, MatchEvidence::Name);
        // "56912345678" is not "912345678": no country-code folding
        assert_eq!(result.operator_for("b2"), None);
        assert_eq!(result.orphans.len(), 1);
        assert_eq!(result.orphans[0].assignment_index, 1);
        assert_eq!(diag.counts.orphan_assignments, 1);
        assert_eq!(result.operators["maria gonzalez"].display_name, "María González");
    }

    #[test]
    fn first_match_wins_and_ambiguity_is_reported() {
        let benes = vec![bene("b1", "Juan Pérez", &["987654321"])];
        let mut diag = Diagnostics::default();
        let idx = index_of(
            &[
                assign(Some("Juan Perez Lopez"), &[], "Carla"),
                assign(None, &["987654321"], "Pedro"),
            ],
            &mut diag,
        );
        let result = reconcile(&benes, &idx, &scan(), &mut diag);
        assert_eq!(result.operator_for("b1"), Some("carla"));
        assert_eq!(result.ambiguous.len(), 1);
        assert_eq!(result.ambiguous[0].candidate_operators, vec!["carla", "pedro"]);
        assert_eq!(result.ambiguous[0].candidate_indices, vec![0, 1]);
        assert_eq!(diag.counts.ambiguous_matches, 1);
        assert!(result.orphans.is_empty());
    }

    #[test]
    fn phone_index_prefers_phone_hits() {
        let benes = vec![bene("b1", "Juan Pérez", &["987654321"])];
        let mut diag = Diagnostics::default();
        let idx = index_of(
            &[
                assign(Some("Juan Perez Lopez"), &[], "Carla"),
                assign(None, &["987654321"], "Pedro"),
            ],
            &mut diag,
        );
        let result = reconcile(&benes, &idx, &phone_index(), &mut diag);
        assert_eq!(result.operator_for("b1"), Some("pedro"));
        assert_eq!(result.matches[0].evidence, MatchEvidence::Phone);
        assert!(result.orphans.is_empty(), "name-matching entry is not an orphan");

        // the name-only match names another operator
        assert_eq!(result.ambiguous.len(), 1);
        assert_eq!(result.ambiguous[0].chosen_operator, "pedro");
        assert_eq!(result.ambiguous[0].candidate_operators, vec!["pedro", "carla"]);
        assert_eq!(result.ambiguous[0].candidate_indices, vec![1, 0]);
        assert_eq!(diag.counts.ambiguous_matches, 1);
    }

    #[test]
    fn phone_index_same_operator_by_name_is_a_duplicate() {
        let benes = vec![bene("b1", "Juan Pérez", &["987654321"])];
        let mut diag = Diagnostics::default();
        let idx = index_of(
            &[
                assign(Some("Juan Perez"), &[], "Pedro"),
                assign(None, &["987654321"], "Pedro"),
            ],
            &mut diag,
        );
        let result = reconcile(&benes, &idx, &phone_index(), &mut diag);
        assert_eq!(result.matches[0].assignment_index, 1);
        assert!(result.ambiguous.is_empty());
        assert_eq!(diag.counts.duplicate_assignments, 1);
    }

    #[test]
    fn phone_index_falls_back_to_names() {
        let benes = vec![bene("b1", "Ana Soto", &[])];
        let mut diag = Diagnostics::default();
        let idx = index_of(&[assign(Some("ana soto"), &["912345678"], "Carla")], &mut diag);
        let result = reconcile(&benes, &idx, &phone_index(), &mut diag);
        assert_eq!(result.operator_for("b1"), Some("carla"));
    }

    #[test]
    fn duplicate_assignments_are_not_ambiguous() {
        let benes = vec![bene("b1", "Juan Pérez", &[])];
        let mut diag = Diagnostics::default();
        let idx = index_of(
            &[assign(Some("Juan Pérez"), &[], "Carla"), assign(Some("juan perez"), &[], "carla")],
            &mut diag,
        );
        let result = reconcile(&benes, &idx, &scan(), &mut diag);
        assert!(result.ambiguous.is_empty());
        assert_eq!(diag.counts.duplicate_assignments, 1);
        assert_eq!(result.matches[0].assignment_index, 0);
    }

    #[test]
    fn standalone_orphan_finder_agrees_with_scan() {
        let benes = vec![bene("b1", "Juan Pérez", &["987654321"]), bene("b2", "Ana Soto", &[])];
        let mut diag = Diagnostics::default();
        let idx = index_of(
            &[
                assign(Some("Pedro Pablo"), &[], "Carla"),
                assign(None, &["987654321"], "Carla"),
                assign(Some("Soto Ana"), &[], "Luis"),
                assign(Some("Desconocido"), &["955554444"], "Luis"),
            ],
            &mut diag,
        );
        let via_reconcile = reconcile(&benes, &idx, &scan(), &mut diag);
        let standalone = find_orphan_assignments(&idx, &benes, &scan());
        let a: Vec<usize> = via_reconcile.orphans.iter().map(|o| o.assignment_index).collect();
        let b: Vec<usize> = standalone.iter().map(|o| o.assignment_index).collect();
        assert_eq!(a, vec![0, 3]);
        assert_eq!(a, b);
    }
}
