//! `carecall run` / `carecall validate`: config-driven reconciliation.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Subcommand};

use carecall_recon::alias::LooseRecord;
use carecall_recon::diagnostics::DiagnosticKind;
use carecall_recon::ingest::parse_timestamp;
use carecall_recon::{
    load_csv_records, load_json_records, ReconConfig, ReconError, ReconInput, ReconReport,
};

use crate::exit_codes::EXIT_RECON_NEEDS_REVIEW;
use crate::CliError;

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile snapshots and report per-operator call metrics
    #[command(after_help = "\
Examples:
  carecall run weekly.toml
  carecall run weekly.toml --json --now 2025-06-30
  carecall run --beneficiaries beneficiarios.json --assignments asignaciones.csv --calls llamadas.json
  carecall run weekly.toml --output report.json --strict")]
    Run(RunArgs),

    /// Validate a config file (and that its snapshot files exist) without running
    #[command(after_help = "\
Examples:
  carecall validate weekly.toml")]
    Validate {
        /// Path to the recon TOML config [default: <config dir>/carecall/recon.toml]
        #[arg(env = "CARECALL_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the recon TOML config [default: <config dir>/carecall/recon.toml]
    #[arg(env = "CARECALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Beneficiary registry snapshot (.json or .csv); overrides [inputs]
    #[arg(long, value_name = "PATH")]
    pub beneficiaries: Option<PathBuf>,

    /// Operator roster snapshot; overrides [inputs]
    #[arg(long, value_name = "PATH")]
    pub operators: Option<PathBuf>,

    /// Assignment list snapshot; overrides [inputs]
    #[arg(long, value_name = "PATH")]
    pub assignments: Option<PathBuf>,

    /// Call log snapshot; overrides [inputs]
    #[arg(long, value_name = "PATH")]
    pub calls: Option<PathBuf>,

    /// Reference time for status windows: RFC 3339 or YYYY-MM-DD [default: current time]
    #[arg(long, value_name = "WHEN")]
    pub now: Option<String>,

    /// Output the JSON report to stdout instead of only the summary
    #[arg(long)]
    pub json: bool,

    /// Write the JSON report to a file
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit 5 if anything needs manual review (orphans, ambiguous matches, malformed records),
    /// exit 1 if the metrics cross-check failed
    #[arg(long)]
    pub strict: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let loaded = load_config(args.config.as_deref())?;
    let config = &loaded.config;

    let now = match args.now.as_deref() {
        Some(raw) => parse_timestamp(raw).ok_or_else(|| {
            CliError::usage(format!("cannot parse --now \"{raw}\""))
                .with_hint("use RFC 3339 (2025-06-30T12:00:00Z) or YYYY-MM-DD")
        })?,
        None => Utc::now(),
    };

    let inputs = &config.inputs;
    let base = loaded.base_dir.as_path();
    let beneficiaries = snapshot_path(args.beneficiaries, &inputs.beneficiaries, base).ok_or_else(|| {
        CliError::usage("no beneficiary registry given")
            .with_hint("pass --beneficiaries or set [inputs].beneficiaries in the config")
    })?;

    let input = ReconInput {
        beneficiaries: read_snapshot(&beneficiaries)?,
        operators: read_optional(snapshot_path(args.operators, &inputs.operators, base))?,
        assignments: read_optional(snapshot_path(args.assignments, &inputs.assignments, base))?,
        calls: read_optional(snapshot_path(args.calls, &inputs.calls, base))?,
    };

    let report = carecall_recon::run(config, &input, now).map_err(CliError::recon)?;

    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::general(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if args.json {
        println!("{json_str}");
    }

    print_summary(&report);

    if args.strict {
        strict_check(&report)?;
    }

    Ok(())
}

/// `--strict`: a failed metrics cross-check is an error (exit 1), other
/// review items exit 5.
fn strict_check(report: &ReconReport) -> Result<(), CliError> {
    let d = &report.diagnostics;
    let c = &d.counts;

    if c.integrity_failures > 0 {
        let detail = d
            .entries
            .iter()
            .find(|e| e.kind == DiagnosticKind::IntegrityMismatch)
            .map_or_else(|| "metrics cross-check failed".to_string(), |e| e.detail.clone());
        return Err(CliError::recon(ReconError::Integrity(detail)));
    }

    if d.needs_review() {
        return Err(CliError {
            code: EXIT_RECON_NEEDS_REVIEW,
            message: format!(
                "needs review: {} malformed records, {} orphan assignments, {} ambiguous matches",
                d.malformed_records(),
                c.orphan_assignments,
                c.ambiguous_matches,
            ),
            hint: Some("see \"diagnostics\" in the JSON report".to_string()),
        });
    }

    Ok(())
}

pub fn cmd_validate(config: Option<PathBuf>) -> Result<(), CliError> {
    let loaded = load_config(config.as_deref())?;
    let Some(source) = loaded.source else {
        let hint = match default_config_path() {
            Some(p) => format!("create {} or pass a config path", p.display()),
            None => "pass a config path".to_string(),
        };
        return Err(CliError::usage("no config file found").with_hint(hint));
    };

    let c = &loaded.config;
    let configured = [
        ("beneficiaries", &c.inputs.beneficiaries),
        ("operators", &c.inputs.operators),
        ("assignments", &c.inputs.assignments),
        ("calls", &c.inputs.calls),
    ];
    for (field, file) in configured {
        if let Some(file) = file {
            let path = loaded.base_dir.join(file);
            if !path.is_file() {
                return Err(CliError::input(format!(
                    "[inputs].{field}: {} not found",
                    path.display()
                )));
            }
        }
    }

    eprintln!(
        "{}: valid (\"{}\", strategy {}, name threshold {}, status {}/{} days)",
        source.display(),
        c.name,
        c.matching.strategy,
        c.matching.name_threshold,
        c.status.up_to_date_days,
        c.status.pending_days,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Config and snapshot loading
// ---------------------------------------------------------------------------

struct LoadedConfig {
    config: ReconConfig,
    /// Directory `[inputs]` paths are resolved against.
    base_dir: PathBuf,
    source: Option<PathBuf>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("carecall").join("recon.toml"))
}

/// An explicit path must exist. The default path is optional; without it the
/// built-in defaults apply and snapshots must come from flags.
fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, CliError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(p) => p,
            None => {
                log::info!("no config file, using defaults");
                return Ok(LoadedConfig {
                    config: ReconConfig::default(),
                    base_dir: PathBuf::from("."),
                    source: None,
                });
            }
        },
    };

    let text = std::fs::read_to_string(&path).map_err(|e| {
        CliError::usage(format!("cannot read config {}: {e}", path.display()))
    })?;
    let config = ReconConfig::from_toml(&text).map_err(CliError::recon)?;
    log::info!("config {} ({})", path.display(), config.name);

    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LoadedConfig {
        config,
        base_dir,
        source: Some(path),
    })
}

/// Flags are taken as given (relative to the working directory); config
/// entries are relative to the config file.
fn snapshot_path(flag: Option<PathBuf>, configured: &Option<String>, base_dir: &Path) -> Option<PathBuf> {
    flag.or_else(|| configured.as_ref().map(|file| base_dir.join(file)))
}

fn read_optional(path: Option<PathBuf>) -> Result<Vec<LooseRecord>, CliError> {
    match path {
        Some(path) => read_snapshot(&path),
        None => Ok(Vec::new()),
    }
}

fn read_snapshot(path: &Path) -> Result<Vec<LooseRecord>, CliError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let is_csv = match extension.as_deref() {
        Some("csv") => true,
        Some("json") => false,
        _ => {
            return Err(CliError::usage(format!("unsupported snapshot format: {}", path.display()))
                .with_hint("snapshots must be .json or .csv files"))
        }
    };

    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::input(format!("cannot read {}: {e}", path.display())))?;
    let name = path.display().to_string();
    let records = if is_csv {
        load_csv_records(&name, &text)
    } else {
        load_json_records(&name, &text)
    }
    .map_err(CliError::recon)?;

    log::info!("{name}: {} records", records.len());
    Ok(records)
}

// ---------------------------------------------------------------------------
// Human summary (stderr)
// ---------------------------------------------------------------------------

fn print_summary(report: &ReconReport) {
    let recon = &report.reconciliation;
    let g = &report.metrics.global;
    let s = &report.statuses.summary;

    eprintln!(
        "{}: {} beneficiaries: {} assigned, {} unassigned; {} orphan assignments, {} ambiguous",
        report.meta.config_name,
        recon.mapping.len() + recon.unassigned.len(),
        recon.mapping.len(),
        recon.unassigned.len(),
        recon.orphans.len(),
        recon.ambiguous.len(),
    );
    eprintln!(
        "calls: {} total, {} successful ({:.1}%), avg {:.0}s, {} unassigned",
        g.total_calls,
        g.successful_calls,
        g.success_rate * 100.0,
        g.average_duration_secs,
        g.unassigned_calls,
    );

    for row in report.metrics.per_operator.iter().filter(|r| r.total_calls > 0) {
        eprintln!(
            "  {:<28} {:>5} calls  {:>5.1}% ok  avg {:>5.0}s  {:>3} beneficiaries{}",
            row.display_name,
            row.total_calls,
            row.success_rate * 100.0,
            row.average_duration_secs,
            row.distinct_beneficiaries,
            if row.active { "" } else { "  (inactive)" },
        );
    }

    eprintln!(
        "status: {} up to date, {} pending, {} urgent",
        s.up_to_date, s.pending, s.urgent
    );

    let d = &report.diagnostics;
    if d.malformed_records() > 0 || !d.entries.is_empty() {
        eprintln!(
            "diagnostics: {} malformed records, {} unknown operators, {} operator conflicts, {} unresolved call beneficiaries{}",
            d.malformed_records(),
            d.counts.unknown_operator_refs,
            d.counts.operator_conflicts,
            d.counts.unresolved_call_beneficiaries,
            if d.truncated { " (details truncated)" } else { "" },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carecall_recon::diagnostics::RecordSource;

    #[test]
    fn flag_overrides_config_entry() {
        let base = Path::new("/data/recon");
        let configured = Some("beneficiarios.json".to_string());
        assert_eq!(
            snapshot_path(None, &configured, base),
            Some(PathBuf::from("/data/recon/beneficiarios.json"))
        );
        assert_eq!(
            snapshot_path(Some(PathBuf::from("otro.csv")), &configured, base),
            Some(PathBuf::from("otro.csv"))
        );
        assert_eq!(snapshot_path(None, &None, base), None);
    }

    #[test]
    fn unknown_extension_is_usage_error() {
        let err = read_snapshot(Path::new("llamadas.xlsx")).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
    }

    #[test]
    fn missing_snapshot_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_snapshot(&dir.path().join("nada.json")).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_RECON_INPUT);
    }

    #[test]
    fn explicit_config_is_loaded_relative_to_its_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weekly.toml");
        std::fs::write(&path, "name = \"weekly\"\n[inputs]\ncalls = \"llamadas.json\"\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config.name, "weekly");
        assert_eq!(loaded.base_dir, dir.path());
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
    }

    fn empty_report() -> ReconReport {
        let now = parse_timestamp("2025-06-30").unwrap();
        carecall_recon::run(&ReconConfig::default(), &ReconInput::default(), now).unwrap()
    }

    #[test]
    fn strict_passes_clean_report() {
        assert!(strict_check(&empty_report()).is_ok());
    }

    #[test]
    fn strict_review_items_exit_5() {
        let mut report = empty_report();
        report.diagnostics.counts.orphan_assignments = 1;
        let err = strict_check(&report).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_RECON_NEEDS_REVIEW);
    }

    #[test]
    fn strict_integrity_failure_is_general_error() {
        let mut report = empty_report();
        report.metrics.global.total_calls = 1;
        report.diagnostics.record(
            DiagnosticKind::IntegrityMismatch,
            RecordSource::Calls,
            None,
            report.metrics.cross_check().unwrap_err().to_string(),
        );
        let err = strict_check(&report).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_ERROR);
        assert!(err.message.contains("total_calls"));
    }
}
