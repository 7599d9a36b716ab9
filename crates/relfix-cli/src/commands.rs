//! The single repair-search command behind the `relfix` binary.

use std::fs;
use std::path::Path;

use miette::IntoDiagnostic;
use serde_json::json;
use tracing::info;

use relfix_engine::audit::AuditGraph;
use relfix_engine::report::{ReportSink, RunReport, Verdict};
use relfix_engine::search::{Driver, InitialWitnessPlacement, SearchOptions, SearchStrategy};
use relfix_ir::candidate::ModelRef;
use relfix_oracles::parse::load_initial_witnesses;
use relfix_oracles::process::{CommandCheckOracle, CommandRepairOracle};

use crate::Cli;

pub(crate) const REPORT_SCHEMA_VERSION: u32 = 1;

/// Prints the finished report to stdout, keeping tracing output on stderr.
struct StdoutSink;

impl ReportSink for StdoutSink {
    fn emit(&mut self, report: &RunReport) {
        println!("{report}");
    }
}

pub(crate) fn parse_search_strategy(raw: &str) -> SearchStrategy {
    match raw {
        "dfs" => SearchStrategy::Dfs,
        "bfs" => SearchStrategy::Bfs,
        other => {
            eprintln!("Unknown search order: {other}. Use 'dfs' or 'bfs'.");
            std::process::exit(1);
        }
    }
}

pub(crate) fn parse_initial_placement(raw: &str) -> InitialWitnessPlacement {
    match raw {
        "prepend" => InitialWitnessPlacement::Prepend,
        "append" => InitialWitnessPlacement::Append,
        other => {
            eprintln!("Unknown initial witness placement: {other}. Use 'prepend' or 'append'.");
            std::process::exit(1);
        }
    }
}

pub(crate) fn search_options_from_cli(cli: &Cli) -> SearchOptions {
    SearchOptions {
        strategy: parse_search_strategy(&cli.search),
        prioritize_repaired_properties: cli.priority,
        secondary_space: cli.secondary_space,
        allow_relaxation: cli.relax_facts,
        force_assertion_witnesses: cli.force_assertion_tests,
        global_trust: !cli.branch_local_trust,
        lap_limit: cli.laps,
        timeout_minutes: cli.timeout,
        tolerate_repair_crashes: cli.tolerate_repair_crashes,
        restart_for_unseen_witnesses: cli.restart_for_unseen_tests,
        audit_graph: cli.graph,
        initial_placement: parse_initial_placement(&cli.initial_placement),
        keep_going_without_repair: cli.keep_going_without_repair,
        track_used_witnesses: cli.track_used_tests,
    }
}

pub(crate) fn report_artifact(model: &Path, report: &RunReport) -> serde_json::Value {
    json!({
        "schema_version": REPORT_SCHEMA_VERSION,
        "model": model.display().to_string(),
        "result": report.verdict.verdict_class(),
        "report": report,
    })
}

pub(crate) fn run_repair(cli: Cli) -> miette::Result<()> {
    if !cli.model.is_file() {
        miette::bail!("model file not found: {}", cli.model.display());
    }
    if !cli.oracle.is_file() {
        miette::bail!("oracle file not found: {}", cli.oracle.display());
    }

    let initial = match &cli.initial_tests {
        Some(path) => load_initial_witnesses(path).into_diagnostic()?,
        None => Vec::new(),
    };
    if !initial.is_empty() {
        info!(count = initial.len(), "loaded initial witnesses");
    }

    let options = search_options_from_cli(&cli);
    let repair = CommandRepairOracle::with_args(cli.repair_command.clone(), cli.repair_args.clone());
    let check = CommandCheckOracle::with_args(
        cli.check_command.clone(),
        cli.check_args.clone(),
        cli.oracle.clone(),
        cli.out.clone(),
    );

    let mut driver = Driver::new(repair, check, options, StdoutSink);
    let report = driver.run(ModelRef::new(cli.model.clone()), initial);

    write_report_artifacts(&cli, &report)?;
    if cli.graph {
        if let Some(graph) = driver.audit_graph() {
            export_graph(graph, &cli.graph_out)?;
        }
    }

    if matches!(report.verdict, Verdict::Error { .. }) {
        std::process::exit(1);
    }
    Ok(())
}

fn write_report_artifacts(cli: &Cli, report: &RunReport) -> miette::Result<()> {
    fs::write(&cli.report_out, format!("{report}\n")).into_diagnostic()?;
    info!(path = %cli.report_out.display(), "report written");

    if cli.json {
        let path = cli.report_out.with_extension("json");
        let artifact = report_artifact(&cli.model, report);
        let rendered = serde_json::to_string_pretty(&artifact).into_diagnostic()?;
        fs::write(&path, rendered).into_diagnostic()?;
        info!(path = %path.display(), "JSON report written");
    }
    Ok(())
}

fn export_graph(graph: &AuditGraph, path: &Path) -> miette::Result<()> {
    // A graph file from an earlier run must not block this one's export.
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => return Err(error).into_diagnostic(),
    }
    graph.write_dot(path).into_diagnostic()?;
    info!(path = %path.display(), "search graph written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfix_engine::report::{SearchCounters, SearchTimings};

    fn sample_report() -> RunReport {
        RunReport {
            verdict: Verdict::Exhausted,
            counters: SearchCounters::default(),
            timings: SearchTimings::default(),
            max_lap: 3,
            used_witnesses: None,
        }
    }

    #[test]
    fn valid_flag_values_parse() {
        assert_eq!(parse_search_strategy("dfs"), SearchStrategy::Dfs);
        assert_eq!(parse_search_strategy("bfs"), SearchStrategy::Bfs);
        assert_eq!(
            parse_initial_placement("prepend"),
            InitialWitnessPlacement::Prepend
        );
        assert_eq!(
            parse_initial_placement("append"),
            InitialWitnessPlacement::Append
        );
    }

    #[test]
    fn json_artifact_carries_the_verdict_class() {
        let artifact = report_artifact(Path::new("m.als"), &sample_report());
        assert_eq!(artifact["schema_version"], REPORT_SCHEMA_VERSION);
        assert_eq!(artifact["model"], "m.als");
        assert_eq!(artifact["result"], "EXHAUSTED");
        assert_eq!(artifact["report"]["max_lap"], 3);
    }

    #[test]
    fn report_files_land_next_to_each_other() {
        use clap::Parser;

        let dir = tempfile::tempdir().expect("tempdir");
        let report_out = dir.path().join("run.info");
        let cli = Cli::try_parse_from([
            "relfix",
            "m.als",
            "oracle.als",
            "--report-out",
            report_out.to_str().expect("utf8 path"),
            "--json",
        ])
        .expect("parse");

        write_report_artifacts(&cli, &sample_report()).expect("write artifacts");
        let text = fs::read_to_string(&report_out).expect("read report");
        assert!(text.starts_with("RESULT: EXHAUSTED"));
        assert!(text.ends_with('\n'));
        let json = fs::read_to_string(report_out.with_extension("json")).expect("read json");
        assert!(json.contains("\"EXHAUSTED\""));
    }
}
