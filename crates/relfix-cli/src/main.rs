#![doc = include_str!("../README.md")]

mod commands;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

const CLI_LONG_ABOUT: &str =
    "Counterexample-guided repair search for relational models.\n\n\
    Repeatedly asks an external repair tool for a patched model, validates\n\
    every patch against a property oracle, and turns failed validations into\n\
    new witness tests constraining the next round.\n\n\
    Typical invocation:\n  \
    relfix model.als oracle.als --laps 4 --graph\n\n\
    The run report is printed to stdout and written to --report-out; pass\n\
    --json for a machine-readable copy next to it.";

#[derive(Parser)]
#[command(name = "relfix")]
#[command(about = "Counterexample-guided repair search for relational models")]
#[command(long_about = CLI_LONG_ABOUT)]
#[command(version)]
pub(crate) struct Cli {
    /// Path to the model to repair
    pub(crate) model: PathBuf,

    /// Path to the property oracle merged into every checked model
    pub(crate) oracle: PathBuf,

    /// Repair tool command
    #[arg(long, default_value = "arepair")]
    pub(crate) repair_command: String,

    /// Extra arguments passed to the repair tool (comma-separated)
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub(crate) repair_args: Vec<String>,

    /// Check/generation tool command
    #[arg(long, default_value = "beafix")]
    pub(crate) check_command: String,

    /// Extra arguments passed to the check tool (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub(crate) check_args: Vec<String>,

    /// Directory receiving the check tool's output files (wiped per call)
    #[arg(long, default_value = "relfix-out")]
    pub(crate) out: PathBuf,

    /// Optional .tests file with user-supplied initial witnesses
    #[arg(long)]
    pub(crate) initial_tests: Option<PathBuf>,

    /// Search order: dfs | bfs
    #[arg(long, default_value = "dfs")]
    pub(crate) search: String,

    /// Prefer candidates whose last check passed more properties
    #[arg(long, default_value_t = false)]
    pub(crate) priority: bool,

    /// Keep ambiguous branches in a secondary space drained after the primary
    #[arg(long, default_value_t = false)]
    pub(crate) secondary_space: bool,

    /// Retry generation with relaxed facts when it yields no predicates
    #[arg(long, default_value_t = false)]
    pub(crate) relax_facts: bool,

    /// Follow a relaxed generation pass with forced assertion tests
    #[arg(long, default_value_t = false)]
    pub(crate) force_assertion_tests: bool,

    /// Keep generated trusted counterexamples local to the discovering branch
    #[arg(long, default_value_t = false)]
    pub(crate) branch_local_trust: bool,

    /// Maximum search depth; 0 runs the repair tool exactly once
    #[arg(long, default_value_t = 4)]
    pub(crate) laps: u32,

    /// Wall-clock budget in minutes; 0 disables the budget
    #[arg(long, default_value_t = 0)]
    pub(crate) timeout: u64,

    /// Skip a candidate instead of aborting when the repair tool hits its
    /// known crash
    #[arg(long, default_value_t = false)]
    pub(crate) tolerate_repair_crashes: bool,

    /// Re-queue the original model once after the space empties
    #[arg(long, default_value_t = false)]
    pub(crate) restart_for_unseen_tests: bool,

    /// Where user-supplied witnesses go in the repair input: prepend | append
    #[arg(long, default_value = "prepend")]
    pub(crate) initial_placement: String,

    /// Check the unrepaired model when only globally trusted witnesses remain
    #[arg(long, default_value_t = false)]
    pub(crate) keep_going_without_repair: bool,

    /// Count the distinct witnesses actually handed to the repair tool
    #[arg(long, default_value_t = false)]
    pub(crate) track_used_tests: bool,

    /// Path for the textual run report
    #[arg(long, default_value = "relfix.info")]
    pub(crate) report_out: PathBuf,

    /// Also write the report as JSON next to the textual report
    #[arg(long, default_value_t = false)]
    pub(crate) json: bool,

    /// Record the search audit graph and export it as DOT
    #[arg(long, default_value_t = false)]
    pub(crate) graph: bool,

    /// Output path for the DOT export
    #[arg(long, default_value = "relfix_search_graph.dot")]
    pub(crate) graph_out: PathBuf,
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::run_repair(cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use relfix_engine::search::{InitialWitnessPlacement, SearchOptions, SearchStrategy};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_mirror_the_search_defaults() {
        let cli = Cli::try_parse_from(["relfix", "m.als", "oracle.als"]).expect("parse");
        let options = commands::search_options_from_cli(&cli);
        let defaults = SearchOptions::default();
        assert_eq!(options.strategy, defaults.strategy);
        assert_eq!(options.lap_limit, defaults.lap_limit);
        assert_eq!(options.timeout_minutes, defaults.timeout_minutes);
        assert_eq!(options.global_trust, defaults.global_trust);
        assert_eq!(options.initial_placement, defaults.initial_placement);
        assert!(!options.audit_graph);
        assert_eq!(cli.report_out, PathBuf::from("relfix.info"));
    }

    #[test]
    fn full_flag_set_maps_onto_the_options() {
        let cli = Cli::try_parse_from([
            "relfix",
            "m.als",
            "oracle.als",
            "--search",
            "bfs",
            "--priority",
            "--secondary-space",
            "--relax-facts",
            "--force-assertion-tests",
            "--branch-local-trust",
            "--laps",
            "8",
            "--timeout",
            "30",
            "--tolerate-repair-crashes",
            "--restart-for-unseen-tests",
            "--initial-placement",
            "append",
            "--keep-going-without-repair",
            "--track-used-tests",
            "--initial-tests",
            "seed.tests",
            "--graph",
            "--json",
        ])
        .expect("parse");
        let options = commands::search_options_from_cli(&cli);
        assert_eq!(options.strategy, SearchStrategy::Bfs);
        assert!(options.prioritize_repaired_properties);
        assert!(options.secondary_space);
        assert!(options.allow_relaxation);
        assert!(options.force_assertion_witnesses);
        assert!(!options.global_trust);
        assert_eq!(options.lap_limit, 8);
        assert_eq!(options.timeout_minutes, 30);
        assert!(options.tolerate_repair_crashes);
        assert!(options.restart_for_unseen_witnesses);
        assert_eq!(options.initial_placement, InitialWitnessPlacement::Append);
        assert!(options.keep_going_without_repair);
        assert!(options.track_used_witnesses);
        assert!(options.audit_graph);
        assert_eq!(cli.initial_tests, Some(PathBuf::from("seed.tests")));
        assert!(cli.json);
    }

    #[test]
    fn tool_args_split_on_commas() {
        let cli = Cli::try_parse_from([
            "relfix",
            "m.als",
            "oracle.als",
            "--repair-args",
            "-jar,arepair.jar",
            "--check-args",
            "-Xmx4g",
        ])
        .expect("parse");
        assert_eq!(cli.repair_args, ["-jar", "arepair.jar"]);
        assert_eq!(cli.check_args, ["-Xmx4g"]);
    }
}
