use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::types::CaseStatus;

/// Command-line arguments for the caseflow binary.
#[derive(Debug, Parser)]
#[command(
    name = "caseflow",
    version,
    about = "Optimistic case status updates over a simulated case service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CASEFLOW_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the case list.
    List(ListArgs),
    /// Print one case.
    Show(ShowArgs),
    /// Change the status of a case and report the optimistic and settled state.
    #[command(name = "set-status")]
    SetStatus(SetStatusArgs),
    /// Run a scripted session: optimistic update, commit, rollback and the guard.
    Demo(DemoArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct ListArgs {
    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Case identifier, e.g. `case-1`.
    pub id: String,

    /// Print JSON instead of labelled fields.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SetStatusArgs {
    /// Case identifier, e.g. `case-1`.
    pub id: String,

    /// Target status (new|in_review|approved|rejected).
    #[arg(value_parser = parse_status)]
    pub status: CaseStatus,

    /// Reason for the change; required when rejecting.
    #[arg(long, value_name = "TEXT")]
    pub reason: Option<String>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct DemoArgs {
    /// Seed for the simulated service's latency and failure draws.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

/// Overrides applied on top of file and environment sources.
#[derive(Debug, Args, Default, Clone)]
pub struct SettingsOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the data-service call budget.
    #[arg(long = "service-timeout-seconds", value_name = "SECONDS", global = true)]
    pub service_timeout_seconds: Option<u64>,

    /// Override the simulated server failure rate (0.0 to 1.0).
    #[arg(long = "service-failure-rate", value_name = "RATE", global = true)]
    pub service_failure_rate: Option<f64>,

    /// Override the number of seeded cases.
    #[arg(long = "service-seed-count", value_name = "COUNT", global = true)]
    pub service_seed_count: Option<usize>,

    /// Disable simulated latency.
    #[arg(long = "no-latency", action = clap::ArgAction::SetTrue, global = true)]
    pub no_latency: bool,
}

fn parse_status(value: &str) -> Result<CaseStatus, String> {
    value.parse().map_err(|err| format!("{err}"))
}
