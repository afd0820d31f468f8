use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use pangenomer::cli;
use pangenomer::config::{HostConfig, HostParams};
use pangenomer::host::HostServices;
use pangenomer::host::rpc::{CallbackClient, RpcClient, TOKEN_VAR, WorkspaceClient};
use pangenomer::host::workflow::run_host;

#[derive(Parser)]
#[command(
    name = "run_host",
    about = "Build a pangenome from a host genome set and save it back with a report"
)]
struct Cli {
    /// Host service configuration
    #[arg(long = "config", value_parser = cli::nonempty_file)]
    config: PathBuf,

    /// Run parameters
    #[arg(long = "params", value_parser = cli::nonempty_file)]
    params: PathBuf,
}

fn main() -> Result<()> {
    let start = Instant::now();
    let cli_args = Cli::parse();

    cli::banner("Host Run");

    // ── Configuration ────────────────────────────────────
    cli::section("Configuration");

    let config = HostConfig::from_file(&cli_args.config)?;
    let params = HostParams::from_file(&cli_args.params)?;

    cli::kv("Workspace", &params.workspace_name);
    cli::kv("Input", &params.input_ref);
    cli::kv("Output name", &params.output_pangenome_name);
    cli::kv("Quality method", params.checkm_version.method());
    if std::env::var(TOKEN_VAR).is_err() {
        cli::warning(&format!("{TOKEN_VAR} is not set; calls are unauthenticated"));
    }

    eprintln!();

    let workspace = WorkspaceClient::new(RpcClient::from_env(&config.workspace_url));
    let callback = CallbackClient::new(RpcClient::from_env(&config.callback_url));
    let services = HostServices {
        objects: &workspace,
        files: &callback,
        reports: &callback,
        plots: &callback,
    };

    let outcome = run_host(&config, &params, &services)?;

    // ── Summary ──────────────────────────────────────────
    cli::section("Summary");
    cli::kv("Pangenome", &outcome.pangenome.upa().to_string());
    cli::kv("Report", &format!("{} ({})", outcome.report.name, outcome.report.reference));
    cli::kv("Run directory", &outcome.run_dir.display().to_string());

    cli::print_summary(start);
    Ok(())
}
