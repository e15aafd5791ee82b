//! opportunity-watch — one capture/compare/persist run.
//!
//! stdout: the change report, and only when there is one.
//! stderr: logs and, on failure, a single `error[<kind>]: ...` line.
//! exit: 0 for reporting, baseline, and no change; 1 for any failure.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use opportunity_watch::config::resolve_config_path;
use opportunity_watch::fetch::http::HttpFetcher;
use opportunity_watch::{RunController, RunOutcome, WatchConfig, WatchResult};

/// Report volunteer opportunities that appeared since the last run.
#[derive(Parser, Debug)]
#[command(name = "opportunity-watch", version, about)]
struct CliArgs {
    /// Path to the TOML config (falls back to $OPPORTUNITY_WATCH_CONFIG, then
    /// config/opportunities.toml).
    config: Option<PathBuf>,
}

async fn run(args: CliArgs) -> WatchResult<RunOutcome> {
    let path = resolve_config_path(args.config);
    let cfg = WatchConfig::load_from(&path)?;
    let fetcher = HttpFetcher::from_config(&cfg.site)?;
    let controller = RunController::new(cfg, fetcher)?;
    controller.run_once().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env in local/dev so credentials can stay out of the config file.
    let _ = dotenvy::dotenv();
    opportunity_watch::init_tracing();

    let args = CliArgs::parse();
    match run(args).await {
        Ok(outcome) => {
            if let Some(report) = outcome.report() {
                let mut out = std::io::stdout().lock();
                if let Err(e) = out.write_all(report.as_bytes()).and_then(|_| out.flush()) {
                    eprintln!("error[output]: writing report: {e}");
                    return ExitCode::from(1);
                }
            }
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("{}", e.diagnostic());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
