//! Runs `opportunity-watch` and forwards failures or change reports to the
//! configured form endpoint. Quiet runs send nothing.

use std::path::PathBuf;
use std::process::{ExitCode, Stdio};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::process::Command;

use opportunity_watch::config::resolve_config_path;
use opportunity_watch::notify::{load_notify_config, relay, watch_binary, FormNotifier};

/// Relay opportunity-watch results to a web form.
#[derive(Parser, Debug)]
#[command(name = "opportunity-notify", version, about)]
struct CliArgs {
    /// Config file shared with opportunity-watch; must have a [notify] section.
    config: Option<PathBuf>,
}

async fn run(args: CliArgs) -> Result<()> {
    let path = resolve_config_path(args.config);
    let cfg = load_notify_config(&path)?;
    let bin = watch_binary(&cfg)?;

    let output = Command::new(&bin)
        .arg(&path)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("running {}", bin.display()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    tracing::debug!(status = %output.status, stdout = stdout.len(), stderr = stderr.len(), "watch run finished");

    let notifier = FormNotifier::from_config(&cfg);
    relay(&notifier, output.status.success(), &stdout, &stderr).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    opportunity_watch::init_tracing();

    match run(CliArgs::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
