//! Device Guard - CLI entry point
//!
//! Usage: `device-guard [CONFIG_JSON] [--watch PATH]... [--watch-secs N]`
//!
//! Runs every default probe set against the local host through `LocalShell`,
//! optionally watches files for a while, and prints the report as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use device_guard::constants::{APP_NAME, APP_VERSION};
use device_guard::{AssessmentEngine, CancelToken, EngineConfig, LocalShell};

const DEFAULT_WATCH_SECS: u64 = 10;

struct Args {
    config: Option<PathBuf>,
    watch: Vec<String>,
    watch_secs: u64,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        watch: Vec::new(),
        watch_secs: DEFAULT_WATCH_SECS,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--watch" => args
                .watch
                .push(iter.next().context("--watch needs a path")?),
            "--watch-secs" => {
                let value = iter.next().context("--watch-secs needs a number")?;
                args.watch_secs = value
                    .parse()
                    .with_context(|| format!("invalid --watch-secs: {}", value))?;
            }
            other if other.starts_with("--") => bail!("unknown option: {}", other),
            path => args.config = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}", APP_NAME, APP_VERSION);

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env(),
    };

    let engine = AssessmentEngine::new(Arc::new(LocalShell::new()), config)
        .context("opening backup store")?
        .with_default_probes()
        .context("building default probe sets")?;

    let integrity = if args.watch.is_empty() {
        None
    } else {
        let capture = engine.capture_baseline(&args.watch).await;
        if !capture.is_complete() {
            log::warn!("Baseline capture incomplete; monitoring what was captured");
        }

        let cancel = CancelToken::new();
        let on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_ctrl_c.cancel();
            }
        });

        let outcome = engine
            .monitor(&args.watch, Duration::from_secs(args.watch_secs), cancel)
            .await
            .context("starting monitor")?;
        Some(outcome.summary())
    };

    let report = engine.run_assessment(integrity.as_ref()).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serializing report")?
    );

    Ok(())
}
