use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use translator_stress::{catalog, config, telemetry};
use translator_stress::{
    Cooldown, DriverError, Endpoint, HttpExecutor, LoadDriver, ResultSink, TokioClock,
};

use config::Config;
use telemetry::{init_tracing, interrupt_signal};

const EXIT_FATAL_APPLICATION: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "stress run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("STRESS_CONFIG"))
        .map(PathBuf::from);
    let cfg = Config::load(config_path.as_deref())?;

    let endpoints = catalog::load_endpoints(&cfg.catalog.endpoints_file).await?;
    if endpoints.is_empty() {
        anyhow::bail!("no endpoints in {}", cfg.catalog.endpoints_file.display());
    }

    let identifiers = if endpoints.iter().any(Endpoint::uses_identifier_pool) {
        let path = cfg
            .catalog
            .identifiers_file
            .as_deref()
            .context("direct providers need catalog.identifiers_file")?;
        catalog::load_identifiers(path).await?
    } else {
        Vec::new()
    };

    let clock = TokioClock::shared();
    let output = ResultSink::output_path(&cfg.output.dir, &cfg.output.prefix, Local::now());
    let sink = Arc::new(ResultSink::create(output).await?);
    let executor = Arc::new(HttpExecutor::new(
        cfg.http.settings(),
        cfg.poller.settings(),
        Arc::clone(&clock),
    ));
    let driver = LoadDriver::new(
        executor,
        Arc::clone(&sink),
        Cooldown::new(cfg.cooldown.settings(), Arc::clone(&clock)),
        clock,
        cfg.sweep.settings(),
        identifiers,
    );

    tokio::select! {
        outcome = driver.run(&endpoints) => match outcome {
            Ok(()) => {
                let phases = sink.snapshot().await.phase_count();
                info!(path = %sink.path().display(), phases, "stress run complete");
                Ok(ExitCode::SUCCESS)
            }
            Err(e @ DriverError::Fatal(_)) => {
                error!(error = %e, path = %sink.path().display(), "stress run halted by an application error");
                Ok(ExitCode::from(EXIT_FATAL_APPLICATION))
            }
            Err(e) => Err(e.into()),
        },
        _ = interrupt_signal() => {
            warn!(path = %sink.path().display(), "interrupted; completed phases are saved");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}
