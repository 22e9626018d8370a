//! `jpabook` entry point.
//!
//! # Responsibility
//! - Load configuration, start logging, open the persistence unit.
//! - Run the member walkthrough once and report the outcome.
//!
//! # Invariants
//! - The persistence unit is closed before the process exits, also when the
//!   walkthrough was rolled back.

use anyhow::{Context, Result};
use jpabook_core::{
    init_logging, workflow, LogConfig, PersistenceUnit, PersistenceUnitConfig,
    PERSISTENCE_UNIT_NAME,
};
use log::error;
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing `.env` is the normal case outside development.
    let _ = dotenvy::dotenv();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=app_exit module=cli status=error error={err:#}");
            eprintln!("jpabook: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let log_config = LogConfig::from_env();
    init_logging(&log_config.level, log_config.log_dir.as_deref())
        .map_err(anyhow::Error::msg)
        .context("failed to initialize logging")?;

    let config = PersistenceUnitConfig::from_env(PERSISTENCE_UNIT_NAME)
        .context("invalid persistence unit configuration")?;
    let unit = PersistenceUnit::open(config).context("failed to open persistence unit")?;

    let stdout = io::stdout();
    let outcome = workflow::run(&unit, &mut stdout.lock());
    unit.close();

    outcome.context("member walkthrough did not complete")?;
    Ok(())
}
