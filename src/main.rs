//! Agent Coordination CLI
//!
//! Operator and script entry point to the coordination store. Every command
//! prints JSON on stdout; failures print `{code, message}` and exit non-zero.

use agent_coord::Coordinator;
use agent_coord::cli::sweep::{self, SweepSettings};
use agent_coord::cli::{Cli, Command, exit_code, run_command};
use agent_coord::config::ConfigLoader;
use agent_coord::db::Database;
use agent_coord::error::CoordError;
use agent_coord::logging::{self, LogTarget};
use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    // If explicit config path given, set it as env var for ConfigLoader to pick up
    // SAFETY: called at startup before any other threads are spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("AGENT_COORD_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    for source in loader.sources() {
        debug!(path = %source.display(), "Loaded config");
    }

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    let config = loader.into_config();

    config.ensure_db_dir()?;
    let db = match Database::open(&config.server.db_path) {
        Ok(db) => db,
        Err(err) => exit_with(&err),
    };
    debug!(path = %config.server.db_path.display(), "Database opened");
    let coord = Coordinator::new(db);

    match cli.command {
        Command::Sweep(args) => {
            let settings = SweepSettings::resolve(&config.server, &args);
            let result = if args.once {
                sweep::sweep_once(&coord.claims, &settings)
                    .map(|released| print_json(&serde_json::json!({ "released": released })))
            } else {
                sweep::run_loop(coord.claims.clone(), settings).await
            };
            if let Err(err) = result {
                exit_with(&err);
            }
        }
        command => match run_command(&coord, command) {
            Ok(value) => print_json(&value),
            Err(err) => exit_with(&err),
        },
    }

    debug!("Done");
    Ok(())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

fn exit_with(err: &CoordError) -> ! {
    debug!(code = ?err.code(), error = %err, "Command failed");
    match serde_json::to_string_pretty(&err.to_response()) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", err),
    }
    std::process::exit(exit_code(err));
}
