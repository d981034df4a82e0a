//! # QueryGuard Demo Binary
//!
//! Loads configuration, wires the skill over the in-memory backend, runs a
//! few representative inputs through the full pipeline, and shuts down.
//!
//! ```bash
//! cargo run -- --config ./config.toml
//! ```

use anyhow::Context;
use clap::Parser;
use queryguard::{Config, ExecutionBudget, MemoryBackend, QueryGuardSkill, Skill};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "queryguard", about = "Guarded query-execution skill engine")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)
            .with_context(|| format!("loading config from {}", args.config))?
    } else {
        Config::default()
    };

    init_tracing(&config);
    info!(
        name = %config.app.name,
        version = %config.app.version,
        environment = %config.app.environment,
        "config loaded"
    );

    let config = Arc::new(config);
    let backend = Arc::new(MemoryBackend::new());
    let skill = QueryGuardSkill::new(Arc::clone(&config), backend);
    info!(capability = %skill.capability_id(), "skill ready");

    let samples = [
        "sales by region for 2025",
        "2025年北京销售额超过100万的客户",
        "DROP TABLE users",
    ];

    for input in samples {
        let budget = ExecutionBudget::unbounded();
        match skill.execute(&budget, input) {
            Ok(result) => info!(
                input,
                status = %result.status,
                result_bytes = result.result.len(),
                meta = %String::from_utf8_lossy(&result.meta),
                "executed"
            ),
            Err(e) => warn!(input, error = %e, "execution failed"),
        }
    }

    skill.safe_shutdown().context("shutting down skill")?;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .compact()
        .init();
}
