use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spreadtrace_common::{load_config, AnalysisConfig};
use spreadtrace_engine::{Analyzer, DataSource, JsonFileSource};

#[derive(Parser)]
#[command(name = "spreadtrace", about = "Propagation analytics over collected social data")]
struct Cli {
    /// Collection JSON files, one per platform. The file stem names the platform.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Path to config TOML file. SPREADTRACE_* variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the result here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Query label recorded on collections that carry none.
    #[arg(long)]
    query: Option<String>,

    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("spreadtrace=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(inputs = cli.inputs.len(), "Spreadtrace starting...");

    let config = match &cli.config {
        Some(path) => {
            info!(config = %path.display(), "Loading config");
            let mut config = load_config(path)?;
            config.apply_env()?;
            config.validate()?;
            config
        }
        None => AnalysisConfig::from_env()?,
    };
    config.log_summary();

    let sources: Vec<Box<dyn DataSource>> = cli
        .inputs
        .iter()
        .map(|path| Box::new(JsonFileSource::from_path(path)) as Box<dyn DataSource>)
        .collect();

    let result = Analyzer::new(config)
        .run(&sources, cli.query.as_deref())
        .await?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write result: {}", path.display()))?;
            info!(output = %path.display(), risk = %result.summary.risk_level, "Result written");
        }
        None => println!("{json}"),
    }

    Ok(())
}
