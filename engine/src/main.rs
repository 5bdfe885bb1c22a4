// Taskpilot orchestration engine
// Main entry point for the taskpilot binary

use clap::Parser;
use taskpilot_engine::cli::{Cli, Command, ConfigAction};
use taskpilot_engine::config::Config;
use taskpilot_engine::handlers::{
    handle_config_set_key, handle_config_show, handle_plan, handle_run, OutputFormat,
};
use taskpilot_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let mut created_at = None;
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        let default_path = Config::default_config_path()?;
        if !default_path.exists() {
            created_at = Some(default_path);
        }
        Config::load_or_create()?
    };

    // --log beats the configured level; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!("Taskpilot v{}", env!("CARGO_PKG_VERSION"));

    // Loading ran before the subscriber existed, so report what it found now
    if let Some(path) = &created_at {
        tracing::info!("Created default configuration at {:?}", path);
    }
    for key in &config.rejected_overrides {
        tracing::warn!("Ignoring unparseable {}", key);
    }

    match cli.command {
        Command::Run {
            utterance,
            workspace,
            user,
        } => handle_run(utterance, workspace, user, &config, format).await,

        Command::Plan { utterance } => handle_plan(utterance, &config, format).await,

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::SetKey => handle_config_set_key(format),
        },
    }
}
