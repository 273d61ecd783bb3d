use clap::Parser;
use snapshot_embed::{apply_overrides, setup_logging, Cli, CliRunner, Config, EmbedError};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting snapshot-embed v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(&args).await?;

    let cli_runner = CliRunner::new(config)?;

    let result = tokio::select! {
        result = cli_runner.run(args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Application error: {:#}", e);
        let code = match e.downcast_ref::<EmbedError>() {
            Some(embed_error) if !embed_error.is_recoverable() => 2,
            _ => 1,
        };
        std::process::exit(code);
    }

    Ok(())
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        // Load from file
        let config_content = tokio::fs::read_to_string(config_path).await?;
        serde_json::from_str(&config_content).map_err(EmbedError::from)?
    } else {
        Config::default()
    };

    apply_overrides(&mut config, args);
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Fetch timeout: {:?}", config.options.fetch_timeout);
    info!("Font embed timeout: {:?}", config.options.font_embed_timeout);

    Ok(config)
}
