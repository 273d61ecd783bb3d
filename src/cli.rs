use crate::css_rules::extract_rules;
use crate::utils::make_data_url;
use crate::{Config, Document, Element, EmbedError, EmbedService, StyleSheet};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "snapshot-embed")]
#[command(about = "Inline fonts, images and imported style sheets into snapshot CSS")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Per-request timeout in milliseconds")]
    pub timeout_ms: Option<u64>,

    #[arg(long, help = "Font embedding budget per style sheet in milliseconds")]
    pub font_timeout_ms: Option<u64>,

    #[arg(long, help = "Keep query strings in resource cache keys")]
    pub include_query_params: bool,

    #[arg(long, help = "Append a timestamp to requests to bypass HTTP caches")]
    pub cache_bust: bool,

    #[arg(long, help = "User-Agent sent with resource requests")]
    pub user_agent: Option<String>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a remote style sheet and embed the fonts it references
    Fonts {
        #[arg(short, long, help = "Style sheet URL")]
        stylesheet: String,

        #[arg(short, long, help = "Output file (stdout when omitted)")]
        output: Option<PathBuf>,
    },

    /// Produce embedded font-face CSS for a local style sheet
    Inline {
        #[arg(short, long, help = "CSS file treated as the document's inline sheet")]
        input: PathBuf,

        #[arg(short, long, help = "URL of the document the sheet belongs to")]
        base_url: String,

        #[arg(short, long, help = "Output file (stdout when omitted)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Keep only this font format when several are offered")]
        prefer_format: Option<String>,
    },

    /// Fetch a single resource and print it as a data URL
    Resource {
        #[arg(short, long, help = "Resource URL")]
        url: String,
    },

    /// Print the rule blocks recovered from a CSS file
    Extract {
        #[arg(short, long, help = "CSS file to scan")]
        input: PathBuf,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub struct CliRunner {
    pub config: Config,
    pub service: EmbedService,
}

impl CliRunner {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let service = EmbedService::new(&config).context("Failed to create HTTP fetcher")?;
        Ok(Self { config, service })
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Fonts { stylesheet, output } => self.run_fonts(&stylesheet, output).await,
            Commands::Inline {
                input,
                base_url,
                output,
                prefer_format,
            } => self.run_inline(&input, &base_url, output, prefer_format).await,
            Commands::Resource { url } => self.run_resource(&url).await,
            Commands::Extract { input } => self.run_extract(&input).await,
            Commands::Validate { config } => validate_config_file(&config).await,
        }
    }

    pub async fn run_fonts(&self, url: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
        info!("Embedding fonts of: {}", url);
        let options = &self.config.options;

        let sheet = self.service.fetch_style_sheet_text(url, options);
        let css_text = self
            .service
            .embed_fonts(&sheet, options)
            .await
            .inspect_err(|e| error!("Failed to load style sheet {}: {}", url, e))?;

        write_output(output.as_deref(), &css_text).await?;
        self.print_summary();
        Ok(())
    }

    pub async fn run_inline(
        &self,
        input: &Path,
        base_url: &str,
        output: Option<PathBuf>,
        prefer_format: Option<String>,
    ) -> anyhow::Result<()> {
        url::Url::parse(base_url).map_err(EmbedError::from)?;

        let css_text = fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))?;
        info!("Loaded {} bytes from {}", css_text.len(), input.display());

        let mut options = self.config.options.clone();
        if prefer_format.is_some() {
            options.preferred_font_format = prefer_format;
        }

        let document = Document::new(base_url)
            .with_style_sheet(StyleSheet::inline(&css_text))
            .into_handle();
        let mut root = Element::new("div").attached_to(document);

        self.service.embed_web_fonts(&mut root, &options).await?;

        let font_css = root
            .children
            .first()
            .filter(|child| child.tag_name == "style")
            .and_then(|style| style.text_content.clone())
            .unwrap_or_default();
        if font_css.is_empty() {
            warn!("No embeddable font-face rules found");
        }

        write_output(output.as_deref(), &font_css).await?;
        self.print_summary();
        Ok(())
    }

    pub async fn run_resource(&self, url: &str) -> anyhow::Result<()> {
        let metadata = self.service.get_resource(url, &self.config.options).await;
        if metadata.is_placeholder() && metadata.content.is_empty() {
            anyhow::bail!("Failed to fetch {url}");
        }
        if metadata.is_placeholder() {
            warn!("Fetch of {} failed, printing placeholder", url);
        }

        let content_type = if metadata.content_type.is_empty() {
            crate::utils::FALLBACK_CONTENT_TYPE
        } else {
            metadata.content_type.as_str()
        };
        println!("{}", make_data_url(&metadata.content, content_type));
        Ok(())
    }

    pub async fn run_extract(&self, input: &Path) -> anyhow::Result<()> {
        let css_text = fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))?;

        let rules = extract_rules(&css_text);
        for rule in &rules {
            println!("{rule}");
        }
        info!("Recovered {} rule blocks", rules.len());
        Ok(())
    }

    fn print_summary(&self) {
        let stats = self.service.cache_stats();
        info!(
            "Resource cache: {} entries, {} hits, {} misses, {} failures",
            stats.entries, stats.hits, stats.misses, stats.failures
        );
    }
}

pub async fn validate_config_file(config_path: &Path) -> anyhow::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config_content = fs::read_to_string(config_path).await?;
    let config: Config = serde_json::from_str(&config_content).map_err(EmbedError::from)?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Fetch timeout: {:?}", config.options.fetch_timeout);
    println!("  Font embed timeout: {:?}", config.options.font_embed_timeout);
    println!("  Include query params: {}", config.options.include_query_params);
    println!("  Cache bust: {}", config.options.cache_bust);
    println!("  Document protocol: {}", config.document_protocol);
    println!("  Max redirects: {}", config.max_redirects);

    Ok(())
}

/// Apply command-line overrides on top of a loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &Cli) {
    if let Some(timeout) = args.timeout_ms {
        config.options.fetch_timeout = Duration::from_millis(timeout);
    }
    if let Some(timeout) = args.font_timeout_ms {
        config.options.font_embed_timeout = Duration::from_millis(timeout);
    }
    if args.include_query_params {
        config.options.include_query_params = true;
    }
    if args.cache_bust {
        config.options.cache_bust = true;
    }
    if let Some(user_agent) = &args.user_agent {
        config.user_agent = Some(user_agent.clone());
    }
}

async fn write_output(output: Option<&Path>, css_text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, css_text).await?;
            info!("CSS written to: {}", path.display());
        }
        None => println!("{css_text}"),
    }
    Ok(())
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let args = Cli::parse_from([
            "snapshot-embed",
            "--timeout-ms",
            "1500",
            "--cache-bust",
            "--user-agent",
            "probe/1.0",
            "extract",
            "--input",
            "site.css",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.options.fetch_timeout, Duration::from_millis(1500));
        assert_eq!(config.options.font_embed_timeout, Duration::from_millis(5000));
        assert!(config.options.cache_bust);
        assert!(!config.options.include_query_params);
        assert_eq!(config.user_agent.as_deref(), Some("probe/1.0"));
        assert!(matches!(args.command, Commands::Extract { .. }));
    }

    #[test]
    fn test_inline_subcommand_parsing() {
        let args = Cli::parse_from([
            "snapshot-embed",
            "inline",
            "--input",
            "page.css",
            "--base-url",
            "https://site.test/",
            "--prefer-format",
            "woff2",
        ]);
        match args.command {
            Commands::Inline {
                input,
                base_url,
                output,
                prefer_format,
            } => {
                assert_eq!(input, PathBuf::from("page.css"));
                assert_eq!(base_url, "https://site.test/");
                assert!(output.is_none());
                assert_eq!(prefer_format.as_deref(), Some("woff2"));
            }
            _ => panic!("expected inline subcommand"),
        }
    }
}
