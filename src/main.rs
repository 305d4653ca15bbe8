//! llm-gateway: streaming HTTP forwarding gateway for LLM provider APIs
//!
//! A Rust-based gateway that gives clients one stable local address while the
//! real upstream address, credentials, and availability policy stay
//! server-side:
//! - Path rewriting into the upstream URL
//! - Streaming passthrough with a hard 10-minute bound
//! - Access-code authorization and model-allowlist gating

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

use llm_gateway::{config::AppConfig, run_server};

#[derive(Parser)]
#[command(name = "llm-gateway")]
#[command(version = "0.1.0")]
#[command(about = "Streaming HTTP forwarding gateway for LLM provider APIs")]
#[command(long_about = "
llm-gateway forwards API requests from a stable local mount to an upstream
LLM provider:
  - Path rewriting from /api/<provider>/ into the upstream URL
  - Access-code authorization and model-allowlist gating
  - Streaming passthrough with a hard per-request timeout

Example usage:
  llm-gateway run --config config.yaml
  llm-gateway check-config
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override upstream URL (e.g., "https://dashscope.example.internal")
        #[arg(long)]
        upstream_url: Option<String>,
    },

    /// Validate configuration file
    CheckConfig,

    /// Test connection to the upstream provider
    TestUpstream,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter))
        .init();

    match cli.command {
        Commands::Run { port, upstream_url } => {
            run_gateway(cli.config, port, upstream_url).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config)?;
        }
        Commands::TestUpstream => {
            test_upstream(cli.config).await?;
        }
    }

    Ok(())
}

/// Run the gateway server
async fn run_gateway(
    config_path: PathBuf,
    port_override: Option<u16>,
    upstream_url_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_exit(&config_path);

    // Apply CLI overrides
    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = upstream_url_override {
        config.upstream.url = url;
    }

    tracing::info!("Loading configuration from {:?}", config_path);

    if config.allowlist.is_active() {
        tracing::info!(
            custom_models = %config.allowlist.custom_models,
            "Model allowlist gate enabled"
        );
    }
    if config.auth.access_codes.is_empty() {
        tracing::warn!("No access codes configured, gateway is open");
    }

    run_server(config).await?;

    Ok(())
}

/// Validate configuration file
fn check_config(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match AppConfig::from_file(&config_path) {
        Ok(config) => {
            let base_url = config.upstream.base_url(&config.provider.default_url);

            // Normalization must yield a parseable address
            if let Err(e) = url::Url::parse(&base_url) {
                eprintln!("✗ Invalid upstream URL {}: {}", base_url, e);
                std::process::exit(1);
            }

            println!("✓ Configuration file is valid\n");
            println!("Server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("\nProvider:");
            println!("  Name: {}", config.provider.name);
            println!("  Mount: {}", config.provider.mount_prefix());
            println!("  Streaming header: {}", config.provider.stream_header);
            println!("\nUpstream:");
            println!("  URL: {}", base_url);
            println!("  Timeout: {}s", config.upstream.timeout_seconds);
            println!("\nAuth:");
            println!("  Access codes: {}", config.auth.access_codes.len());
            println!("  User API keys allowed: {}", config.auth.allow_user_api_key);
            println!("\nAllowlist:");
            if config.allowlist.is_active() {
                println!("  Rules: {}", config.allowlist.custom_models);
            } else {
                println!("  Disabled");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Test connection to the upstream provider
async fn test_upstream(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(&config_path);
    let base_url = config.upstream.base_url(&config.provider.default_url);

    println!("Testing connection to upstream: {}", base_url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    match client.get(&base_url).send().await {
        Ok(resp) => {
            println!("✓ Upstream is reachable");
            println!("  Status: {}", resp.status());
        }
        Err(e) => {
            println!("✗ Failed to connect to upstream: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: &PathBuf) -> AppConfig {
    match AppConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nMake sure you have a config.yaml file.");
            eprintln!("You can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}
