//! prompt-relay: HTTP relay in front of the Gemini generateContent API
//!
//! Accepts `{"prompt": "..."}`, forwards it upstream and retries transient
//! failures with exponential backoff before answering the caller.

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

use prompt_relay::{
    config::{AppConfig, ConfigError},
    invoker::RetryPolicy,
    run_server,
    upstream::{build_generation_client, GenerateError},
};

#[derive(Parser)]
#[command(name = "prompt-relay")]
#[command(version = "0.1.0")]
#[command(about = "HTTP relay for the Gemini API with retry and exponential backoff")]
#[command(long_about = "
prompt-relay accepts {\"prompt\": \"...\"} on its configured routes, forwards the
prompt to the Gemini generateContent API and answers with the generated text.
Transient upstream failures are retried with exponential backoff.

The API key is read from the environment variable named by upstream.api_key_env
(GEMINI_API_KEY by default).

Example usage:
  prompt-relay run --config config.yaml
  prompt-relay prompt \"Write a haiku about Rust\"
")]
struct Cli {
    /// Path to config file (defaults to ./config.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override upstream URL (e.g., "http://localhost:9000")
        #[arg(long)]
        upstream_url: Option<String>,
    },

    /// Validate configuration file
    CheckConfig,

    /// List upstream models to check the URL and API key
    TestUpstream,

    /// Send a single prompt upstream and print the generated text
    Prompt {
        /// Prompt text
        text: String,
        /// Model to use instead of upstream.model
        #[arg(short, long)]
        model: Option<String>,
    },
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
            run_relay(cli.config, port, upstream_url).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config);
        }
        Commands::TestUpstream => {
            test_upstream(cli.config).await?;
        }
        Commands::Prompt { text, model } => {
            one_shot(cli.config, text, model).await?;
        }
    }

    Ok(())
}

/// Run the relay server
async fn run_relay(
    config_path: Option<PathBuf>,
    port_override: Option<u16>,
    upstream_url_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_exit(config_path.as_ref());

    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = upstream_url_override {
        config.upstream.url = url;
        if let Err(e) = config.validate() {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }

    tracing::info!(
        max_attempts = config.retry.max_attempts,
        initial_delay_ms = config.retry.initial_delay_ms,
        backoff_multiplier = config.retry.backoff_multiplier,
        "Retry policy"
    );

    run_server(config).await
}

/// Validate configuration file
fn check_config(config_path: Option<PathBuf>) {
    let config = load_config_or_exit(config_path.as_ref());

    println!("✓ Configuration is valid\n");
    println!("Server:");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Max body: {} bytes", config.server.max_body_bytes);
    println!("\nUpstream:");
    println!("  URL: {}", config.upstream.url);
    println!("  API version: {}", config.upstream.api_version);
    println!("  Model: {}", config.upstream.model);
    println!("  TLS: {}", if config.upstream.is_tls() { "enabled" } else { "disabled" });
    if let Some(ref tls) = config.upstream.tls {
        if tls.accept_invalid_certs {
            println!("  TLS: Accepting invalid certificates");
        }
        if let Some(ref ca) = tls.ca_cert_path {
            println!("  TLS CA: {}", ca);
        }
        if let Some(ref cert) = tls.client_cert_path {
            println!("  TLS Client Cert: {}", cert);
        }
    }
    println!("  Timeout: {}s", config.upstream.timeout_seconds);
    println!(
        "  API key ({}): {}",
        config.upstream.api_key_env,
        if config.upstream.resolve_api_key().is_some() { "present" } else { "absent" }
    );
    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Initial delay: {}ms", config.retry.initial_delay_ms);
    println!("  Multiplier: {}", config.retry.backoff_multiplier);
    println!("  Retry client errors: {}", config.retry.retry_client_errors);
    match config.retry.deadline_ms {
        Some(ms) => println!("  Deadline: {}ms", ms),
        None => println!("  Deadline: none"),
    }
    if let Ok(policy) = RetryPolicy::try_from(&config.retry) {
        println!("  Worst-case backoff: {:?}", policy.total_backoff());
    }
    println!("\nRoutes:");
    for route in &config.routes {
        println!(
            "  POST {:24} model={} mode={:?}",
            route.path,
            route.model_or(&config.upstream.model),
            route.mode
        );
    }
    println!("\nStats:");
    println!("  Enabled: {}", config.stats.enabled);
    println!("  Format: {:?}", config.stats.format);
}

/// List upstream models with a single attempt
async fn test_upstream(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(config_path.as_ref());
    let client = build_generation_client(&config)?;

    println!("Testing upstream: {}", client.settings().models_url());
    println!("  Default model: {}", client.settings().default_model);

    match client.list_models(&RetryPolicy::single_attempt()).await {
        Ok(models) => {
            println!("✓ Upstream is reachable");
            println!("  Available models: {}", models.value.models.len());
            for model in models.value.models.iter().take(10) {
                match model.display_name {
                    Some(ref display) => println!("    - {} ({})", model.name, display),
                    None => println!("    - {}", model.name),
                }
            }
            Ok(())
        }
        Err(GenerateError::MissingCredential) => {
            eprintln!(
                "✗ No API key: set {} or upstream.api_key",
                config.upstream.api_key_env
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("✗ Upstream check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Generate once through the same client the server uses
async fn one_shot(
    config_path: Option<PathBuf>,
    prompt: String,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(config_path.as_ref());
    let client = build_generation_client(&config)?;
    let model = client.settings().resolve_model(model.as_deref()).to_string();

    match client.generate_text(&model, &prompt).await {
        Ok(generated) => {
            tracing::debug!(attempts = generated.attempts, "Generated");
            println!("{}", generated.value);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}

/// Load configuration or exit with error
///
/// Without `--config`, a missing `config.yaml` means built-in defaults.
fn load_config_or_exit(config_path: Option<&PathBuf>) -> AppConfig {
    match AppConfig::load_or_default(config_path.map(PathBuf::as_path)) {
        Ok(config) => {
            tracing::info!("Loaded configuration");
            config
        }
        Err(ConfigError::NotFound(_)) if config_path.is_none() => {
            tracing::info!("No config file found, using defaults");
            AppConfig::default()
        }
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nYou can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}
