use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hatewatch_core::{
    AnnotationManager, Config, ControlServer, DocumentHandle, HttpClassifier, SessionController,
};

mod bridge;

use bridge::Bridge;

const LOG_ENV: &str = "HATEWATCH_LOG";

#[derive(Parser)]
#[command(name = "hatewatch")]
#[command(about = "Flags abusive chat messages in a live document")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bridge a host over JSON lines on stdin/stdout
    Serve {
        /// Start detection as soon as the host is ready
        #[arg(long)]
        autostart: bool,
        /// Classification endpoint (overrides config and environment)
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Classify a single text and print the verdict
    Classify {
        /// Text to classify
        text: String,
        /// Classification endpoint (overrides config and environment)
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(api_url: Option<String>) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = api_url {
        config.api_url = url;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { autostart, api_url } => serve(load_config(api_url)?, autostart).await?,
        Commands::Classify { text, api_url } => classify(&load_config(api_url)?, &text).await?,
        Commands::Config => show_config()?,
    }

    Ok(())
}

async fn serve(config: Config, autostart: bool) -> Result<()> {
    let document = DocumentHandle::default();
    let controller = SessionController::from_config(&config, document.clone());
    let annotator = AnnotationManager::new(Arc::new(config.profile.clone()), &config.default_suggestion);

    let (client, _server) = ControlServer::spawn_when_ready(controller, autostart);
    let bridge = Bridge::new(document, client, annotator);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    bridge.run(stdin, tokio::io::stdout()).await?;
    info!("Host closed the bridge");
    Ok(())
}

async fn classify(config: &Config, text: &str) -> Result<()> {
    let classifier = HttpClassifier::new(&config.api_url);
    let verdict = classifier
        .detect(text)
        .await
        .with_context(|| format!("Classification via {} failed", config.api_url))?;

    if verdict.is_flagged {
        println!("{}", "Flagged".bold().red());
        let suggestion = verdict
            .suggestion
            .as_deref()
            .unwrap_or(&config.default_suggestion);
        println!("{} {}", "Suggestion:".bold(), suggestion);
    } else {
        println!("{}", "Clean".bold().green());
    }
    if let Some(confidence) = verdict.confidence {
        println!("{} {:.2}", "Confidence:".dimmed(), confidence);
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let path = Config::get_config_path()?;
    let config = load_config(None)?;
    println!("{} {}", "Config file:".bold(), path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
