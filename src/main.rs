use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use codebox::config::{get_config, init_config, SandboxConfig};
use codebox::server::{self, AppState, RunRequestBody};
use codebox::{Dispatcher, LanguageTable};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codebox=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    init_config(SandboxConfig::from_env()?)?;
    let config = get_config();
    info!(
        "Sandbox config: timeout={}s, compile_timeout={}s, max_output_bytes={}, max_concurrency={}",
        config.default_timeout_secs,
        config.compile_timeout_secs,
        config.max_output_bytes,
        config.max_concurrent_runs
    );

    // Load language configurations
    let languages_path = std::env::var_os("LANGUAGES_CONFIG").map(PathBuf::from);
    let languages = LanguageTable::load(languages_path.as_deref())?;
    match &languages_path {
        Some(path) => info!("Loaded language configurations from {:?}", path),
        None => info!("Using built-in language configurations"),
    }

    let dispatcher = Dispatcher::new(languages, config);

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => {
            info!("Starting sandbox service...");
            server::serve(AppState::new(dispatcher, config), &config.bind_addr).await
        }
        Some("run") => run_once(&dispatcher, config, args.next()).await,
        Some(other) => anyhow::bail!(
            "Unknown command: {} (usage: codebox [serve | run [request.json]])",
            other
        ),
    }
}

/// Execute one JSON request from a file or stdin and print the result
async fn run_once(
    dispatcher: &Dispatcher,
    config: &SandboxConfig,
    path: Option<String>,
) -> Result<()> {
    let body = match path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read request file {}", path))?,
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read request from stdin")?;
            body
        }
    };

    let body: RunRequestBody = serde_json::from_str(&body).context("Invalid request JSON")?;
    let request = body.into_request(&config.default_limits())?;
    let result = dispatcher.dispatch(request).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
