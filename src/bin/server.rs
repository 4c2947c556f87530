//! Legalize server — contract auditor web UI and JSON API.
//!
//! Usage:
//!   GOOGLE_API_KEY=... legalize-server --bind 127.0.0.1:8501
//!
//! Or check the key and model without starting the server:
//!   legalize-server check
//!
//! Stored configuration:
//!   legalize-server set-key <KEY> | set-model <MODEL> | usage

use clap::{Parser, Subcommand};
use legalize_lib::ai_client::{CompletionService, GeminiClient};
use legalize_lib::http_server::{self, AppState};
use legalize_lib::settings;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "legalize-server", version, about = "Contract risk auditor: upload a PDF, get a risk summary, ask questions")]
struct Cli {
    /// Bind address
    #[arg(long, env = "LEGALIZE_BIND", default_value = "127.0.0.1:8501")]
    bind: String,

    /// Directory holding settings.json
    #[arg(long, env = "LEGALIZE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Override the stored model identifier
    #[arg(long, env = "LEGALIZE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Send a one-line prompt to verify the API key and model
    Check,
    /// Store the Gemini API key in settings.json (empty clears it)
    SetKey { key: String },
    /// Store the default model identifier
    SetModel { model: String },
    /// Print accumulated token usage
    Usage,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("legalize_lib=info,legalize_server=info,tower_http=info")),
        )
        .init();
}

fn build_client(model_override: Option<String>) -> Result<GeminiClient, String> {
    if !settings::has_api_key() {
        return Err(format!(
            "{} is not set. Export it, add it to a .env file, or run `legalize-server set-key`",
            settings::API_KEY_ENV
        ));
    }
    let client = GeminiClient::from_settings().map_err(|e| e.to_string())?;
    Ok(match model_override {
        Some(model) => client.with_model(model),
        None => client,
    })
}

fn print_usage() -> ExitCode {
    let usage = settings::get_usage_stats();
    println!("Model:           {}", settings::get_model());
    println!("Analyses:        {}", usage.analyses);
    println!("Chat turns:      {}", usage.chat_turns);
    println!("Prompt tokens:   {}", usage.total_prompt_tokens);
    println!("Response tokens: {}", usage.total_response_tokens);
    if let Some(last) = usage.last_used_at.and_then(chrono::DateTime::from_timestamp_millis) {
        println!("Last used:       {}", last.to_rfc3339());
    }
    ExitCode::SUCCESS
}

fn report(result: Result<(), String>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn check(client: &GeminiClient) -> ExitCode {
    match client.generate("Say: Connection Successful").await {
        Ok(text) => {
            println!("{}", text.trim());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(settings::default_data_dir);
    tracing::info!("Data directory: {}", data_dir.display());
    settings::init(data_dir);

    // Configuration commands work without a key
    match &cli.command {
        Some(Command::SetKey { key }) => return report(settings::set_api_key(key.trim().to_string())),
        Some(Command::SetModel { model }) => return report(settings::set_model(model.trim().to_string())),
        Some(Command::Usage) => return print_usage(),
        Some(Command::Check) | Some(Command::Serve) | None => {}
    }

    // Fail fast: no placeholder key
    let client = match build_client(cli.model) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        "Using model {} (key {})",
        client.model(),
        settings::get_masked_api_key().unwrap_or_default()
    );

    if matches!(cli.command, Some(Command::Check)) {
        return check(&client).await;
    }

    let state = AppState::new(Arc::new(client), settings::max_upload_bytes())
        .with_session_idle_timeout(settings::session_idle_timeout());
    match http_server::serve(state, &cli.bind).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server error on {}: {}", cli.bind, e);
            ExitCode::FAILURE
        }
    }
}
