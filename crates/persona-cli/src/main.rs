//! Persona CLI: command-line front end for the Persona admin API.
//!
//! Set PERSONA_API_URL and PERSONA_OAUTH_CLIENT_ID (a `.env` file works too).
//! PERSONA_ACCESS_TOKEN seeds the session; PERSONA_OAUTH_TOKEN_URL together
//! with PERSONA_REFRESH_TOKEN enables silent refresh on 401.

use anyhow::Context;
use clap::{Parser, Subcommand};
use persona_api_client::api::COPY_FAILED_MESSAGE;
use persona_api_client::upload::UPLOAD_FAILED_MESSAGE;
use persona_api_client::{
    AcceptList, CharacterImageTransfer, ClientConfig, Gateway, ImportError,
    ReqwestUploadTransport, UploadController, UploadFolder, UploadOptions,
};
use persona_cli::{init_tracing, read_selected_file, TerminalEvents};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "persona", about = "Persona admin API CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file through the presigned upload flow
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Destination folder: public or private
        #[arg(long, default_value = "public")]
        folder: UploadFolder,
        /// Accepted types, e.g. "image/*,.webp" (empty accepts anything)
        #[arg(long, default_value = "")]
        accept: String,
        /// Maximum file size in megabytes
        #[arg(long)]
        max_size_mb: Option<u64>,
        /// MIME type to use instead of extension detection
        #[arg(long)]
        mime: Option<String>,
    },
    /// Import a character-image transfer payload through the copy endpoint
    Import {
        /// Path to the transfer payload (JSON)
        payload: PathBuf,
    },
    /// Validate a character-image transfer payload without contacting the API
    ValidateTransfer {
        /// Path to the transfer payload (JSON)
        payload: PathBuf,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn load_transfer(path: &Path) -> anyhow::Result<CharacterImageTransfer> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read payload: {}", path.display()))?;
    Ok(CharacterImageTransfer::parse(&json)?)
}

fn gateway_from_env() -> anyhow::Result<(ClientConfig, Gateway)> {
    let config = ClientConfig::from_env().context(
        "Failed to load configuration. Set PERSONA_API_URL and PERSONA_OAUTH_CLIENT_ID",
    )?;
    tracing::debug!(?config, "Configuration loaded");
    let gateway = Gateway::from_config(&config)?;
    Ok((config, gateway))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload {
            file,
            folder,
            accept,
            max_size_mb,
            mime,
        } => {
            let (config, gateway) = gateway_from_env()?;
            let selected = read_selected_file(&file, mime).await?;
            let accept: AcceptList = accept.parse()?;

            let options = UploadOptions {
                folder,
                accept,
                max_size_mb: max_size_mb.or(config.max_upload_size_mb),
            };
            let transport = ReqwestUploadTransport::new(gateway.client().clone());
            let events = Arc::new(TerminalEvents::default());
            let mut controller = UploadController::new(gateway, transport, options, events.clone());

            let teardown = controller.teardown_handle();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    teardown.cancel();
                }
            });

            let record = controller.upload(selected).await;
            interrupt.abort();

            match record {
                Some(record) => print_json(&record)?,
                None => {
                    if let Some(detail) = events.error() {
                        tracing::debug!(detail = %detail, "Upload error detail");
                    }
                    let message = controller
                        .session()
                        .user_message()
                        .unwrap_or(UPLOAD_FAILED_MESSAGE)
                        .to_string();
                    return Err(anyhow::anyhow!(message));
                }
            }
        }
        Commands::Import { payload } => {
            let transfer = load_transfer(&payload).await?;
            let (_, gateway) = gateway_from_env()?;

            match gateway.import_transfer(&transfer).await {
                Ok(copied) => println!("Copied {} images", copied),
                Err(ImportError::Copy {
                    copied,
                    total,
                    file_id,
                    source,
                }) => {
                    return Err(anyhow::anyhow!(
                        "Copied {} of {} images; {}: {}",
                        copied,
                        total,
                        file_id,
                        source.user_message(COPY_FAILED_MESSAGE)
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::ValidateTransfer { payload } => {
            let transfer = load_transfer(&payload).await?;
            println!(
                "Payload is valid: {} images{}",
                transfer.images.len(),
                transfer
                    .character_id
                    .as_deref()
                    .map(|id| format!(" for character {}", id))
                    .unwrap_or_default()
            );
        }
    }

    Ok(())
}
