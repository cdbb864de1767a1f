use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bankscan_core::BankscanConfig;
use bankscan_ocr::{DocumentPipeline, TesseractCli};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use tracing_subscriber::EnvFilter;

mod format;
mod handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Config path: first CLI argument, else $BANKSCAN_CONFIG, else defaults + env only.
    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("BANKSCAN_CONFIG"))
        .map(PathBuf::from);
    let config = BankscanConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;
    tracing::info!(?config, "Configuration loaded");

    let pipeline: handlers::Pipeline = Arc::new(
        DocumentPipeline::new(
            TesseractCli::from_config(&config.ocr),
            config.ocr.languages.clone(),
        )
        .with_timeout(config.ocr.timeout()),
    );

    let bot = Bot::new(config.telegram.token.clone());
    // Messages that arrived while the bot was down are discarded.
    if let Err(e) = bot.delete_webhook().drop_pending_updates(true).await {
        tracing::warn!("Could not drop pending updates: {e}");
    }
    tracing::info!("Bot starting");

    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![pipeline])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("Bot stopped");
    Ok(())
}
