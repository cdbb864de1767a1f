use std::sync::Arc;

use anyhow::Context;
use bankscan_ocr::{DocumentPipeline, ErrorPayload, TesseractCli};
use teloxide::dispatching::UpdateHandler;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, FileMeta, ParseMode, ReplyParameters};
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use crate::format::{self, Reply};

/// The shared, stateless OCR pipeline injected into every handler.
pub type Pipeline = Arc<DocumentPipeline<TesseractCli>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "инструкция по использованию")]
    Start,
}

pub fn schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo))
        .branch(dptree::filter(|msg: Message| msg.document().is_some()).endpoint(handle_document))
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Start => {
            let sent = bot
                .send_message(msg.chat.id, format::welcome())
                .parse_mode(ParseMode::MarkdownV2)
                .await;
            if let Err(e) = sent {
                error!(chat_id = %msg.chat.id, "Welcome message failed: {e}");
                bot.send_message(msg.chat.id, format::UNEXPECTED_ERROR).await?;
            }
        }
    }
    Ok(())
}

async fn handle_photo(bot: Bot, msg: Message, pipeline: Pipeline) -> anyhow::Result<()> {
    if let Err(e) = process_photo(&bot, &msg, &pipeline).await {
        error!(chat_id = %msg.chat.id, "Photo handling failed: {e:#}");
        reply_or_fallback(&bot, msg.chat.id, format::PHOTO_ERROR).await?;
    }
    Ok(())
}

async fn handle_document(bot: Bot, msg: Message, pipeline: Pipeline) -> anyhow::Result<()> {
    let is_image = msg
        .document()
        .and_then(|d| d.mime_type.as_ref())
        .is_some_and(|m| m.essence_str().starts_with("image/"));
    if !is_image {
        return reply_or_fallback(&bot, msg.chat.id, format::NOT_AN_IMAGE).await;
    }

    if let Err(e) = process_document(&bot, &msg, &pipeline).await {
        error!(chat_id = %msg.chat.id, "Document handling failed: {e:#}");
        reply_or_fallback(&bot, msg.chat.id, format::DOCUMENT_ERROR).await?;
    }
    Ok(())
}

async fn process_photo(bot: &Bot, msg: &Message, pipeline: &Pipeline) -> anyhow::Result<()> {
    // Telegram lists sizes smallest first.
    let photo = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .context("message carries no photo sizes")?;
    log_sender(msg, "photo");

    bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;
    let bytes = download(bot, &photo.file).await?;
    let image = bankscan_ocr::decode(&bytes)?;
    info!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "Image received"
    );

    let notice = bot.send_message(msg.chat.id, format::PROCESSING_NOTICE).await?;
    let result = pipeline.respond(image).await;
    log_error_payload(msg, &result);
    if let Err(e) = bot.delete_message(msg.chat.id, notice.id).await {
        warn!(chat_id = %msg.chat.id, "Could not delete processing notice: {e}");
    }

    send_reply(bot, msg, format::photo_reply(&result)).await?;
    info!(chat_id = %msg.chat.id, "Photo processed");
    Ok(())
}

async fn process_document(bot: &Bot, msg: &Message, pipeline: &Pipeline) -> anyhow::Result<()> {
    let document = msg.document().context("message carries no document")?;
    log_sender(msg, "document");

    bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;
    let bytes = download(bot, &document.file).await?;
    let image = bankscan_ocr::decode(&bytes)?;

    let result = pipeline.respond(image).await;
    log_error_payload(msg, &result);
    send_reply(bot, msg, format::document_reply(&result)).await?;
    info!(chat_id = %msg.chat.id, "Document processed");
    Ok(())
}

async fn download(bot: &Bot, meta: &FileMeta) -> anyhow::Result<Vec<u8>> {
    let file = bot.get_file(meta.id.clone()).await?;
    let mut buf = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut buf)
        .await
        .with_context(|| format!("download of {} failed", file.path))?;
    Ok(buf)
}

async fn send_reply(bot: &Bot, msg: &Message, reply: Reply) -> anyhow::Result<()> {
    let mut request = bot
        .send_message(msg.chat.id, reply.text)
        .reply_parameters(ReplyParameters::new(msg.id));
    if reply.markdown {
        request = request.parse_mode(ParseMode::MarkdownV2);
    }
    request.await?;
    Ok(())
}

/// Send `text`, and if that fails try [`format::UNEXPECTED_ERROR`] once.
async fn reply_or_fallback(bot: &Bot, chat_id: ChatId, text: &str) -> anyhow::Result<()> {
    if let Err(e) = bot.send_message(chat_id, text).await {
        warn!(%chat_id, "Reply failed, sending fallback: {e}");
        bot.send_message(chat_id, format::UNEXPECTED_ERROR).await?;
    }
    Ok(())
}

fn log_error_payload(msg: &Message, result: &str) {
    if let Some(payload) = ErrorPayload::from_response(result) {
        warn!(
            chat_id = %msg.chat.id,
            error = %payload.error,
            "Pipeline returned an error payload"
        );
    }
}

fn log_sender(msg: &Message, kind: &str) {
    match msg.from.as_ref() {
        Some(user) => info!(
            chat_id = %msg.chat.id,
            user_id = %user.id,
            name = %user.first_name,
            "Received {kind}"
        ),
        None => info!(chat_id = %msg.chat.id, "Received {kind}"),
    }
}
