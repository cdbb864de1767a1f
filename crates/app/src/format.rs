//! User-facing texts and reply layout for the Telegram adapter.

use bankscan_ocr::ErrorPayload;
use teloxide::utils::markdown::{bold, code_block_with_lang, escape};

pub const PROCESSING_NOTICE: &str =
    "🔄 Обрабатываю изображение... Это может занять несколько секунд.";
pub const PHOTO_ERROR: &str =
    "❌ Произошла ошибка при обработке изображения. Попробуйте еще раз или отправьте другое фото.";
pub const DOCUMENT_ERROR: &str = "❌ Ошибка при обработке документа.";
pub const NOT_AN_IMAGE: &str = "❌ Пожалуйста, отправьте изображение (JPEG, PNG).";
/// Last-resort reply when even the regular apology could not be delivered.
pub const UNEXPECTED_ERROR: &str = "⚠️ Произошла непредвиденная ошибка. Попробуйте еще раз.";

/// A reply body and whether it must be sent as MarkdownV2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markdown: bool,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
        }
    }
}

pub fn welcome() -> String {
    [
        format!("🏦 {}", bold(&escape("BCC HUB OCR 2.0 Бот"))),
        String::new(),
        escape("Я обрабатываю банковские документы и извлекаю данные в структурированном виде."),
        String::new(),
        bold(&escape("Как использовать:")),
        escape("1. Сделайте фото чека, выписки или перевода"),
        escape("2. Отправьте фото мне в чат"),
        escape("3. Получите результат в формате JSON"),
        String::new(),
        format!("{} {}", bold(&escape("Поддерживаемые форматы:")), escape("JPEG, PNG")),
        format!(
            "{} {}",
            bold(&escape("Что умею извлекать:")),
            escape("суммы, даты, номера карт и квитанций, отправителя, получателя, тип перевода")
        ),
        String::new(),
        escape("Для начала просто отправьте мне фото документа!"),
    ]
    .join("\n")
}

fn looks_like_json(result: &str) -> bool {
    result.starts_with('{') && result.contains('}')
}

fn json_block(heading: &str, result: &str) -> Reply {
    Reply {
        text: format!("{}\n\n{}", bold(&escape(heading)), code_block_with_lang(result, "json")),
        markdown: true,
    }
}

/// Reply to a photo: JSON in a code block, anything else as plain text.
///
/// An error payload is never shown; the user gets [`PHOTO_ERROR`] instead.
pub fn photo_reply(result: &str) -> Reply {
    if ErrorPayload::from_response(result).is_some() {
        Reply::plain(PHOTO_ERROR)
    } else if looks_like_json(result) {
        json_block("✅ Данные извлечены!", result)
    } else {
        Reply::plain(format!("📝 Результат обработки:\n\n{result}"))
    }
}

/// Reply to an image sent as a file, or [`DOCUMENT_ERROR`] for an error payload.
pub fn document_reply(result: &str) -> Reply {
    if ErrorPayload::from_response(result).is_some() {
        Reply::plain(DOCUMENT_ERROR)
    } else {
        json_block("📄 Результат обработки документа:", result)
    }
}
