use std::sync::Arc;
use std::time::Duration;

use bankscan_core::LanguageHint;
use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::extract::Extractor;
use crate::hash;
use crate::preprocess;
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::{ErrorPayload, ExtractionResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Recognition task failed: {0}")]
    Join(String),
}

/// Orchestrates: normalize → OCR → extract.
///
/// Holds no per-request state; build one and share it (it is cheap to clone).
pub struct DocumentPipeline<R: OcrBackend> {
    recognizer: Arc<R>,
    lang: LanguageHint,
    timeout: Duration,
}

impl<R: OcrBackend> Clone for DocumentPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
            lang: self.lang.clone(),
            timeout: self.timeout,
        }
    }
}

impl<R: OcrBackend + 'static> DocumentPipeline<R> {
    pub fn new(recognizer: R, lang: LanguageHint) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            lang,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn language_hint(&self) -> &LanguageHint {
        &self.lang
    }

    /// Run all three stages on the calling thread. Blocks for as long as the engine does.
    pub fn process_image(&self, image: DynamicImage) -> Result<ExtractionResult, PipelineError> {
        let (width, height) = (image.width(), image.height());

        // 1. Normalize.
        let normalized = preprocess::normalize(image);
        let digest = hash::short_digest(normalized.pixels().as_raw());
        info!(
            %digest,
            width,
            height,
            source_color = ?normalized.source_color(),
            "Normalized document image"
        );

        // 2. Recognize.
        let text = self.recognizer.recognize(&normalized, &self.lang)?;
        debug!(
            %digest,
            chars = text.chars().count(),
            preview = %text.chars().take(100).collect::<String>(),
            "Recognized text"
        );

        // 3. Extract.
        let result = Extractor::extract(&text);
        info!(
            %digest,
            amounts = result.amounts.len(),
            dates = result.dates.len(),
            card_numbers = result.card_numbers.len(),
            receipts = result.receipts.len(),
            sender = result.sender.is_some(),
            receiver = result.receiver.is_some(),
            transfer_type = result.transfer_type.is_some(),
            "Extracted fields"
        );
        Ok(result)
    }

    /// [`process_image`](Self::process_image) on the blocking pool, bounded by the timeout.
    pub async fn process(&self, image: DynamicImage) -> Result<ExtractionResult, PipelineError> {
        let pipeline = self.clone();
        let task = tokio::task::spawn_blocking(move || pipeline.process_image(image));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(PipelineError::Join(join.to_string())),
            Err(_) => Err(OcrError::Timeout(self.timeout).into()),
        }
    }

    /// The pipeline boundary: always JSON text, either the extraction or an
    /// `{"error": ...}` payload.
    pub async fn respond(&self, image: DynamicImage) -> String {
        render(self.process(image).await)
    }
}

/// Serialize an outcome; any failure, including serialization itself, becomes an [`ErrorPayload`].
pub fn render(outcome: Result<ExtractionResult, PipelineError>) -> String {
    match outcome.and_then(|r| Ok(r.to_json()?)) {
        Ok(json) => json,
        Err(e) => {
            error!("OCR pipeline error: {e}");
            ErrorPayload::new(e).to_json()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
