use image::{ColorType, RgbImage};
use serde::{Deserialize, Serialize};

/// Disclaimer attached to every successful extraction.
pub const OFFLINE_NOTE: &str = "Обработка выполнена оффлайн, без LLM.";

/// Prefix of every error message handed back across the pipeline boundary.
pub const ERROR_PREFIX: &str = "Ошибка обработки";

/// An RGB8 bitmap that has already been contrast- and sharpness-enhanced.
///
/// Only `preprocess::normalize` constructs one, so holding a value is proof
/// the image went through normalization.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: RgbImage,
    source_color: ColorType,
}

impl NormalizedImage {
    pub(crate) fn new(pixels: RgbImage, source_color: ColorType) -> Self {
        Self { pixels, source_color }
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Color model of the decoded input before conversion.
    pub fn source_color(&self) -> ColorType {
        self.source_color
    }
}

/// Structured fields pulled out of recognized text.
///
/// Field order here is the key order of the serialized JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Recognized text, cut to 500 characters plus `...` when longer.
    pub text: String,
    pub amounts: Vec<String>,
    pub dates: Vec<String>,
    pub card_numbers: Vec<String>,
    pub receipts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_type: Option<String>,
    pub note: String,
}

impl ExtractionResult {
    /// Pretty JSON, two-space indent, non-ASCII left unescaped.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The single-key `{"error": ...}` payload returned instead of an [`ExtractionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self { error: format!("{ERROR_PREFIX}: {cause}") }
    }

    /// The payload carried by a pipeline response, if the response is a failure.
    ///
    /// Failure is signalled solely by an `error` key on the top-level object.
    pub fn from_response(json: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(json).ok()?;
        let error = value.as_object()?.get("error")?;
        Some(Self {
            error: error.as_str().map_or_else(|| error.to_string(), str::to_string),
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| format!("{{\n  \"error\": \"{ERROR_PREFIX}\"\n}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_key_order_is_fixed() {
        let r = ExtractionResult {
            text: "t".into(),
            receiver: Some("B".into()),
            sender: Some("A".into()),
            note: OFFLINE_NOTE.into(),
            ..Default::default()
        };
        let json = r.to_json().unwrap();
        let keys = [
            "\"text\"",
            "\"amounts\"",
            "\"dates\"",
            "\"card_numbers\"",
            "\"receipts\"",
            "\"sender\"",
            "\"receiver\"",
            "\"note\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn absent_keyword_fields_are_omitted() {
        let r = ExtractionResult { note: OFFLINE_NOTE.into(), ..Default::default() };
        let json = r.to_json().unwrap();
        assert!(!json.contains("sender"));
        assert!(!json.contains("receiver"));
        assert!(!json.contains("transfer_type"));
        assert!(json.contains("\"amounts\": []"));
    }

    #[test]
    fn cyrillic_is_not_escaped_and_indent_is_two_spaces() {
        let r = ExtractionResult { note: OFFLINE_NOTE.into(), ..Default::default() };
        let json = r.to_json().unwrap();
        assert!(json.contains("Обработка выполнена оффлайн"));
        assert!(json.contains("\n  \"text\": \"\""));
    }

    #[test]
    fn error_payload_has_only_error_key() {
        let json = ErrorPayload::new("tesseract exited with status 1").to_json();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(
            obj["error"],
            "Ошибка обработки: tesseract exited with status 1"
        );
    }

    #[test]
    fn error_payload_escapes_quotes_in_cause() {
        let json = ErrorPayload::new(r#"bad "quote""#).to_json();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["error"], r#"Ошибка обработки: bad "quote""#);
    }

    #[test]
    fn from_response_detects_error_payload() {
        let json = ErrorPayload::new("OCR engine not available").to_json();
        let payload = ErrorPayload::from_response(&json).unwrap();
        assert_eq!(payload.error, "Ошибка обработки: OCR engine not available");
    }

    #[test]
    fn from_response_ignores_extraction_and_garbage() {
        let ok = ExtractionResult { note: OFFLINE_NOTE.into(), ..Default::default() };
        assert!(ErrorPayload::from_response(&ok.to_json().unwrap()).is_none());
        assert!(ErrorPayload::from_response("not json").is_none());
        assert!(ErrorPayload::from_response("[\"error\"]").is_none());
    }

    #[test]
    fn from_response_keeps_non_string_error_values() {
        let payload = ErrorPayload::from_response("{\"error\": 42}").unwrap();
        assert_eq!(payload.error, "42");
    }
}
