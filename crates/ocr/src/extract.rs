use std::sync::OnceLock;

use regex::Regex;

use crate::types::{ExtractionResult, OFFLINE_NOTE};

/// Recognized text longer than this many characters is cut in the `text` preview.
pub const PREVIEW_CHARS: usize = 500;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// A currency marker is required: bare numbers never match.
re!(re_amount, r"\d+[.,]?\d*\s?(?:₸|T|KZT)");
re!(re_date, r"\d{2}[./]\d{2}[./]\d{2,4}");
re!(re_card, r"\b\d{4}(?:[\s-]?\d{4}){3}\b");
re!(re_receipt, r"\b\d{12,20}\b");

// ── Matchers ──────────────────────────────────────────────────────────────────

/// One extraction rule for one list-valued field.
pub trait Matcher {
    /// JSON key the matches are stored under.
    fn field(&self) -> &'static str;

    /// Every match in reading order. Duplicates are kept.
    fn find_all(&self, text: &str) -> Vec<String>;
}

pub struct RegexMatcher {
    field: &'static str,
    regex: fn() -> &'static Regex,
}

impl Matcher for RegexMatcher {
    fn field(&self) -> &'static str {
        self.field
    }

    fn find_all(&self, text: &str) -> Vec<String> {
        (self.regex)()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Digits with an optional `.`/`,` decimal part, followed by `₸`, `T` or `KZT`.
pub const AMOUNTS: RegexMatcher = RegexMatcher { field: "amounts", regex: re_amount };
/// `DD.MM.YY(YY)` or with `/`; no calendar check.
pub const DATES: RegexMatcher = RegexMatcher { field: "dates", regex: re_date };
/// Four groups of four digits, optionally split by a space or hyphen.
pub const CARD_NUMBERS: RegexMatcher = RegexMatcher { field: "card_numbers", regex: re_card };
/// Standalone runs of 12–20 digits.
pub const RECEIPTS: RegexMatcher = RegexMatcher { field: "receipts", regex: re_receipt };

// ── Keyword fields ────────────────────────────────────────────────────────────

/// A line-level marker rule: any line containing one of `markers` yields the
/// line with all markers removed.
pub struct KeywordRule {
    pub markers: &'static [&'static str],
}

impl KeywordRule {
    pub fn value_from_line(&self, line: &str) -> Option<String> {
        if !self.markers.iter().any(|m| line.contains(m)) {
            return None;
        }
        let stripped = self
            .markers
            .iter()
            .fold(line.to_string(), |acc, m| acc.replace(m, ""));
        Some(
            stripped
                .trim_matches(|c: char| c == ':' || c == ' ')
                .trim()
                .to_string(),
        )
    }

    /// Value from the last matching line, if any.
    pub fn last_value(&self, text: &str) -> Option<String> {
        split_lines(text).filter_map(|l| self.value_from_line(l)).last()
    }
}

pub const SENDER: KeywordRule = KeywordRule {
    markers: &["Отправитель"],
};
pub const RECEIVER: KeywordRule = KeywordRule {
    markers: &["клиенту", "Получатель"],
};
pub const TRANSFER_TYPE: KeywordRule = KeywordRule {
    markers: &["Тип перевода"],
};

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| {
        matches!(
            c,
            '\n' | '\r'
                | '\x0b'
                | '\x0c'
                | '\x1c'
                | '\x1d'
                | '\x1e'
                | '\u{85}'
                | '\u{2028}'
                | '\u{2029}'
        )
    })
}

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Extract structured fields from raw OCR text. Pure: equal input gives equal output.
    pub fn extract(ocr_text: &str) -> ExtractionResult {
        ExtractionResult {
            text: preview(ocr_text),
            amounts: AMOUNTS.find_all(ocr_text),
            dates: DATES.find_all(ocr_text),
            card_numbers: CARD_NUMBERS.find_all(ocr_text),
            receipts: RECEIPTS.find_all(ocr_text),
            sender: SENDER.last_value(ocr_text),
            receiver: RECEIVER.last_value(ocr_text),
            transfer_type: TRANSFER_TYPE.last_value(ocr_text),
            note: OFFLINE_NOTE.to_string(),
        }
    }
}

/// First [`PREVIEW_CHARS`] characters plus `...`, or the whole text when short enough.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
