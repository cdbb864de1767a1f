use serde::{Deserialize, Serialize};
use std::fmt;

/// Two OCR language codes, recognised together (e.g. Russian + English).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageHint {
    primary: String,
    secondary: String,
}

impl LanguageHint {
    pub fn new(primary: &str, secondary: &str) -> Self {
        LanguageHint {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn secondary(&self) -> &str {
        &self.secondary
    }
}

impl Default for LanguageHint {
    fn default() -> Self {
        LanguageHint::new("rus", "eng")
    }
}

/// Renders in Tesseract's `-l` argument form: `rus+eng`.
impl fmt::Display for LanguageHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.primary, self.secondary)
    }
}

impl std::str::FromStr for LanguageHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('+');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(q), None) if is_code(p) && is_code(q) => Ok(LanguageHint::new(p, q)),
            _ => Err(format!(
                "Language hint must be two codes joined by '+', got: '{s}'"
            )),
        }
    }
}

fn is_code(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TryFrom<String> for LanguageHint {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LanguageHint> for String {
    fn from(hint: LanguageHint) -> Self {
        hint.to_string()
    }
}
