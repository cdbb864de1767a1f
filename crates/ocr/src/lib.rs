pub mod extract;
pub mod hash;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use extract::{Extractor, KeywordRule, Matcher, RegexMatcher};
pub use hash::short_digest;
pub use pipeline::{render, DocumentPipeline, PipelineError};
pub use preprocess::{decode, normalize, PreprocessError};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, TesseractCli};
pub use types::{ErrorPayload, ExtractionResult, NormalizedImage, OFFLINE_NOTE};
