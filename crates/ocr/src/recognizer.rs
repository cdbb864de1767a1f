use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bankscan_core::{LanguageHint, OcrConfig};
use thiserror::Error;

use crate::preprocess;
use crate::types::NormalizedImage;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode image for OCR: {0}")]
    Encode(String),
    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),
}

/// Abstraction over an OCR backend.
/// Implementations take a normalized bitmap and return the recognized text,
/// which may be empty.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &NormalizedImage, lang: &LanguageHint) -> Result<String, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string. Lets the extraction pipeline be tested
/// without Tesseract installed.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(
        &self,
        _image: &NormalizedImage,
        _lang: &LanguageHint,
    ) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }
}

// ── Tesseract command-line backend ────────────────────────────────────────────

/// Runs the `tesseract` executable, piping a PNG through stdin and reading text from stdout.
///
/// With a deadline set, a process still running when it passes is killed.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    cmd: PathBuf,
    tessdata_dir: Option<PathBuf>,
    deadline: Option<Duration>,
}

impl TesseractCli {
    pub fn new(cmd: impl Into<PathBuf>) -> Self {
        Self {
            cmd: cmd.into(),
            tessdata_dir: None,
            deadline: None,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            cmd: config.tesseract_cmd.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
            deadline: Some(config.timeout()),
        }
    }

    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn command(&self, lang: &LanguageHint) -> Command {
        let mut cmd = Command::new(&self.cmd);
        cmd.arg("stdin").arg("stdout").arg("-l").arg(lang.to_string());
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, OcrError> {
        let Some(limit) = self.deadline else {
            return Ok(child.wait()?);
        };
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OcrError::Timeout(limit));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image: &NormalizedImage, lang: &LanguageHint) -> Result<String, OcrError> {
        let png = preprocess::encode_png(image).map_err(|e| OcrError::Encode(e.to_string()))?;

        let mut child = self.command(lang).spawn().map_err(|e| {
            OcrError::NotAvailable(format!("failed to start {}: {e}", self.cmd.display()))
        })?;

        // Pipes are serviced on helper threads; only `wait` enforces the deadline.
        let stdin = child.stdin.take();
        let feeder = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                // An engine that exits early closes the pipe; its stderr explains why.
                match stdin.write_all(&png) {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let join_failed = |_| OcrError::Engine("OCR pipe thread panicked".into());
        feeder.join().map_err(join_failed)??;
        let stdout = stdout.join().map_err(join_failed)?;
        let stderr = stderr.join().map_err(join_failed)?;

        if !status.success() {
            return Err(OcrError::Engine(format!(
                "{} exited with {}: {}",
                self.cmd.display(),
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::normalize;
    use image::{DynamicImage, ImageBuffer, Rgb};

    fn blank() -> NormalizedImage {
        normalize(DynamicImage::ImageRgb8(ImageBuffer::from_pixel(4, 4, Rgb([255u8; 3]))))
    }

    #[test]
    fn mock_returns_preset_text() {
        let r = MockRecognizer::new("Отправитель: Иванов\n1500 KZT");
        let text = r.recognize(&blank(), &LanguageHint::default()).unwrap();
        assert_eq!(text, "Отправитель: Иванов\n1500 KZT");
    }

    #[test]
    fn mock_may_return_empty_text() {
        let r = MockRecognizer::new("");
        assert_eq!(r.recognize(&blank(), &LanguageHint::default()).unwrap(), "");
    }

    #[test]
    fn cli_passes_language_hint_and_tessdata_dir() {
        let cli = TesseractCli::new("tesseract").with_tessdata_dir("/usr/share/tessdata");
        let cmd = cli.command(&LanguageHint::default());
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["stdin", "stdout", "-l", "rus+eng", "--tessdata-dir", "/usr/share/tessdata"]
        );
    }

    #[test]
    fn cli_from_config_uses_configured_command() {
        let config = OcrConfig {
            tesseract_cmd: PathBuf::from("/opt/tess/bin/tesseract"),
            ..OcrConfig::default()
        };
        let cli = TesseractCli::from_config(&config);
        let cmd = cli.command(&config.languages);
        assert_eq!(cmd.get_program(), "/opt/tess/bin/tesseract");
    }

    #[test]
    fn cli_missing_executable_is_not_available() {
        let cli = TesseractCli::new("/nonexistent/bankscan/tesseract");
        let err = cli.recognize(&blank(), &LanguageHint::default()).unwrap_err();
        assert!(matches!(err, OcrError::NotAvailable(_)), "got {err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn cli_nonzero_exit_is_engine_error() {
        let cli = TesseractCli::new("false");
        let err = cli.recognize(&blank(), &LanguageHint::default()).unwrap_err();
        assert!(matches!(err, OcrError::Engine(_)), "got {err:?}");
    }

    /// Writes an executable shell script standing in for the engine.
    #[cfg(unix)]
    fn fake_engine(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn cli_reads_engine_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "cat > /dev/null\necho 'Сумма 1500 KZT'");
        let cli = TesseractCli::new(engine).with_deadline(Duration::from_secs(10));
        let text = cli.recognize(&blank(), &LanguageHint::default()).unwrap();
        assert_eq!(text, "Сумма 1500 KZT\n");
    }

    #[cfg(unix)]
    #[test]
    fn cli_kills_engine_past_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let engine = fake_engine(
            dir.path(),
            &format!("sleep 2\ntouch {}", marker.display()),
        );
        let cli = TesseractCli::new(engine).with_deadline(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = cli.recognize(&blank(), &LanguageHint::default()).unwrap_err();
        assert!(matches!(err, OcrError::Timeout(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));

        // A killed engine never reaches its last line.
        std::thread::sleep(Duration::from_millis(2500));
        assert!(!marker.exists());
    }

    #[test]
    fn cli_from_config_takes_deadline_from_timeout() {
        let config = OcrConfig {
            timeout_secs: 7,
            ..OcrConfig::default()
        };
        let cli = TesseractCli::from_config(&config);
        assert_eq!(cli.deadline, Some(Duration::from_secs(7)));
    }
}
