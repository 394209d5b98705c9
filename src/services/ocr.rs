// src/services/ocr.rs
//! OCR boundary and the tesseract-backed engine.
//!
//! Receipts are screenshots, so preprocessing is cheap: grayscale plus a
//! contrast boost, re-encoded as PNG and piped into `tesseract` on stdin.
//! Any failure downstream of the upload is treated as "no text".

use async_trait::async_trait;
use image::ImageFormat;
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Contrast boost applied after grayscale conversion
const CONTRAST_BOOST: f32 = 30.0;

/// Upload formats accepted as receipt images (MIME as reported by `infer`)
const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/vnd.microsoft.icon",
    "image/x-icon",
];

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR engine is not available")]
    Unavailable,

    #[error("Image preprocessing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to run OCR engine: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR engine exited with {status}: {stderr}")]
    Engine { status: String, stderr: String },

    #[error("OCR worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, image: &[u8]) -> Result<String, OcrError>;

    fn is_available(&self) -> bool;
}

/// Sniffs the upload's magic bytes; `None` for anything that is not a supported image.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| SUPPORTED_IMAGE_TYPES.contains(mime))
}

/// Runs OCR under a deadline. Unavailable engine, engine errors, timeouts and
/// blank output all come back as `None`.
pub async fn read_receipt(engine: &dyn OcrEngine, image: &[u8], timeout: Duration) -> Option<String> {
    if !engine.is_available() {
        warn!("OCR engine unavailable, treating receipt as unreadable");
        return None;
    }

    match tokio::time::timeout(timeout, engine.extract_text(image)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => {
            debug!(chars = text.len(), "OCR produced text");
            Some(text)
        }
        Ok(Ok(_)) => {
            warn!("OCR produced no text");
            None
        }
        Ok(Err(e)) => {
            warn!(error = %e, "OCR failed");
            None
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "OCR timed out");
            None
        }
    }
}

/// Shells out to the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    available: bool,
}

impl TesseractOcr {
    /// Probes `<binary> --version` once; an engine that fails the probe
    /// reports itself unavailable instead of failing every request.
    pub async fn detect(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        let available = match Command::new(&binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => {
                info!(binary = %binary, "Tesseract OCR available");
                true
            }
            Ok(status) => {
                warn!(binary = %binary, status = %status, "Tesseract probe failed");
                false
            }
            Err(e) => {
                warn!(binary = %binary, error = %e, "Tesseract not found, OCR disabled");
                false
            }
        };

        Self { binary, available }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn extract_text(&self, image: &[u8]) -> Result<String, OcrError> {
        if !self.available {
            return Err(OcrError::Unavailable);
        }

        let bytes = image.to_vec();
        let prepared = tokio::task::spawn_blocking(move || preprocess(&bytes)).await??;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--oem", "3", "--psm", "6"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&prepared).await?;
            // stdin dropped here so tesseract sees EOF
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OcrError::Engine {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Grayscale + contrast, re-encoded as PNG.
fn preprocess(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let enhanced = image::load_from_memory(bytes)?
        .grayscale()
        .adjust_contrast(CONTRAST_BOOST);

    let mut out = Cursor::new(Vec::new());
    enhanced.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
