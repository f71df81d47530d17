use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Turns an uploaded screenshot into plain text. Only used to find the city.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, image: &[u8]) -> Result<String>;
}

/// Shells out to the `tesseract` binary, piping the image through stdin.
pub struct TesseractCli {
    binary: String,
    language: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: "eng".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl TextExtractor for TesseractCli {
    async fn extract_text(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary))?;

        let mut stdin = child.stdin.take().context("tesseract stdin unavailable")?;
        stdin
            .write_all(image)
            .await
            .context("Failed to write image to tesseract")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("tesseract did not finish")?;

        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract extracted {} chars", text.len());
        Ok(text)
    }
}

/// For input that is already text (pasted questions, saved listings).
#[derive(Debug, Default)]
pub struct PlainText;

#[async_trait]
impl TextExtractor for PlainText {
    async fn extract_text(&self, image: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(image).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_text_passthrough() {
        let text = PlainText.extract_text("Highest temperature in NYC".as_bytes()).await.unwrap();
        assert_eq!(text, "Highest temperature in NYC");
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let extractor = TesseractCli::new("definitely-not-a-real-ocr-binary");
        assert!(extractor.extract_text(&[0u8; 4]).await.is_err());
    }
}
