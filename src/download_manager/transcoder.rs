//! MP3 transcoding through an external ffmpeg binary.

use crate::config::DownloadSettings;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("ffmpeg failed: {0}")]
    ConversionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode_to_mp3(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    bitrate: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, bitrate: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            bitrate: bitrate.into(),
        }
    }

    pub fn from_settings(settings: &DownloadSettings) -> Self {
        Self::new(settings.ffmpeg_path.clone(), settings.bitrate.clone())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode_to_mp3(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output_status = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .args([
                "-vn", // No video
                "-c:a",
                "libmp3lame",
                "-b:a",
                &self.bitrate,
                "-f",
                "mp3",
                "-y", // Overwrite output
            ])
            .arg(output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(ConversionError::ConversionFailed(stderr.to_string()));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(ConversionError::InvalidOutput(format!(
                "{} is empty",
                output.display()
            ))),
            Err(e) => Err(ConversionError::InvalidOutput(format!(
                "{}: {}",
                output.display(),
                e
            ))),
        }
    }
}
