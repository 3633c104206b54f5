// Probe LibAV adapter - Container metadata read through libav

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::errors::DomainError;
use crate::domain::rules::ratio_to_f64;
use crate::ports::*;

/// Bytes copied per read when staging a source that has no local path
const STAGING_CHUNK: u64 = 4 * 1024 * 1024;

/// Reads duration and frame rate from container and stream headers
pub struct ProbeLibavAdapter;

impl ProbeLibavAdapter {
    /// Initialise libav once for this process
    pub fn new() -> Result<Self, DomainError> {
        ffmpeg::init()
            .map_err(|e| DomainError::ProbeFail(format!("Failed to initialize FFmpeg: {}", e)))?;
        Ok(Self)
    }

    /// Copy a source without a local path into a temporary file
    ///
    /// The extension of the source name is kept so libav can pick the demuxer.
    async fn stage(source: &dyn ByteSource) -> Result<NamedTempFile, DomainError> {
        let suffix = Path::new(source.name())
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let staged = tempfile::Builder::new()
            .prefix("smoothframe-probe-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| DomainError::FileSystem(format!("Cannot stage {}: {}", source.name(), e)))?;
        let handle = staged
            .reopen()
            .map_err(|e| DomainError::FileSystem(format!("Cannot stage {}: {}", source.name(), e)))?;
        let mut writer = tokio::fs::File::from_std(handle);

        let size = source.size();
        let mut offset = 0;
        while offset < size {
            let end = (offset + STAGING_CHUNK).min(size);
            let chunk = source.read_range(offset, end).await?;
            if chunk.is_empty() {
                break;
            }
            writer.write_all(&chunk).await.map_err(|e| {
                DomainError::FileSystem(format!("Cannot stage {}: {}", source.name(), e))
            })?;
            offset += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| DomainError::FileSystem(format!("Cannot stage {}: {}", source.name(), e)))?;
        Ok(staged)
    }
}

/// Open the container, pick the best video stream and read its timing
fn read_container(path: &Path) -> Result<RawMetadata, DomainError> {
    let ictx = ffmpeg::format::input(path)
        .map_err(|e| DomainError::ProbeFail(format!("Failed to open input: {}", e)))?;
    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| DomainError::ProbeFail("No video track found".to_string()))?;

    let frame_rate = [stream.avg_frame_rate(), stream.rate()]
        .into_iter()
        .filter_map(|rate| ratio_to_f64(rate.numerator(), rate.denominator()))
        .find(|rate| *rate > 0.0);

    let container_duration = Some(ictx.duration())
        .filter(|d| *d > 0)
        .map(|d| d as f64 / ffmpeg::ffi::AV_TIME_BASE as f64);
    let stream_duration = Some(stream.duration()).filter(|d| *d > 0).and_then(|d| {
        let base = stream.time_base();
        ratio_to_f64(base.numerator(), base.denominator()).map(|unit| d as f64 * unit)
    });

    Ok(RawMetadata {
        duration: container_duration.or(stream_duration),
        frame_rate,
    })
}

#[async_trait]
impl ProbePort for ProbeLibavAdapter {
    async fn probe(&self, source: Arc<dyn ByteSource>) -> Result<RawMetadata, DomainError> {
        // Staged copies live until the blocking read finishes and are removed on drop
        let (path, _staged): (PathBuf, Option<NamedTempFile>) = match source.local_path() {
            Some(path) => (path.to_path_buf(), None),
            None => {
                let staged = Self::stage(source.as_ref()).await?;
                (staged.path().to_path_buf(), Some(staged))
            }
        };

        debug!(file_name = source.name(), path = %path.display(), "Reading container metadata");
        let raw = tokio::task::spawn_blocking(move || read_container(&path))
            .await
            .map_err(|e| DomainError::ProbeFail(format!("Probe task failed: {}", e)))??;
        debug!(
            file_name = source.name(),
            duration = ?raw.duration,
            frame_rate = ?raw.frame_rate,
            "Container metadata read"
        );
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sources::MemorySource;

    #[tokio::test]
    async fn test_probe_rejects_non_media_bytes() {
        let adapter = match ProbeLibavAdapter::new() {
            Ok(adapter) => adapter,
            Err(_) => return,
        };
        let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new(
            "broken.mp4",
            "video/mp4",
            b"definitely not a container".to_vec(),
        ));

        let err = adapter.probe(source).await.unwrap_err();
        assert!(matches!(err, DomainError::ProbeFail(_)));
    }

    #[tokio::test]
    async fn test_staging_copies_every_byte() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let source = MemorySource::new("clip.webm", "video/webm", data.clone());

        let staged = ProbeLibavAdapter::stage(&source).await.unwrap();
        assert!(staged.path().to_string_lossy().ends_with(".webm"));
        assert_eq!(std::fs::read(staged.path()).unwrap(), data);
    }
}
