// Byte sources - File-backed and in-memory implementations of ByteSource

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::domain::errors::DomainError;
use crate::ports::ByteSource;

/// MIME type guessed from a file extension, `application/octet-stream` when unknown
pub fn mime_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// A file on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    size: u64,
    mime_type: String,
}

impl FileSource {
    /// Stat the file and guess its MIME type from the extension
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            DomainError::FileSystem(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(DomainError::FileSystem(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| DomainError::BadArgs(format!("No file name in {}", path.display())))?;

        Ok(Self {
            mime_type: mime_type_for(&path),
            size: metadata.len(),
            name,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, DomainError> {
        let end = end.min(self.size);
        if start >= end {
            return Ok(Vec::new());
        }
        let io_error =
            |e: std::io::Error| DomainError::FileSystem(format!("{}: {}", self.path.display(), e));

        let mut file = tokio::fs::File::open(&self.path).await.map_err(io_error)?;
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(io_error)?;
        let mut buffer = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buffer).await.map_err(io_error)?;
        Ok(buffer)
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Bytes held in memory, such as a transcoded result
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, DomainError> {
        let len = self.data.len();
        let start = (start as usize).min(len);
        let end = (end as usize).clamp(start, len);
        Ok(self.data[start..end].to_vec())
    }
}
