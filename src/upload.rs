use std::path::Path;

use anyhow::Result;
use axum::extract::multipart::Field;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// An uploaded file spooled to a uniquely named temporary file. The file is removed when the
/// guard is dropped, on every exit path of the request.
#[derive(Debug)]
pub(crate) struct TempAudioFile {
    file: NamedTempFile,
}

impl TempAudioFile {
    /// Streams the field to disk chunk by chunk without buffering it in memory.
    pub(crate) async fn from_field(mut field: Field<'_>) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("whisper-")
            .suffix(".tmp")
            .tempfile()?;
        let mut writer = tokio::fs::File::from_std(file.as_file().try_clone()?);

        while let Some(chunk) = field.chunk().await? {
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;

        Ok(Self { file })
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }
}
