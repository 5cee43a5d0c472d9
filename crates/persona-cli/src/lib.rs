use anyhow::{Context, Result};
use parking_lot::Mutex;
use persona_api_client::{FileRecord, SelectedFile, UploadEvents};
use std::io::Write;
use std::path::{Component, Path};

/// Initialize tracing for CLI binaries. Logs go to stderr so stdout stays JSON.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Read a local file into a [`SelectedFile`].
///
/// The MIME type is left to extension detection unless `mime` is given.
pub async fn read_selected_file(path: &Path, mime: Option<String>) -> Result<SelectedFile> {
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(anyhow::anyhow!("Invalid input: {}", path.display()));
    }

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("File name is not valid UTF-8: {}", path.display()))?;

    Ok(SelectedFile::new(name, mime, data))
}

/// Upload callbacks for a terminal: progress on stderr, last error kept for the caller.
#[derive(Default)]
pub struct TerminalEvents {
    last_percent: Mutex<Option<u8>>,
    error: Mutex<Option<String>>,
}

impl TerminalEvents {
    /// The resolved message of the most recent failure.
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }
}

impl UploadEvents for TerminalEvents {
    fn on_change(&self, record: Option<&FileRecord>) {
        if let Some(record) = record {
            tracing::debug!(file_id = %record.id, path = %record.path, "Upload record changed");
        }
    }

    fn on_error(&self, message: &str) {
        *self.error.lock() = Some(message.to_string());
    }

    fn on_progress(&self, percent: u8) {
        let mut last = self.last_percent.lock();
        if *last == Some(percent) {
            return;
        }
        *last = Some(percent);

        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\rUploading... {:>3}%", percent);
        if percent == 100 {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_api_client::FileStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_selected_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portrait.webp");
        std::fs::write(&path, b"RIFFxxxxWEBP").unwrap();

        let file = read_selected_file(&path, None).await.unwrap();
        assert_eq!(file.name, "portrait.webp");
        assert_eq!(file.mime, None);
        assert_eq!(file.size(), 12);
        assert_eq!(file.resolved_mime().as_deref(), Some("image/webp"));
    }

    #[tokio::test]
    async fn test_read_selected_file_with_mime_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dataset");
        std::fs::write(&path, b"{}\n").unwrap();

        let file = read_selected_file(&path, Some("application/jsonl".to_string()))
            .await
            .unwrap();
        assert_eq!(file.resolved_mime().as_deref(), Some("application/jsonl"));
    }

    #[tokio::test]
    async fn test_read_selected_file_rejects_parent_dir() {
        let err = read_selected_file(Path::new("../secrets.png"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn test_read_selected_file_missing() {
        let dir = tempdir().unwrap();
        let err = read_selected_file(&dir.path().join("nope.png"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }

    #[test]
    fn test_terminal_events_keep_last_error() {
        let events = TerminalEvents::default();
        let record = FileRecord {
            id: "f-1".to_string(),
            name: "a.png".to_string(),
            directory: "public".to_string(),
            path: "public/a.png".to_string(),
            status: FileStatus::Uploaded,
            mime: "image/png".to_string(),
            url: None,
        };

        events.on_progress(0);
        events.on_progress(100);
        events.on_change(Some(&record));
        events.on_change(None);
        assert_eq!(events.error(), None);

        events.on_error("Failed to prepare upload");
        events.on_error("Upload cancelled");
        assert_eq!(events.error().as_deref(), Some("Upload cancelled"));
    }
}
