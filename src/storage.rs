use crate::error::StorageError;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const FILE_PREFIX: &str = "audio_";
pub const FILE_EXTENSION: &str = "wav";

/// A saved clip. The file name doubles as the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recording {
    pub id: String,
    pub uri: PathBuf,
}

/// Owns the flat audio directory; the directory listing is the library.
#[derive(Debug, Clone)]
pub struct StorageGateway {
    dir: PathBuf,
}

impl StorageGateway {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the audio directory if it does not exist yet
    pub fn ensure_directory(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            StorageError::io(
                format!("Failed to create audio directory {:?}", self.dir),
                e,
            )
        })
    }

    /// Snapshot of the directory at call time.
    ///
    /// The iterator is lazy and single-pass; entries are yielded in whatever
    /// order the file system reports them. Non-files and unreadable entries
    /// are skipped.
    pub fn list_recordings(&self) -> Result<impl Iterator<Item = Recording> + '_, StorageError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            StorageError::io(format!("Failed to read audio directory {:?}", self.dir), e)
        })?;

        Ok(entries.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {:?}: {}", self.dir, e);
                    return None;
                }
            };

            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                return None;
            }

            let id = entry.file_name().into_string().ok()?;
            Some(Recording {
                uri: self.dir.join(&id),
                id,
            })
        }))
    }

    /// Move a finished capture into the library under a fresh name.
    ///
    /// The temp file is gone afterwards on success; on failure it may or may not
    /// still exist.
    pub fn save_recording(&self, temp: &Path) -> Result<Recording, StorageError> {
        let id = self.next_free_name();
        let uri = self.dir.join(&id);

        if let Err(e) = fs::rename(temp, &uri) {
            if e.kind() == ErrorKind::NotFound {
                return Err(StorageError::io(
                    format!("Capture {:?} no longer exists", temp),
                    e,
                ));
            }

            // Temp and library may sit on different file systems
            tracing::debug!("rename failed ({}), falling back to copy", e);
            copy_across(temp, &uri)?;
        }

        tracing::info!("Saved recording {}", id);
        Ok(Recording { id, uri })
    }

    /// Remove a saved recording by id
    pub fn delete_recording(&self, id: &str) -> Result<(), StorageError> {
        let path = self.path_for(id)?;

        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(id.to_string()),
            _ => StorageError::io(format!("Failed to delete {:?}", path), e),
        })?;

        tracing::info!("Deleted recording {}", id);
        Ok(())
    }

    /// Delete an unsaved capture. Missing files are not an error.
    pub fn discard_capture(&self, temp: &Path) -> Result<(), StorageError> {
        match fs::remove_file(temp) {
            Ok(()) => {
                tracing::debug!("Discarded capture {:?}", temp);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(
                format!("Failed to discard capture {:?}", temp),
                e,
            )),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        let plain = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\']);
        if !plain {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(self.dir.join(id))
    }

    fn next_free_name(&self) -> String {
        let mut stamp = chrono::Utc::now().timestamp_millis();
        loop {
            let name = format!("{}{}.{}", FILE_PREFIX, stamp, FILE_EXTENSION);
            if !self.dir.join(&name).exists() {
                return name;
            }
            stamp += 1;
        }
    }
}

/// Copy `temp` to `uri` and drop the original.
///
/// A failed copy leaves no partial file behind in the library.
fn copy_across(temp: &Path, uri: &Path) -> Result<(), StorageError> {
    if let Err(e) = fs::copy(temp, uri) {
        if let Err(cleanup) = fs::remove_file(uri) {
            if cleanup.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove partial copy {:?}: {}", uri, cleanup);
            }
        }
        return Err(StorageError::io(
            format!("Failed to move {:?} to {:?}", temp, uri),
            e,
        ));
    }

    if let Err(e) = fs::remove_file(temp) {
        tracing::warn!("Failed to remove capture {:?} after copy: {}", temp, e);
    }
    Ok(())
}

/// Whether `id` looks like a name produced by [`StorageGateway::save_recording`]
pub fn is_generated_name(id: &str) -> bool {
    id.strip_prefix(FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(&format!(".{}", FILE_EXTENSION)))
        .is_some_and(|stamp| !stamp.is_empty() && stamp.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_pattern() {
        assert!(is_generated_name("audio_1729000000000.wav"));
        assert!(!is_generated_name("audio_.wav"));
        assert!(!is_generated_name("audio_12a.wav"));
        assert!(!is_generated_name("clip_123.wav"));
        assert!(!is_generated_name("audio_123.m4a"));
    }

    #[test]
    fn test_failed_copy_leaves_nothing_in_library() {
        let dir = tempfile::TempDir::new().unwrap();
        let gateway = StorageGateway::new(dir.path().join("audio"));
        gateway.ensure_directory().unwrap();
        let uri = gateway.dir().join("audio_1.wav");
        // Stand-in for bytes written before the copy broke off
        fs::write(&uri, b"RIFF").unwrap();

        let result = copy_across(&dir.path().join("gone.wav"), &uri);

        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert!(!uri.exists());
        assert_eq!(gateway.list_recordings().unwrap().count(), 0);
    }

    #[test]
    fn test_copy_across_moves_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let temp = dir.path().join("take.wav");
        let uri = dir.path().join("audio_1.wav");
        fs::write(&temp, b"RIFF-take").unwrap();

        copy_across(&temp, &uri).unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read(&uri).unwrap(), b"RIFF-take");
    }

    #[test]
    fn test_path_like_ids_are_not_found() {
        let gateway = StorageGateway::new("/tmp/voicememo-never-created");
        for id in ["", "..", "../etc/passwd", "a/b.wav"] {
            assert!(matches!(
                gateway.delete_recording(id),
                Err(StorageError::NotFound(_))
            ));
        }
    }
}
