use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, DirBuilder, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::error::StoreError;
use super::id::FileId;

/// Size of the buffer used when copying an upload to disk.
pub const CHUNK_SIZE: usize = 4096;

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Outcome of a save or delete, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_id: String,
}

impl FileResult {
    fn ok(file_id: String, file_name: Option<String>) -> Self {
        Self {
            success: true,
            message: None,
            file_name,
            file_id,
        }
    }

    fn failed(file_id: String, err: &StoreError) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
            file_name: None,
            file_id,
        }
    }
}

/// An open stored file. The caller owns the handle and closes it by dropping.
#[derive(Debug)]
pub struct StoredFile {
    pub file: File,
    pub file_name: String,
}

/// Time-bucketed file store rooted at `base_path`.
///
/// Each upload lives alone in `<base>/<YYYYMMDDhhmm>/<token>/`. The store keeps
/// no in-memory state, so any number of calls may run at once. Nothing
/// coordinates a retrieve with a concurrent delete of the same id: the
/// retrieve can fail with `NotFound` when opening, or with an I/O error while
/// the caller is still reading.
pub struct FileStorage<C = SystemClock> {
    base_path: PathBuf,
    clock: C,
}

impl FileStorage<SystemClock> {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StoreError> {
        Self::with_clock(base_path, SystemClock)
    }
}

impl<C: Clock> FileStorage<C> {
    pub fn with_clock<P: AsRef<Path>>(base_path: P, clock: C) -> Result<Self, StoreError> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, clock })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Streams `reader` to disk under a freshly allocated id.
    ///
    /// Only the final component of `file_name` is used. A failed read or
    /// write aborts the save and leaves whatever was already written.
    #[instrument(skip(self, reader), err)]
    pub async fn save<R>(&self, mut reader: R, file_name: &str) -> Result<FileResult, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        let file_name = sanitize_file_name(file_name)?;
        let id = FileId::generate(self.clock.now());
        let dir = id.dir_in(&self.base_path);
        create_dir(&dir).await?;

        let path = dir.join(&file_name);
        let mut options = OpenOptions::new();
        options.create(true).append(true).read(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);
        let mut dst = options.open(&path).await?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            dst.write_all(&buffer[..n]).await?;
            written += n as u64;
        }
        dst.flush().await?;

        let file_id = id.to_string();
        info!(%file_id, path = %path.display(), bytes = written, "Stored file");
        Ok(FileResult::ok(file_id, Some(file_name)))
    }

    /// Opens the file stored under `file_id`.
    ///
    /// If the directory somehow holds several entries, the lexicographically
    /// smallest name wins.
    #[instrument(skip(self), err)]
    pub async fn retrieve(&self, file_id: &str) -> Result<StoredFile, StoreError> {
        let id = FileId::parse(file_id)?;
        let dir = id.dir_in(&self.base_path);
        let names = list_entries(&dir, file_id).await?;
        let first = names
            .first()
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))?;
        if names.len() > 1 {
            warn!(
                file_id,
                entries = names.len(),
                "File directory holds more than one entry, serving the first by name"
            );
        }

        let file = File::open(dir.join(first))
            .await
            .map_err(|e| not_found_or_io(e, file_id))?;
        let file_name = first.to_string_lossy().into_owned();
        debug!(file_id, file_name = %file_name, "Opened stored file");
        Ok(StoredFile { file, file_name })
    }

    /// Removes the whole directory of `file_id`. Never fails; the outcome is
    /// reported in the returned record.
    #[instrument(skip(self))]
    pub async fn delete(&self, file_id: &str) -> FileResult {
        match self.remove(file_id).await {
            Ok(file_name) => {
                info!(file_id, "Deleted file");
                FileResult::ok(file_id.to_string(), file_name)
            }
            Err(err) => {
                warn!(file_id, error = %err, "Delete failed");
                FileResult::failed(file_id.to_string(), &err)
            }
        }
    }

    async fn remove(&self, file_id: &str) -> Result<Option<String>, StoreError> {
        let id = FileId::parse(file_id)?;
        let dir = id.dir_in(&self.base_path);
        let names = list_entries(&dir, file_id).await?;
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| not_found_or_io(e, file_id))?;
        Ok(names.first().map(|n| n.to_string_lossy().into_owned()))
    }
}

fn sanitize_file_name(raw: &str) -> Result<String, StoreError> {
    Path::new(raw)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StoreError::InvalidFileName(raw.to_string()))
}

async fn create_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(path).await
}

async fn list_entries(dir: &Path, file_id: &str) -> Result<Vec<OsString>, StoreError> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| not_found_or_io(e, file_id))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| not_found_or_io(e, file_id))?
    {
        names.push(entry.file_name());
    }
    names.sort();
    Ok(names)
}

fn not_found_or_io(err: std::io::Error, file_id: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(file_id.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::clock::FixedClock;
    use chrono::NaiveDate;
    use std::io;
    use tempfile::TempDir;
    use tokio_util::bytes::Bytes;
    use tokio_util::io::StreamReader;

    fn storage() -> (TempDir, FileStorage<FixedClock>) {
        let dir = tempfile::tempdir().unwrap();
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 30, 10)
            .unwrap();
        let storage = FileStorage::with_clock(dir.path(), FixedClock::new(at)).unwrap();
        (dir, storage)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn read_back(storage: &FileStorage<FixedClock>, file_id: &str) -> (Vec<u8>, String) {
        let mut stored = storage.retrieve(file_id).await.unwrap();
        let mut content = Vec::new();
        stored.file.read_to_end(&mut content).await.unwrap();
        (content, stored.file_name)
    }

    #[tokio::test]
    async fn test_save_places_file_under_bucket_and_token() {
        let (root, storage) = storage();
        let content = pattern(10_000);

        let result = storage.save(&content[..], "report.pdf").await.unwrap();
        assert!(result.success);
        assert_eq!(result.file_name.as_deref(), Some("report.pdf"));
        assert_eq!(result.file_id.len(), 44);
        assert!(result.file_id.ends_with("cacebabbcdca"));

        let token = &result.file_id[..32];
        let path = root.path().join("202401011230").join(token).join("report.pdf");
        assert_eq!(std::fs::read(path).unwrap(), content);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_creates_owner_only_directories() {
        use std::os::unix::fs::PermissionsExt;

        let (root, storage) = storage();
        let result = storage.save(&b"x"[..], "a.txt").await.unwrap();
        let dir = root.path().join("202401011230").join(&result.file_id[..32]);
        let mode = std::fs::metadata(dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_round_trip_is_binary_exact() {
        let (_root, storage) = storage();
        for len in [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE * 37 + 123] {
            let content = pattern(len);
            let name = format!("blob-{len}.bin");
            let result = storage.save(&content[..], &name).await.unwrap();

            let (read, file_name) = read_back(&storage, &result.file_id).await;
            assert_eq!(read, content, "length {len}");
            assert_eq!(file_name, name);
        }
    }

    #[tokio::test]
    async fn test_saves_in_same_minute_get_distinct_ids() {
        let (_root, storage) = storage();
        let a = storage.save(&b"one"[..], "same.txt").await.unwrap();
        let b = storage.save(&b"two"[..], "same.txt").await.unwrap();
        assert_ne!(a.file_id, b.file_id);

        assert_eq!(read_back(&storage, &a.file_id).await.0, b"one");
        assert_eq!(read_back(&storage, &b.file_id).await.0, b"two");
    }

    #[tokio::test]
    async fn test_save_keeps_only_final_path_component() {
        let (root, storage) = storage();
        let result = storage.save(&b"secret"[..], "../../etc/passwd").await.unwrap();
        assert_eq!(result.file_name.as_deref(), Some("passwd"));

        let path = root
            .path()
            .join("202401011230")
            .join(&result.file_id[..32])
            .join("passwd");
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_save_rejects_name_without_file_component() {
        let (_root, storage) = storage();
        for name in ["", "..", "/"] {
            let err = storage.save(&b"x"[..], name).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidFileName(_)), "{name:?}");
        }
    }

    #[tokio::test]
    async fn test_save_propagates_read_errors() {
        let (_root, storage) = storage();
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let reader = StreamReader::new(futures::stream::iter(chunks));

        let err = storage.save(reader, "broken.bin").await.unwrap_err();
        match err {
            StoreError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_ids_do_not_touch_the_filesystem() {
        let (root, storage) = storage();
        let err = storage.retrieve("short").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));

        let result = storage.delete("short").await;
        assert!(!result.success);
        assert!(result.message.unwrap().contains("invalid file id"));

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_unknown_id_is_not_found() {
        let (_root, storage) = storage();
        let id = format!("{}{}", "ab".repeat(16), "cacebabbcdca");
        let err = storage.retrieve(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_retrieve_empty_directory_is_not_found() {
        let (root, storage) = storage();
        let token = "cd".repeat(16);
        std::fs::create_dir_all(root.path().join("202401011230").join(&token)).unwrap();

        let err = storage
            .retrieve(&format!("{token}cacebabbcdca"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_retrieve_picks_first_entry_by_name() {
        let (root, storage) = storage();
        let token = "ef".repeat(16);
        let dir = root.path().join("202401011230").join(&token);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("zeta.txt"), b"z").unwrap();
        std::fs::write(dir.join("alpha.txt"), b"a").unwrap();

        let (content, name) = read_back(&storage, &format!("{token}cacebabbcdca")).await;
        assert_eq!(name, "alpha.txt");
        assert_eq!(content, b"a");
    }

    #[tokio::test]
    async fn test_delete_removes_token_directory() {
        let (root, storage) = storage();
        let saved = storage.save(&b"bye"[..], "gone.txt").await.unwrap();

        let deleted = storage.delete(&saved.file_id).await;
        assert!(deleted.success);
        assert_eq!(deleted.message, None);
        assert_eq!(deleted.file_name.as_deref(), Some("gone.txt"));
        assert_eq!(deleted.file_id, saved.file_id);

        let dir = root.path().join("202401011230").join(&saved.file_id[..32]);
        assert!(!dir.exists());

        let err = storage.retrieve(&saved.file_id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_second_delete_reports_failure() {
        let (_root, storage) = storage();
        let saved = storage.save(&b"once"[..], "once.txt").await.unwrap();
        assert!(storage.delete(&saved.file_id).await.success);

        let again = storage.delete(&saved.file_id).await;
        assert!(!again.success);
        assert!(again.message.unwrap().contains("no files were found"));
    }

    #[test]
    fn test_result_serializes_with_camel_case_keys() {
        let result = FileResult::ok("id".into(), Some("a.txt".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": true, "fileName": "a.txt", "fileId": "id" })
        );
    }
}
