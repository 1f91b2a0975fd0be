//! Best-effort persistence of the update offset for warm restarts.
//!
//! Nothing here is allowed to fail the relay: a missing or corrupt file means
//! "start from offset 0", a failed write is logged and forgotten.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Option<i64> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no saved offset");
                return None;
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "read saved offset failed");
                return None;
            }
        };
        match contents.trim().parse::<i64>() {
            Ok(offset) if offset >= 0 => Some(offset),
            Ok(offset) => {
                tracing::warn!(path = %self.path.display(), offset, "ignoring negative saved offset");
                None
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ignoring unparseable saved offset");
                None
            }
        }
    }

    pub async fn save(&self, offset: i64) {
        if let Err(err) = self.write(offset).await {
            tracing::warn!(path = %self.path.display(), offset, %err, "checkpoint offset failed");
        }
    }

    async fn write(&self, offset: i64) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, format!("{offset}\n")).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::CursorStore;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("tgrelay-cursor-{name}-{}", Uuid::new_v4()))
            .join("offset")
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let store = CursorStore::new(temp_path("missing"));
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn save_then_load_returns_the_offset() {
        let path = temp_path("roundtrip");
        let store = CursorStore::new(&path);
        store.save(41).await;
        store.save(42).await;
        assert_eq!(store.load().await, Some(42));

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn garbage_and_negative_contents_are_ignored() {
        let path = temp_path("garbage");
        let dir = path.parent().expect("parent").to_path_buf();
        std::fs::create_dir_all(&dir).expect("mkdir");
        let store = CursorStore::new(&path);

        std::fs::write(&path, "not a number").expect("write");
        assert_eq!(store.load().await, None);

        std::fs::write(&path, "-5").expect("write");
        assert_eq!(store.load().await, None);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn save_into_unwritable_location_does_not_panic() {
        let file = temp_path("blocker");
        let dir = file.parent().expect("parent").to_path_buf();
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(&file, "1").expect("write");
        // A regular file where a directory is expected.
        let store = CursorStore::new(file.join("nested").join("offset"));
        store.save(5).await;
        assert_eq!(store.load().await, None);

        let _ = std::fs::remove_dir_all(dir);
    }
}
