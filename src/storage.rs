use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

/// Where uploaded profile pictures end up. Behind a trait so handlers and
/// tests do not care about the actual disk layout.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Stores the object and returns the path to put in the user record.
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageClient for DiskStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create upload dir {}", self.root.display()))?;
        let path = self.root.join(key);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Unique stored name for an upload: random prefix plus the original name,
/// with path separators stripped out of the client-supplied part.
pub fn unique_key(original_name: &str) -> String {
    let safe: String = original_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}-{}", Uuid::new_v4(), safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_keys_differ_and_keep_the_name() {
        let a = unique_key("me.png");
        let b = unique_key("me.png");
        assert_ne!(a, b);
        assert!(a.ends_with("-me.png"));
    }

    #[test]
    fn unique_key_strips_separators() {
        let key = unique_key("../../etc/passwd");
        assert!(!key.contains('/'));
    }

    #[tokio::test]
    async fn disk_storage_writes_under_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::new(dir.path());
        let path = storage
            .put_object("abc-me.png", Bytes::from_static(b"\x89PNG"))
            .await
            .expect("put_object");
        assert!(path.contains("abc-me.png"));
        let on_disk = std::fs::read(dir.path().join("abc-me.png")).expect("read back");
        assert_eq!(on_disk, b"\x89PNG");
    }
}
