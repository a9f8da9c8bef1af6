//! Shared fakes for service tests: an in-memory object store and stub
//! runtime/VCS adapters.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use s3dock::error::{Error, Result};
use s3dock::store::{ObjectReader, ObjectStore};
use s3dock::{ContainerRuntime, VcsClient};

// =============================================================================
// In-Memory Object Store
// =============================================================================

/// [`ObjectStore`] over a `BTreeMap`, with failure injection for audit-path
/// and corruption tests.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Uploads to keys with any of these prefixes fail.
    fail_upload_prefixes: Mutex<Vec<String>>,
    /// Per-key count of stream reads to corrupt before serving real bytes.
    corrupt_reads: Mutex<HashMap<String, u32>>,
    /// Per-key count of stream downloads served.
    stream_reads: Mutex<HashMap<String, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes uploads under `prefix` fail with a store error.
    pub fn fail_uploads_under(&self, prefix: &str) {
        self.fail_upload_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    /// Serves flipped bytes for the next `count` streamed reads of `key`.
    pub fn corrupt_next_reads(&self, key: &str, count: u32) {
        self.corrupt_reads
            .lock()
            .unwrap()
            .insert(key.to_string(), count);
    }

    /// Number of streamed downloads served for `key`.
    pub fn stream_read_count(&self, key: &str) -> u32 {
        *self.stream_reads.lock().unwrap().get(key).unwrap_or(&0)
    }

    /// Snapshot of one object's bytes.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// All keys under a prefix, sorted.
    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Directly seeds an object, bypassing failure injection.
    pub fn seed(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, _bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let blocked = self
            .fail_upload_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| key.starts_with(prefix));
        if blocked {
            return Err(Error::Store(format!("injected upload failure for {key}")));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn upload_with_progress(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _size: i64,
        _label: &str,
    ) -> Result<()> {
        self.upload(bucket, key, data).await
    }

    async fn exists(&self, _bucket: &str, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn download(&self, _bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Store(format!("no such key: {key}")))
    }

    async fn download_stream(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let mut data = self.download(bucket, key).await?;

        *self
            .stream_reads
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;

        let mut corrupt = self.corrupt_reads.lock().unwrap();
        if let Some(remaining) = corrupt.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                if let Some(last) = data.last_mut() {
                    *last ^= 0xff;
                }
            }
        }

        Ok(Box::new(Cursor::new(data)))
    }

    async fn copy(&self, _bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let data = objects
            .get(src_key)
            .cloned()
            .ok_or_else(|| Error::Store(format!("no such key: {src_key}")))?;
        objects.insert(dst_key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, _bucket: &str, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, _bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Fake Container Runtime
// =============================================================================

/// [`ContainerRuntime`] that exports a synthetic tar whose entry mtimes
/// change on every call, mimicking the timestamp noise of real exporters.
pub struct FakeRuntime {
    files: Mutex<Vec<(String, Vec<u8>)>>,
    export_counter: AtomicU64,
    fail_import: Mutex<bool>,
    pub imported: Mutex<Vec<Vec<u8>>>,
    present: Mutex<HashSet<String>>,
    pub built: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new(files: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            files: Mutex::new(files),
            export_counter: AtomicU64::new(0),
            fail_import: Mutex::new(false),
            imported: Mutex::new(Vec::new()),
            present: Mutex::new(HashSet::new()),
            built: Mutex::new(Vec::new()),
        }
    }

    /// Replaces exported content, changing the image's checksum.
    pub fn set_files(&self, files: Vec<(String, Vec<u8>)>) {
        *self.files.lock().unwrap() = files;
    }

    /// Marks an image as already present in the runtime.
    pub fn mark_present(&self, image_ref: &str) {
        self.present.lock().unwrap().insert(image_ref.to_string());
    }

    pub fn fail_imports(&self) {
        *self.fail_import.lock().unwrap() = true;
    }
}

impl ContainerRuntime for FakeRuntime {
    fn export(&self, _image_ref: &str) -> Result<Box<dyn Read + Send>> {
        // Fresh timestamps per export so determinism must come from the
        // normalization pipeline, not from the fake.
        let mtime = 1_700_000_000 + self.export_counter.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap().clone();
        let pairs: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_slice()))
            .collect();
        Ok(Box::new(Cursor::new(build_tar(&pairs, mtime))))
    }

    fn import(&self, tar: &mut dyn Read) -> Result<()> {
        let mut data = Vec::new();
        tar.read_to_end(&mut data)?;
        if *self.fail_import.lock().unwrap() {
            return Err(Error::Runtime("runtime refused the archive".to_string()));
        }
        self.imported.lock().unwrap().push(data);
        Ok(())
    }

    fn exists(&self, image_ref: &str) -> Result<bool> {
        Ok(self.present.lock().unwrap().contains(image_ref))
    }

    fn build(
        &self,
        _context: &Path,
        _dockerfile: &str,
        tags: &[String],
        _platform: Option<&str>,
    ) -> Result<()> {
        for tag in tags {
            self.built.lock().unwrap().push(tag.clone());
            self.mark_present(tag);
        }
        Ok(())
    }
}

// =============================================================================
// Fake VCS
// =============================================================================

/// [`VcsClient`] pinned to one commit.
pub struct FakeVcs {
    pub hash: String,
    pub time: String,
    pub dirty: bool,
}

impl FakeVcs {
    pub fn new(hash: &str, time: &str) -> Self {
        Self {
            hash: hash.to_string(),
            time: time.to_string(),
            dirty: false,
        }
    }

    pub fn dirty(hash: &str, time: &str) -> Self {
        Self {
            dirty: true,
            ..Self::new(hash, time)
        }
    }
}

impl VcsClient for FakeVcs {
    fn current_hash(&self, _path: &Path) -> Result<String> {
        Ok(self.hash.clone())
    }

    fn commit_timestamp(&self, _path: &Path) -> Result<String> {
        Ok(self.time.clone())
    }

    fn is_dirty(&self, _path: &Path) -> Result<bool> {
        Ok(self.dirty)
    }

    fn find_root(&self, start: &Path) -> Result<PathBuf> {
        Ok(start.to_path_buf())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Builds an in-memory tar archive.
pub fn build_tar(files: &[(&str, &[u8])], mtime: u64) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Current wall-clock `YYYYMM`, as the services derive it.
pub fn current_year_month() -> String {
    chrono::Utc::now().format("%Y%m").to_string()
}
