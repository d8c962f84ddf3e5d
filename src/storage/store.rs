use super::error::StorageError;
use crate::metainfo::Info;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

/// Longest base-name stem kept as-is; longer stems are clipped with an
/// ellipsis to stay well under common filesystem name limits.
const MAX_STEM_CHARS: usize = 60;

/// A piece-addressed store striped across the torrent's backing files.
///
/// Exposes the logical range `[0, total_size)`. Reads past the end yield
/// zeros and writes past the end accept only zeros, matching the protocol's
/// zero-padding of the final piece.
pub struct FileStore {
    entries: Vec<StoreEntry>,
    /// Cumulative byte offset of each entry; parallel to `entries`.
    offsets: Vec<u64>,
    total_size: u64,
}

struct StoreEntry {
    length: u64,
    final_path: PathBuf,
    staged: bool,
}

impl StoreEntry {
    fn backing_path(&self) -> PathBuf {
        if self.staged {
            part_path(&self.final_path)
        } else {
            self.final_path.clone()
        }
    }

    async fn open(full_path: PathBuf, length: u64) -> Result<Self, StorageError> {
        // A leftover .part next to a final file is stale; the final copy is
        // authoritative. Removal is best-effort.
        let part = part_path(&full_path);
        if tokio::fs::try_exists(&part).await.unwrap_or(false) {
            if let Err(err) = tokio::fs::remove_file(&part).await {
                warn!(path = %part.display(), %err, "couldn't remove stale part file");
            }
        }

        match tokio::fs::metadata(&full_path).await {
            Ok(meta) if meta.len() == length => Ok(Self {
                length,
                final_path: full_path,
                staged: false,
            }),
            _ => {
                let final_path = clamp_file_name(full_path);
                let part = part_path(&final_path);
                let file = File::create(&part).await?;
                file.set_len(length).await?;
                Ok(Self {
                    length,
                    final_path,
                    staged: true,
                })
            }
        }
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), StorageError> {
        let mut file = File::open(self.backing_path()).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.read_exact(buf).await?;
        Ok(())
    }

    async fn write_at(&self, data: &[u8], offset: u64) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.backing_path())
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    /// Demotes the entry to staging: the final file is copied to `.part`
    /// and re-truncated to the declared length.
    async fn stage(&mut self) -> Result<(), StorageError> {
        if self.staged {
            return Ok(());
        }
        let part = part_path(&self.final_path);
        tokio::fs::copy(&self.final_path, &part).await?;
        let file = OpenOptions::new().write(true).open(&part).await?;
        file.set_len(self.length).await?;
        self.staged = true;
        Ok(())
    }

    /// Promotes a staged entry: copy `.part` to the final name, then drop
    /// the `.part` file.
    async fn promote(&mut self) -> Result<(), StorageError> {
        if !self.staged {
            return Ok(());
        }
        let part = part_path(&self.final_path);
        tokio::fs::copy(&part, &self.final_path).await?;
        if let Err(err) = tokio::fs::remove_file(&part).await {
            warn!(path = %part.display(), %err, "couldn't remove part file");
        }
        self.staged = false;
        Ok(())
    }
}

impl FileStore {
    /// Builds the store under `root`, creating parent directories and
    /// staging any backing file that is missing or has the wrong size.
    pub async fn new(info: &Info, root: &Path) -> Result<Self, StorageError> {
        let mut entries = Vec::with_capacity(info.files.len());
        let mut offsets = Vec::with_capacity(info.files.len());
        let mut total_size = 0u64;

        for file in &info.files {
            let rel = sanitize_relative(&file.path)?;
            let full = root.join(rel);
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let entry = StoreEntry::open(full, file.length).await?;
            offsets.push(total_size);
            total_size += entry.length;
            entries.push(entry);
        }

        Ok(Self {
            entries,
            offsets,
            total_size,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Index of the entry containing `offset` (the last entry for offsets
    /// at or past the end; the main loops skip it via the length check).
    fn find(&self, offset: u64) -> usize {
        self.offsets
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    /// Fills `buf` from logical `offset`, spanning entries as needed.
    /// Returns the number of stored bytes read; the remainder of `buf`
    /// past the end of the store is zero-filled.
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, StorageError> {
        let mut index = self.find(offset);
        let mut off = offset;
        let mut filled = 0usize;

        while filled < buf.len() && index < self.entries.len() {
            let entry = &self.entries[index];
            let item_off = off - self.offsets[index];
            if item_off < entry.length {
                let space = (entry.length - item_off).min((buf.len() - filled) as u64) as usize;
                entry
                    .read_at(&mut buf[filled..filled + space], item_off)
                    .await?;
                filled += space;
                off += space as u64;
            }
            index += 1;
        }

        for byte in &mut buf[filled..] {
            *byte = 0;
        }
        Ok(filled)
    }

    /// Writes `data` at logical `offset`. Bytes past the end of the store
    /// must all be zero (the protocol's final-piece padding) and are
    /// discarded; a non-zero byte there is an error.
    pub async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, StorageError> {
        let mut index = self.find(offset);
        let mut off = offset;
        let mut written = 0usize;

        while written < data.len() && index < self.entries.len() {
            let entry = &self.entries[index];
            let item_off = off - self.offsets[index];
            if item_off < entry.length {
                let space = (entry.length - item_off).min((data.len() - written) as u64) as usize;
                entry
                    .write_at(&data[written..written + space], item_off)
                    .await?;
                written += space;
                off += space as u64;
            }
            index += 1;
        }

        if let Some(bad) = data[written..].iter().position(|&b| b != 0) {
            return Err(StorageError::NonZeroPastEnd(off + bad as u64));
        }
        Ok(data.len())
    }

    /// Marks every entry from the one containing `from` through the end of
    /// the store as staging again. Called when a piece fails verification.
    pub async fn set_bad(&mut self, from: u64) -> Result<(), StorageError> {
        let start = self.find(from);
        for entry in &mut self.entries[start..] {
            entry.stage().await?;
        }
        Ok(())
    }

    /// Promotes all staged entries to their final names. Per-entry failures
    /// are logged and do not stop the pass; the first one is returned.
    pub async fn cleanup(&mut self) -> Result<(), StorageError> {
        let mut first_err = None;
        for entry in &mut self.entries {
            if let Err(err) = entry.promote().await {
                warn!(path = %entry.final_path.display(), %err, "couldn't promote part file");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}

/// Lexically normalizes a descriptor-supplied relative path so `..` and
/// absolute components can't escape the store root.
fn sanitize_relative(path: &Path) -> Result<PathBuf, StorageError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => {
                clean.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(StorageError::PathTraversal(path.display().to_string()));
    }
    Ok(clean)
}

/// Clips over-long file name stems, keeping the extension. Most filesystems
/// cap names at 255 bytes; 60 code points leaves margin for multi-byte
/// characters plus the `.part` suffix.
fn clamp_file_name(path: PathBuf) -> PathBuf {
    let stem = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => return path,
    };
    if stem.chars().count() <= MAX_STEM_CHARS {
        return path;
    }
    let clipped: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let mut name = format!("{clipped}[...]");
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

#[cfg(test)]
mod name_tests {
    use super::*;

    #[test]
    fn test_short_names_untouched() {
        let path = PathBuf::from("/store/dir/file.bin");
        assert_eq!(clamp_file_name(path.clone()), path);
    }

    #[test]
    fn test_long_stem_clipped_keeps_extension() {
        let long: String = "x".repeat(80);
        let path = PathBuf::from(format!("/store/{long}.bin"));
        let clamped = clamp_file_name(path);
        let name = clamped.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("{}[...].bin", "x".repeat(60)));
    }

    #[test]
    fn test_sanitize_drops_escapes() {
        assert_eq!(
            sanitize_relative(Path::new("a/../../b")).unwrap(),
            PathBuf::from("b")
        );
        assert_eq!(
            sanitize_relative(Path::new("/abs/name")).unwrap(),
            PathBuf::from("abs/name")
        );
        assert!(sanitize_relative(Path::new("../..")).is_err());
    }
}
