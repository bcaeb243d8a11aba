use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::classifier::extension_of;
use crate::error::StorageError;

use super::space::{FsSpaceProbe, SpaceProbe};

/// Writes attachments below a download directory.
pub struct AttachmentStore<P: SpaceProbe = FsSpaceProbe> {
    download_dir: PathBuf,
    safety_margin: u64,
    probe: P,
}

impl AttachmentStore<FsSpaceProbe> {
    pub fn new<D: AsRef<Path>>(download_dir: D, safety_margin: u64) -> Self {
        Self::with_probe(download_dir, safety_margin, FsSpaceProbe)
    }
}

impl<P: SpaceProbe> AttachmentStore<P> {
    pub fn with_probe<D: AsRef<Path>>(download_dir: D, safety_margin: u64, probe: P) -> Self {
        Self {
            download_dir: download_dir.as_ref().to_path_buf(),
            safety_margin,
            probe,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Absolute folders are used as given. Relative folders are placed under
    /// the download directory and may not climb out of it.
    pub fn resolve_target(&self, folder: &Path) -> Result<PathBuf, StorageError> {
        if folder.is_absolute() {
            return Ok(folder.to_path_buf());
        }

        let mut relative = PathBuf::new();
        for component in folder.components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !relative.pop() {
                        return Err(StorageError::OutsideDownloadDir(folder.to_path_buf()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::OutsideDownloadDir(folder.to_path_buf()));
                }
            }
        }

        Ok(self.download_dir.join(relative))
    }

    /// Fails unless `size` plus the safety margin fits in `dir`.
    pub fn check_space(&self, dir: &Path, size: u64) -> Result<(), StorageError> {
        let required = size.saturating_add(self.safety_margin);
        let available = self
            .probe
            .available(dir)
            .map_err(|e| StorageError::ReadFile {
                path: dir.to_path_buf(),
                source: e,
            })?;

        if available < required {
            return Err(StorageError::DiskSpaceExceeded {
                path: dir.to_path_buf(),
                required,
                available,
            });
        }
        Ok(())
    }

    /// Saves `content` as `filename` inside `folder`, never overwriting.
    ///
    /// Name collisions get a numeric suffix (`report_2.pdf`, `report_3.pdf`).
    pub fn store(
        &self,
        folder: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir_path = self.resolve_target(folder)?;
        self.check_space(&dir_path, content.len() as u64)?;
        ensure_directory(&dir_path)?;

        let path = store_with_atomic_creation(&dir_path, filename, content)?;
        debug!("Saved {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn store_with_atomic_creation(
    dir_path: &Path,
    filename: &str,
    content: &[u8],
) -> Result<PathBuf, StorageError> {
    let (base, ext) = match filename.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
        _ => (filename, None),
    };

    for counter in 1..=1000 {
        let try_filename = match (counter, ext) {
            (1, _) => filename.to_string(),
            (_, Some(ext)) => format!("{}_{}{}", base, counter, ext),
            (_, None) => format!("{}_{}", base, counter),
        };
        let try_path = dir_path.join(&try_filename);

        // create_new is an atomic check-and-create (O_CREAT | O_EXCL)
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&try_path)
        {
            Ok(mut file) => {
                if let Err(e) = file.write_all(content) {
                    drop(file);
                    let _ = std::fs::remove_file(&try_path);
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
                return Ok(try_path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StorageError::WriteFile {
                    path: try_path,
                    source: e,
                });
            }
        }
    }

    Err(StorageError::FileExists(dir_path.join(filename)))
}

/// Counts files below `dir` by lowercase extension (`""` for none).
pub fn file_stats(dir: &Path) -> BTreeMap<String, usize> {
    let mut stats = BTreeMap::new();
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        *stats.entry(extension_of(&name)).or_insert(0) += 1;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::TempDir;

    struct FixedSpace(u64);

    impl SpaceProbe for FixedSpace {
        fn available(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_store_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(temp_dir.path(), 0);

        let path = store
            .store(Path::new("invoices/2024"), "test.pdf", b"Hello, World!")
            .unwrap();

        assert!(path.starts_with(temp_dir.path().join("invoices/2024")));
        assert_eq!(std::fs::read(&path).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_store_file_conflict_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(temp_dir.path(), 0);
        let folder = Path::new("test");

        let path1 = store.store(folder, "document.pdf", b"First").unwrap();
        assert!(path1.ends_with("document.pdf"));

        let path2 = store.store(folder, "document.pdf", b"Second").unwrap();
        assert!(path2.ends_with("document_2.pdf"));

        let path3 = store.store(folder, "document.pdf", b"Third").unwrap();
        assert!(path3.ends_with("document_3.pdf"));

        assert_eq!(std::fs::read(&path1).unwrap(), b"First");
    }

    #[test]
    fn test_conflict_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(temp_dir.path(), 0);

        store.store(Path::new("x"), "README", b"1").unwrap();
        let second = store.store(Path::new("x"), "README", b"2").unwrap();
        assert!(second.ends_with("README_2"));
    }

    #[test]
    fn test_relative_folder_cannot_escape() {
        let temp_dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(temp_dir.path(), 0);

        let result = store.resolve_target(Path::new("../outside"));
        assert!(matches!(result, Err(StorageError::OutsideDownloadDir(_))));

        let inside = store.resolve_target(Path::new("a/../b/./c")).unwrap();
        assert_eq!(inside, temp_dir.path().join("b/c"));
    }

    #[test]
    fn test_absolute_folder_used_as_is() {
        let temp_dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let store = AttachmentStore::new(temp_dir.path(), 0);

        let resolved = store.resolve_target(other.path()).unwrap();
        assert_eq!(resolved, other.path());
    }

    #[test]
    fn test_insufficient_space_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = AttachmentStore::with_probe(temp_dir.path(), 100, FixedSpace(150));

        let result = store.store(Path::new("big"), "a.bin", &[0u8; 60]);
        match result {
            Err(StorageError::DiskSpaceExceeded {
                required,
                available,
                ..
            }) => {
                assert_eq!(required, 160);
                assert_eq!(available, 150);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!temp_dir.path().join("big/a.bin").exists());

        assert!(store.store(Path::new("big"), "b.bin", &[0u8; 50]).is_ok());
    }

    #[test]
    fn test_file_stats() {
        let temp_dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(temp_dir.path(), 0);
        store.store(Path::new("a"), "x.pdf", b"1").unwrap();
        store.store(Path::new("b"), "y.PDF", b"2").unwrap();
        store.store(Path::new("b"), "z.txt", b"3").unwrap();

        let stats = file_stats(temp_dir.path());
        assert_eq!(stats.get(".pdf"), Some(&2));
        assert_eq!(stats.get(".txt"), Some(&1));
    }
}
