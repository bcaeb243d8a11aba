use std::io;
use std::path::Path;

/// Reports free bytes on the filesystem holding a path.
pub trait SpaceProbe: Send + Sync {
    fn available(&self, path: &Path) -> io::Result<u64>;
}

/// Queries the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available(&self, path: &Path) -> io::Result<u64> {
        // The target folder may not exist yet; ask about its closest ancestor.
        let existing = path
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("."));
        fs2::available_space(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_uses_ancestor() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("a/b/c");
        let available = FsSpaceProbe.available(&missing).unwrap();
        assert!(available > 0);
    }
}
