// Filesystem abstraction used by the cache store.
// Real disk in production, an in-memory tree for tests and fault injection.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;

/// The subset of file metadata the cache cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Size in bytes (zero for directories).
    pub len: u64,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
}

/// Minimal filesystem interface the cache is written against.
///
/// Every method reports "does not exist" as `io::ErrorKind::NotFound` so
/// callers can tell a cache miss apart from a real I/O failure.
pub trait FileSystem: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path` and write `contents` fully.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Atomically replace `to` with `from`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn metadata(&self, path: &Path) -> io::Result<FileInfo>;

    /// Immediate children of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Recursively list every regular file below `root`, sorted.
    /// A missing root yields an empty list.
    fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let children = match self.read_dir(&dir) {
                Ok(children) => children,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };

            for child in children {
                match self.metadata(&child) {
                    Ok(info) if info.is_dir => pending.push(child),
                    Ok(_) => files.push(child),
                    // Removed between listing and stat
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err),
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// The real disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl FileSystem for OsFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(contents)?;
        file.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileInfo> {
        let metadata = fs::metadata(path)?;
        Ok(FileInfo {
            len: metadata.len(),
            is_dir: metadata.is_dir(),
            modified: metadata.modified().ok(),
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { data: Vec<u8>, modified: SystemTime },
}

/// In-memory filesystem with real-disk error semantics.
///
/// Writing into a directory that does not exist fails with `NotFound`, just
/// like the disk would, so missing `create_dir_all` calls are caught in tests.
#[derive(Debug, Default)]
pub struct MemFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    fail_renames: AtomicBool,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

fn parent_is_dir(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> bool {
    match path.parent() {
        None => true,
        Some(parent) if parent.as_os_str().is_empty() => true,
        Some(parent) => matches!(nodes.get(parent), Some(Node::Dir)),
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent rename fail with `PermissionDenied`.
    pub fn set_rename_failure(&self, fail: bool) {
        self.fail_renames.store(fail, Ordering::SeqCst);
    }

    /// Override the modification time of an existing file.
    pub fn set_modified(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        match self.nodes.lock().get_mut(path) {
            Some(Node::File { modified, .. }) => {
                *modified = time;
                Ok(())
            }
            _ => Err(not_found(path)),
        }
    }

    /// Whether anything (file or directory) exists at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        self.nodes.lock().contains_key(path)
    }
}

impl FileSystem for MemFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.nodes.lock().get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir) => Err(io::Error::other(format!(
                "{}: is a directory",
                path.display()
            ))),
            None => Err(not_found(path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut nodes = self.nodes.lock();
        if !parent_is_dir(&nodes, path) {
            return Err(not_found(path));
        }
        if matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(io::Error::other(format!(
                "{}: is a directory",
                path.display()
            )));
        }
        nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: contents.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.fail_renames.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("rename {} -> {}: permission denied", from.display(), to.display()),
            ));
        }

        let mut nodes = self.nodes.lock();
        if !matches!(nodes.get(from), Some(Node::File { .. })) {
            return Err(not_found(from));
        }
        if !parent_is_dir(&nodes, to) {
            return Err(not_found(to));
        }
        if matches!(nodes.get(to), Some(Node::Dir)) {
            return Err(io::Error::other(format!("{}: is a directory", to.display())));
        }
        if let Some(node) = nodes.remove(from) {
            nodes.insert(to.to_path_buf(), node);
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::other(format!(
                "{}: is a directory",
                path.display()
            ))),
            None => Err(not_found(path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock();
        if !matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(not_found(path));
        }
        nodes.retain(|key, _| !key.starts_with(path));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock();
        let mut missing = Vec::new();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            match nodes.get(ancestor) {
                Some(Node::Dir) => break,
                Some(Node::File { .. }) => {
                    return Err(io::Error::other(format!(
                        "{}: not a directory",
                        ancestor.display()
                    )));
                }
                None => missing.push(ancestor.to_path_buf()),
            }
        }
        for dir in missing {
            nodes.insert(dir, Node::Dir);
        }
        Ok(())
    }

    fn metadata(&self, path: &Path) -> io::Result<FileInfo> {
        match self.nodes.lock().get(path) {
            Some(Node::Dir) => Ok(FileInfo {
                len: 0,
                is_dir: true,
                modified: None,
            }),
            Some(Node::File { data, modified }) => Ok(FileInfo {
                len: data.len() as u64,
                is_dir: false,
                modified: Some(*modified),
            }),
            None => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let nodes = self.nodes.lock();
        if !matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(not_found(path));
        }
        Ok(nodes
            .keys()
            .filter(|key| key.parent() == Some(path))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mem_write_requires_parent() {
        let fs = MemFs::new();
        let path = Path::new("/cache/status/router.json");

        let err = fs.write(path, b"{}").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        fs.create_dir_all(path.parent().unwrap()).unwrap();
        fs.write(path, b"{}").unwrap();
        assert_eq!(fs.read(path).unwrap(), b"{}");
    }

    #[test]
    fn test_mem_rename_replaces_target() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("/c")).unwrap();
        fs.write(Path::new("/c/a.tmp"), b"new").unwrap();
        fs.write(Path::new("/c/a"), b"old").unwrap();

        fs.rename(Path::new("/c/a.tmp"), Path::new("/c/a")).unwrap();

        assert_eq!(fs.read(Path::new("/c/a")).unwrap(), b"new");
        assert!(!fs.exists(Path::new("/c/a.tmp")));
    }

    #[test]
    fn test_mem_rename_failure_hook() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("/c")).unwrap();
        fs.write(Path::new("/c/a.tmp"), b"new").unwrap();
        fs.set_rename_failure(true);

        let err = fs
            .rename(Path::new("/c/a.tmp"), Path::new("/c/a"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(fs.exists(Path::new("/c/a.tmp")));
    }

    #[test]
    fn test_mem_remove_dir_all_is_component_wise() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("/c/status")).unwrap();
        fs.create_dir_all(Path::new("/c/status-extra")).unwrap();
        fs.write(Path::new("/c/status/a.json"), b"1").unwrap();
        fs.write(Path::new("/c/status-extra/b.json"), b"2").unwrap();

        fs.remove_dir_all(Path::new("/c/status")).unwrap();

        assert!(!fs.exists(Path::new("/c/status/a.json")));
        assert!(fs.exists(Path::new("/c/status-extra/b.json")));
    }

    #[test]
    fn test_walk_files_mem() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("/c/status")).unwrap();
        fs.create_dir_all(Path::new("/c/config/wifi")).unwrap();
        fs.write(Path::new("/c/meta.json"), b"{}").unwrap();
        fs.write(Path::new("/c/status/a.json"), b"{}").unwrap();
        fs.write(Path::new("/c/config/wifi/b.json"), b"{}").unwrap();

        let files = fs.walk_files(Path::new("/c")).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/c/config/wifi/b.json"),
                PathBuf::from("/c/meta.json"),
                PathBuf::from("/c/status/a.json"),
            ]
        );
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let files = OsFs.walk_files(&temp_dir.path().join("absent")).unwrap();
        assert!(files.is_empty());

        let files = MemFs::new().walk_files(Path::new("/absent")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_os_fs_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("status");
        let path = dir.join("router.json");

        OsFs.create_dir_all(&dir).unwrap();
        OsFs.write(&path, b"hello").unwrap();

        let info = OsFs.metadata(&path).unwrap();
        assert_eq!(info.len, 5);
        assert!(!info.is_dir);
        assert_eq!(OsFs.walk_files(temp_dir.path()).unwrap(), vec![path.clone()]);

        OsFs.remove_file(&path).unwrap();
        let err = OsFs.read(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
