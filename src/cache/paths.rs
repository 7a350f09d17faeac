// Cache path utilities.
// Maps (device, data type) keys onto the on-disk cache layout.

use std::path::{Component, Path, PathBuf};

use directories::ProjectDirs;

/// Name of the singleton metadata file at the cache root.
pub const META_FILE: &str = "meta.json";

/// Extension of entry files.
pub const ENTRY_EXTENSION: &str = "json";

/// Suffix appended to an entry path while it is being written.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Get the default cache directory (~/.cache/pylon on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pylon").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Path to the metadata file under `root`.
pub fn meta_path(root: &Path) -> PathBuf {
    root.join(META_FILE)
}

/// Directory holding every entry of one data type.
///
/// The data type is used as a relative path, so `config/wifi` nests two
/// levels deep. Only plain name components are kept: root, `.` and `..`
/// components are dropped so the result is always under `root`.
pub fn data_type_dir(root: &Path, data_type: &str) -> PathBuf {
    let normalized = data_type.replace('\\', "/");
    let mut dir = root.to_path_buf();
    for component in Path::new(&normalized).components() {
        if let Component::Normal(name) = component {
            dir.push(name);
        }
    }
    dir
}

/// Path to the entry file for a device and data type.
pub fn entry_path(root: &Path, device: &str, data_type: &str) -> PathBuf {
    data_type_dir(root, data_type).join(format!(
        "{}.{}",
        sanitize_name(device),
        ENTRY_EXTENSION
    ))
}

/// Temporary path used by the atomic write protocol (`<path>.tmp`).
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Whether `path` is an in-progress (or orphaned) temp file.
pub fn is_temp_file(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().ends_with(TEMP_SUFFIX)
}

/// Whether `path` is an entry file: a `.json` file that is not the metadata
/// file at the root and not a temp file.
pub fn is_entry_file(root: &Path, path: &Path) -> bool {
    if is_temp_file(path) || path == meta_path(root).as_path() {
        return false;
    }
    // Matched on the name, so an empty device (`.json`) still counts
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(&format!(".{ENTRY_EXTENSION}")))
}

/// Sanitize a name for use in filesystem paths.
/// Replaces problematic characters with underscores.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("simple"), "simple");
        assert_eq!(sanitize_name("with/slash"), "with_slash");
        assert_eq!(sanitize_name("owner:name"), "owner_name");
        assert_eq!(sanitize_name(r#"a\b*c?d"e<f>g|h"#), "a_b_c_d_e_f_g_h");
    }

    #[test]
    fn test_sanitize_keeps_dots_and_unicode() {
        assert_eq!(sanitize_name("192.168.1.1"), "192.168.1.1");
        assert_eq!(sanitize_name("küche-lautsprecher"), "küche-lautsprecher");
        assert_eq!(sanitize_name("my device (2)"), "my device (2)");
    }

    #[test]
    fn test_cache_paths() {
        let root = Path::new("/var/cache/pylon");

        let entry = entry_path(root, "living-room", "status");
        assert_eq!(entry, Path::new("/var/cache/pylon/status/living-room.json"));

        let nested = entry_path(root, "10.0.0.2:8080", "config/wifi");
        assert_eq!(
            nested,
            Path::new("/var/cache/pylon/config/wifi/10.0.0.2_8080.json")
        );

        assert_eq!(meta_path(root), Path::new("/var/cache/pylon/meta.json"));
    }

    #[test]
    fn test_data_type_stays_under_root() {
        let root = Path::new("/var/cache/pylon");

        assert_eq!(
            entry_path(root, "d1", "/status"),
            Path::new("/var/cache/pylon/status/d1.json")
        );
        assert_eq!(
            entry_path(root, "d1", "../../etc/status"),
            Path::new("/var/cache/pylon/etc/status/d1.json")
        );
        assert_eq!(
            entry_path(root, "d1", r"config\..\wifi"),
            Path::new("/var/cache/pylon/config/wifi/d1.json")
        );
        assert_eq!(
            entry_path(root, "d1", "./config//wifi/"),
            Path::new("/var/cache/pylon/config/wifi/d1.json")
        );
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        let path = Path::new("/c/status/d1.json");
        let temp = temp_path(path);
        assert_eq!(temp, Path::new("/c/status/d1.json.tmp"));
        assert!(is_temp_file(&temp));
        assert!(!is_temp_file(path));
    }

    #[test]
    fn test_is_entry_file() {
        let root = Path::new("/c");
        assert!(is_entry_file(root, Path::new("/c/status/d1.json")));
        assert!(!is_entry_file(root, Path::new("/c/meta.json")));
        assert!(!is_entry_file(root, Path::new("/c/status/d1.json.tmp")));
        assert!(!is_entry_file(root, Path::new("/c/status/notes.txt")));
        // Only the root meta file is special
        assert!(is_entry_file(root, Path::new("/c/status/meta.json")));
        assert!(is_entry_file(root, Path::new("/c/status/.json")));
    }
}
