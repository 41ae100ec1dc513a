//! Locating projects and per-user state.

use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

/// File name of a project manifest.
pub const PROJECT_FILE: &str = "project.ptx";

/// Environment variable overriding the per-user state directory.
pub const HOME_ENV: &str = "PTX_HOME";

/// Nearest directory at or above `start` that contains a `project.ptx`.
pub fn project_path(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_FILE).is_file())
        .map(Path::to_path_buf)
}

/// Version pinned by a `pretext == X` line in the project's `requirements.txt`.
pub fn requirements_version(dir: &Path) -> Option<String> {
    let contents = fs::read_to_string(dir.join("requirements.txt")).ok()?;
    contents.lines().find_map(|line| {
        let line = line.split('#').next().unwrap_or_default().trim();
        let (name, version) = line.split_once("==")?;
        let name = name.trim();
        let name = name.split('[').next().unwrap_or(name).trim();
        if name.eq_ignore_ascii_case("pretext") {
            Some(version.trim().to_string())
        } else {
            None
        }
    })
}

/// Per-user state directory: `$PTX_HOME` or `~/.ptx`.
pub fn home_path() -> PathBuf {
    if let Some(home) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    user_home().join(".ptx")
}

fn user_home() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Short stable identifier of a directory, used to key running servers.
pub fn hash_path(path: &Path) -> String {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let digest = Sha256::digest(to_posix(&path).as_bytes());
    let mut hex = String::with_capacity(10);
    for byte in digest.iter().take(5) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Render a path with `/` separators.
pub fn to_posix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// True when `path` lies strictly below `root`.
pub fn is_proper_subdirectory(root: &Path, path: &Path) -> bool {
    let root = normalize_path(root);
    let path = normalize_path(path);
    path != root && path.starts_with(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn finds_project_in_ancestor() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(PROJECT_FILE), "<project/>").unwrap();
        let nested = temp.path().join("source/chapters");
        fs::create_dir_all(&nested).unwrap();

        let found = project_path(&nested).unwrap();

        assert_eq!(found, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn no_project_outside_tree() {
        let temp = tempdir().unwrap();

        assert!(project_path(temp.path()).is_none());
    }

    #[test]
    fn reads_pinned_version() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("requirements.txt"),
            "# This file was automatically generated with PreTeXt 2.14.0.\npretext == 2.14.0\n",
        )
        .unwrap();

        assert_eq!(requirements_version(temp.path()).as_deref(), Some("2.14.0"));
    }

    #[test]
    fn ignores_other_requirements() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("requirements.txt"), "lxml == 5.0\n").unwrap();

        assert_eq!(requirements_version(temp.path()), None);
    }

    #[test]
    fn hash_is_short_and_stable() {
        let temp = tempdir().unwrap();

        let first = hash_path(temp.path());
        let second = hash_path(temp.path());

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
        assert_ne!(first, hash_path(&temp.path().join("other")));
    }

    #[test]
    fn normalizes_parent_components() {
        assert_eq!(
            normalize_path(Path::new("/p/source/../generated-assets")),
            PathBuf::from("/p/generated-assets")
        );
    }

    #[test]
    fn subdirectory_check_is_strict() {
        assert!(is_proper_subdirectory(Path::new("/p"), Path::new("/p/output/web")));
        assert!(!is_proper_subdirectory(Path::new("/p"), Path::new("/p")));
        assert!(!is_proper_subdirectory(Path::new("/p"), Path::new("/p/../q")));
    }
}
