//! Directory helpers shared by builds and deployments.

use std::fs;
use std::io;
use std::path::Path;

use pretext_project::paths::is_proper_subdirectory;
use walkdir::WalkDir;

/// Copy the contents of `from` into `to`, merging with whatever is there.
pub fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = match entry.path().strip_prefix(from) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Remove `dir` when it lies strictly inside `root`. Returns whether anything was removed.
pub fn remove_dir_within(root: &Path, dir: &Path, what: &str) -> io::Result<bool> {
    if !is_proper_subdirectory(root, dir) {
        tracing::warn!(
            "Refusing to clean {} directory that isn't a proper subdirectory of the project.",
            what
        );
        return Ok(false);
    }
    if !dir.exists() {
        tracing::warn!(
            "Directory {} already does not exist, nothing to clean.",
            dir.display()
        );
        return Ok(false);
    }
    tracing::warn!(
        "Destroying directory {} to clean previously built {}.",
        dir.display(),
        what
    );
    fs::remove_dir_all(dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copies_nested_trees_over_existing_files() {
        let temp = tempdir().unwrap();
        let from = temp.path().join("from");
        let to = temp.path().join("to");
        fs::create_dir_all(from.join("a/b")).unwrap();
        fs::write(from.join("a/b/c.txt"), "new").unwrap();
        fs::create_dir_all(to.join("a/b")).unwrap();
        fs::write(to.join("a/b/c.txt"), "old").unwrap();
        fs::write(to.join("keep.txt"), "kept").unwrap();

        copy_dir(&from, &to).unwrap();

        assert_eq!(fs::read_to_string(to.join("a/b/c.txt")).unwrap(), "new");
        assert!(to.join("keep.txt").exists());
    }

    #[test]
    fn only_removes_inside_root() {
        let temp = tempdir().unwrap();
        let inside = temp.path().join("output");
        fs::create_dir_all(&inside).unwrap();

        assert!(!remove_dir_within(&inside, temp.path(), "output").unwrap());
        assert!(!remove_dir_within(temp.path(), &temp.path().join("missing"), "output").unwrap());
        assert!(remove_dir_within(temp.path(), &inside, "output").unwrap());
        assert!(!inside.exists());
    }
}
