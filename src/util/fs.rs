//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::util::errors::UserError;

/// Copy a single file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
///
/// Failure to create the file is reported as a user error since it is
/// almost always a permissions problem.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).map_err(|e| {
        UserError::with_detail(
            format!(
                "there was an error creating '{}' - make sure you have write permission on the parent directory",
                path.display()
            ),
            e.to_string(),
        )
        .into()
    })
}

/// Find files matching glob patterns relative to a base directory.
pub fn glob_files(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();

    for pattern in patterns {
        let full_pattern = base.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        for entry in
            glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", pattern))?
        {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        results.push(path);
                    }
                }
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                }
            }
        }
    }

    results.sort();
    results.dedup();
    Ok(results)
}

/// All files below a directory, as paths relative to `base`.
pub fn walk_files(dir: &Path, base: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(relative_path(base, entry.path()));
        }
    }

    Ok(files)
}

/// Canonicalize a path, but don't fail if it doesn't exist yet.
/// Returns the path as-is if canonicalization fails.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// The build directory used by a single action.
///
/// A persistent directory is a user-visible location (the `build` tool's
/// `build/` by default) that survives the action. A temporary directory is
/// removed when released.
#[derive(Debug)]
pub enum BuildDir {
    Persistent(PathBuf),
    Temporary(TempDir),
}

impl BuildDir {
    /// Create a fresh persistent build directory, removing any previous
    /// contents without confirmation.
    pub fn persistent(path: &Path) -> Result<Self> {
        remove_dir_all_if_exists(path)?;
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create build directory: {}", path.display()))?;
        Ok(BuildDir::Persistent(path.to_path_buf()))
    }

    /// Create a fresh temporary build directory.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sipbuild-")
            .tempdir()
            .context("failed to create a temporary build directory")?;
        Ok(BuildDir::Temporary(dir))
    }

    /// The directory itself.
    pub fn path(&self) -> &Path {
        match self {
            BuildDir::Persistent(path) => path,
            BuildDir::Temporary(dir) => dir.path(),
        }
    }

    /// Whether the directory is removed when released.
    pub fn is_temporary(&self) -> bool {
        matches!(self, BuildDir::Temporary(_))
    }

    /// Release the directory at the end of a successful action.
    pub fn release(self) -> Result<()> {
        match self {
            BuildDir::Persistent(_) => Ok(()),
            BuildDir::Temporary(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().with_context(|| {
                    format!("failed to remove build directory: {}", path.display())
                })
            }
        }
    }

    /// Give up ownership after a failed action, leaving the contents in
    /// place for inspection. Returns where they were left.
    pub fn abandon(self) -> PathBuf {
        match self {
            BuildDir::Persistent(path) => path,
            #[allow(deprecated)]
            BuildDir::Temporary(dir) => dir.into_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("sipfoopart0.c"), "").unwrap();
        fs::write(src.join("sipfoopart1.c"), "").unwrap();
        fs::write(src.join("sipAPIfoo.h"), "").unwrap();

        let files = glob_files(tmp.path(), &["src/**/*.c".to_string()]).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_walk_files_is_relative_and_sorted() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("QtCore");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("b.sip"), "").unwrap();
        fs::write(dir.join("a.sip"), "").unwrap();
        fs::write(dir.join("sub").join("c.sip"), "").unwrap();

        let files = walk_files(&dir, tmp.path()).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("QtCore/a.sip"),
                PathBuf::from("QtCore/b.sip"),
                PathBuf::from("QtCore/sub/c.sip"),
            ]
        );
    }

    #[test]
    fn test_persistent_build_dir_is_recreated_empty() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("stale.o"), "").unwrap();

        let dir = BuildDir::persistent(&build).unwrap();
        assert!(dir.path().exists());
        assert!(!dir.path().join("stale.o").exists());

        dir.release().unwrap();
        assert!(build.exists());
    }

    #[test]
    fn test_temporary_build_dir_is_removed_on_release() {
        let dir = BuildDir::temporary().unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.exists());
        assert!(dir.is_temporary());

        dir.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_abandoned_build_dir_is_kept() {
        let dir = BuildDir::temporary().unwrap();
        let path = dir.abandon();
        assert!(path.exists());
        fs::remove_dir_all(path).unwrap();
    }
}
