//! The target Python interpreter.
//!
//! The defaults of the `py_*` project options come from querying an
//! interpreter. Detection is lazy and happens at most once per run.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

/// The earliest supported minor version of Python 3.
pub const FIRST_SUPPORTED_MINOR: u32 = 5;

/// The latest supported minor version of Python 3.
pub const LAST_SUPPORTED_MINOR: u32 = 13;

const GET_PYTHON_TARGET: &str = include_str!("get_python_target.py");

/// What an interpreter reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PythonTarget {
    pub major: u32,
    pub minor: u32,
    /// The value of `sys.platform`.
    pub platform: String,
    pub debug: bool,
    pub include_dir: Option<PathBuf>,
    pub platlib: Option<PathBuf>,
    pub ext_suffix: Option<String>,
    /// The value of `sysconfig.get_platform()`.
    pub platform_tag: Option<String>,
    pub library_dir: Option<PathBuf>,
}

impl PythonTarget {
    /// Query an interpreter. Returns `None` if it can't be run or doesn't
    /// answer sensibly.
    pub fn query(interpreter: &Path) -> Option<PythonTarget> {
        let output = Command::new(interpreter)
            .env("PYTHONNOUSERSITE", "1")
            .args(["-c", GET_PYTHON_TARGET])
            .output();

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!(
                    "querying '{}' failed: {}",
                    interpreter.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return None;
            }
            Err(e) => {
                debug!("unable to run '{}': {}", interpreter.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&output.stdout) {
            Ok(target) => Some(target),
            Err(e) => {
                debug!(
                    "unexpected output from '{}': {}",
                    interpreter.display(),
                    e
                );
                None
            }
        }
    }
}

/// The interpreter to query: `$PYTHON`, then `python3`, then `python`.
pub fn find_interpreter() -> Option<PathBuf> {
    if let Ok(python) = std::env::var("PYTHON") {
        if !python.is_empty() {
            return Some(PathBuf::from(python));
        }
    }

    which::which("python3")
        .or_else(|_| which::which("python"))
        .ok()
}

/// The `sys.platform` of the host, used when no interpreter can be queried.
pub fn host_platform() -> &'static str {
    if cfg!(windows) {
        "win32"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "freebsd") {
        "freebsd"
    } else {
        "linux"
    }
}

/// Lazily detects the target interpreter.
#[derive(Debug, Default)]
pub struct PythonProbe {
    interpreter: Option<PathBuf>,
    target: OnceCell<Option<PythonTarget>>,
}

impl PythonProbe {
    /// A probe that searches for an interpreter when first used.
    pub fn new() -> Self {
        PythonProbe::default()
    }

    /// A probe for a specific interpreter.
    pub fn with_interpreter(interpreter: impl Into<PathBuf>) -> Self {
        PythonProbe {
            interpreter: Some(interpreter.into()),
            target: OnceCell::new(),
        }
    }

    /// A probe with a known answer.
    pub fn fixed(target: Option<PythonTarget>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(target);
        PythonProbe {
            interpreter: None,
            target: cell,
        }
    }

    /// The detected target, if any.
    pub fn target(&self) -> Option<&PythonTarget> {
        self.target
            .get_or_init(|| {
                let interpreter = self.interpreter.clone().or_else(find_interpreter)?;
                debug!("querying Python interpreter '{}'", interpreter.display());
                PythonTarget::query(&interpreter)
            })
            .as_ref()
    }

    pub fn platform(&self) -> String {
        self.target()
            .map(|t| t.platform.clone())
            .unwrap_or_else(|| host_platform().to_string())
    }
}

#[cfg(test)]
pub(crate) fn test_target(platform: &str) -> PythonTarget {
    PythonTarget {
        major: 3,
        minor: 12,
        platform: platform.to_string(),
        debug: false,
        include_dir: Some(PathBuf::from("/usr/include/python3.12")),
        platlib: Some(PathBuf::from("/usr/lib/python3/site-packages")),
        ext_suffix: Some(".cpython-312-x86_64-linux-gnu.so".to_string()),
        platform_tag: Some("linux-x86_64".to_string()),
        library_dir: None,
    }
}
