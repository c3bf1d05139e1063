//! Lightweight scanning of .sip files.
//!
//! This only understands the directives needed to name the module and find
//! the files that make it up. Everything else is left to the generator.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::util::errors::UserError;
use crate::util::fs;

/// What a scan of a module's .sip files found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedModule {
    pub module_name: String,
    pub uses_limited_api: bool,
    /// The defining file followed by every file it includes.
    pub sip_files: Vec<PathBuf>,
}

fn module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*%Module\s*(?:\(([^)]*)\)|([\w.]+))").expect("valid regex")
    })
}

fn module_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bname\s*=\s*([\w.]+)").expect("valid regex"))
}

fn limited_api_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"use_limited_api\s*=\s*True").expect("valid regex"))
}

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*%Include\s*(?:\(([^)]*)\)|(\S+))").expect("valid regex")
    })
}

fn optional_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"optional\s*=\s*True").expect("valid regex"))
}

/// Scan a defining .sip file and the files it includes.
///
/// Included files are looked for relative to the directory of the defining
/// file and then in each of `include_dirs`.
pub fn scan_module(sip_file: &Path, include_dirs: &[PathBuf]) -> Result<ScannedModule> {
    let base_dir = sip_file.parent().unwrap_or(Path::new(".")).to_path_buf();

    let mut module: Option<(String, bool)> = None;
    let mut seen = HashSet::new();
    let mut sip_files = Vec::new();
    let mut pending = vec![fs::normalize_path(sip_file)];

    while let Some(path) = pending.pop() {
        if !seen.insert(path.clone()) {
            continue;
        }

        let content = fs::read_to_string(&path)?;

        if module.is_none() {
            if let Some(caps) = module_re().captures(&content) {
                module = match (caps.get(1), caps.get(2)) {
                    (Some(args), _) => module_name_re()
                        .captures(args.as_str())
                        .map(|c| (c[1].to_string(), limited_api_re().is_match(args.as_str()))),
                    (None, Some(name)) => Some((name.as_str().to_string(), false)),
                    _ => None,
                };
            }
        }

        let mut includes = Vec::new();
        for caps in include_re().captures_iter(&content) {
            let (name, optional) = match (caps.get(1), caps.get(2)) {
                (Some(args), _) => {
                    let Some(name) = module_name_re().captures(args.as_str()) else {
                        continue;
                    };
                    (name[1].to_string(), optional_re().is_match(args.as_str()))
                }
                (None, Some(name)) => (name.as_str().to_string(), false),
                _ => continue,
            };

            match find_include(&name, &base_dir, include_dirs) {
                Some(found) => includes.push(found),
                None if optional => {}
                None => {
                    return Err(UserError::new(format!(
                        "unable to find file '{}' included by '{}'",
                        name,
                        path.display()
                    ))
                    .into())
                }
            }
        }

        sip_files.push(path);

        // Keep the order files are included in.
        pending.extend(includes.into_iter().rev());
    }

    let Some((module_name, uses_limited_api)) = module else {
        return Err(UserError::new(format!(
            "'{}' does not define a %Module",
            sip_file.display()
        ))
        .into());
    };

    Ok(ScannedModule {
        module_name,
        uses_limited_api,
        sip_files,
    })
}

fn find_include(name: &str, base_dir: &Path, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    std::iter::once(base_dir)
        .chain(include_dirs.iter().map(PathBuf::as_path))
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .map(|found| fs::normalize_path(&found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_follows_includes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("QtCore");
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(
            dir.join("QtCoremod.sip"),
            "%Module(name=PyQt6.QtCore, keyword_arguments=\"Optional\", use_limited_api=True)\n\
             %Include qobject.sip\n\
             %Include(name=qstring.sip)\n\
             %Include(name=qmissing.sip, optional=True)\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("qobject.sip"),
            "%Include qstring.sip\nclass QObject {};\n",
        )
        .unwrap();
        std::fs::write(dir.join("qstring.sip"), "class QString {};\n").unwrap();

        let scanned = scan_module(&dir.join("QtCoremod.sip"), &[]).unwrap();

        assert_eq!(scanned.module_name, "PyQt6.QtCore");
        assert!(scanned.uses_limited_api);

        let names: Vec<_> = scanned
            .sip_files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["QtCoremod.sip", "qobject.sip", "qstring.sip"]);
    }

    #[test]
    fn test_scan_legacy_module_syntax() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("spam.sip");
        std::fs::write(&file, "%Module spam\n").unwrap();

        let scanned = scan_module(&file, &[]).unwrap();
        assert_eq!(scanned.module_name, "spam");
        assert!(!scanned.uses_limited_api);
    }

    #[test]
    fn test_scan_uses_include_dirs() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("types.sip"), "").unwrap();

        let file = tmp.path().join("spam.sip");
        std::fs::write(&file, "%Module(name=spam)\n%Include types.sip\n").unwrap();

        let scanned = scan_module(&file, &[shared]).unwrap();
        assert_eq!(scanned.sip_files.len(), 2);
    }

    #[test]
    fn test_missing_include_is_user_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("spam.sip");
        std::fs::write(&file, "%Module(name=spam)\n%Include eggs.sip\n").unwrap();

        let err = scan_module(&file, &[]).unwrap_err();
        assert!(err.downcast_ref::<UserError>().is_some());
    }

    #[test]
    fn test_missing_module_directive() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("spam.sip");
        std::fs::write(&file, "class Spam {};\n").unwrap();

        let err = scan_module(&file, &[]).unwrap_err();
        assert!(err.to_string().contains("does not define a %Module"));
    }
}
