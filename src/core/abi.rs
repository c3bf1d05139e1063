//! ABI versions of the sip module.
//!
//! Every supported ABI has a directory of module sources named after its
//! `major.minor` version. Resolving a requested version selects one of the
//! installed directories.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::util::errors::UserError;
use crate::util::fs;

/// Overrides the location of the sip module sources.
pub const MODULE_SOURCE_DIR_ENV: &str = "SIPBUILD_MODULE_SOURCE_DIR";

/// The ABI versions known when no module sources are installed.
pub const BUILTIN_ABI_VERSIONS: &[&str] = &["12.15", "13.8"];

/// A `major.minor` ABI version, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbiVersion {
    pub major: u32,
    pub minor: u32,
}

impl AbiVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        AbiVersion { major, minor }
    }

    /// The requirement placed on the sip module distribution by a module
    /// built against this ABI.
    pub fn requirement(&self, sip_module: &str) -> String {
        format!(
            "{} (>={}, <{})",
            sip_module_project(sip_module),
            self,
            self.major + 1
        )
    }
}

impl Ord for AbiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl PartialOrd for AbiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for AbiVersion {
    type Err = UserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UserError::InvalidAbiVersion(s.to_string());

        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        let major = parse_component(major).ok_or_else(invalid)?;
        let minor = parse_component(minor).ok_or_else(invalid)?;

        Ok(AbiVersion { major, minor })
    }
}

fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// The name of the distribution that provides a sip module.
pub fn sip_module_project(sip_module: &str) -> String {
    sip_module.replace('.', "-")
}

/// Resolve a requested ABI version against the installed ones.
///
/// An empty request selects the latest installed version. A major version
/// selects the latest with that major. A full version must be installed if
/// `exact`, otherwise it is a minimum within the same major.
pub fn resolve_abi_version(
    requested: &str,
    exact: bool,
    installed: &[AbiVersion],
) -> Result<AbiVersion, UserError> {
    let requested = requested.trim();

    if requested.is_empty() {
        return installed
            .iter()
            .max()
            .copied()
            .ok_or_else(|| UserError::new("no sip module ABI versions are installed"));
    }

    if !requested.contains('.') {
        let major = parse_component(requested)
            .ok_or_else(|| UserError::InvalidAbiVersion(requested.to_string()))?;

        return installed
            .iter()
            .filter(|v| v.major == major)
            .max()
            .copied()
            .ok_or_else(|| UserError::UnsupportedAbiMajorVersion(requested.to_string()));
    }

    let target: AbiVersion = requested.parse()?;

    let found = if exact {
        installed.iter().find(|&&v| v == target).copied()
    } else {
        installed
            .iter()
            .filter(|v| v.major == target.major && v.minor >= target.minor)
            .min()
            .copied()
    };

    found.ok_or_else(|| UserError::UnsupportedAbiVersion(requested.to_string()))
}

/// Where the sip module sources for each ABI version live.
#[derive(Debug, Clone)]
pub enum ModuleSources {
    /// A directory with one sub-directory per ABI version.
    Directory(PathBuf),
    /// No sources are available, only the list of versions.
    Builtin(Vec<AbiVersion>),
}

impl ModuleSources {
    /// Use `$SIPBUILD_MODULE_SOURCE_DIR` if set, otherwise the builtin list.
    pub fn from_env() -> Self {
        match std::env::var_os(MODULE_SOURCE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => ModuleSources::Directory(PathBuf::from(dir)),
            _ => ModuleSources::builtin(),
        }
    }

    pub fn builtin() -> Self {
        ModuleSources::Builtin(
            BUILTIN_ABI_VERSIONS
                .iter()
                .filter_map(|v| v.parse().ok())
                .collect(),
        )
    }

    /// The installed ABI versions in ascending order.
    pub fn installed(&self) -> Result<Vec<AbiVersion>> {
        let mut versions = match self {
            ModuleSources::Builtin(versions) => versions.clone(),
            ModuleSources::Directory(dir) => {
                let entries = std::fs::read_dir(dir).with_context(|| {
                    format!("failed to read module source directory: {}", dir.display())
                })?;

                let mut versions = Vec::new();
                for entry in entries {
                    let entry = entry?;
                    if !entry.file_type()?.is_dir() {
                        continue;
                    }
                    if let Some(version) = entry
                        .file_name()
                        .to_str()
                        .and_then(|n| n.parse::<AbiVersion>().ok())
                    {
                        versions.push(version);
                    }
                }
                versions
            }
        };

        versions.sort();
        Ok(versions)
    }

    /// The directory of sources for an ABI version, if sources are available.
    pub fn source_dir(&self, abi: AbiVersion) -> Option<PathBuf> {
        match self {
            ModuleSources::Directory(dir) => Some(dir.join(abi.to_string())),
            ModuleSources::Builtin(_) => None,
        }
    }

    /// The full version of the latest sip module implementing an ABI,
    /// eg. `13.8.1`.
    pub fn sip_module_version(&self, abi: AbiVersion) -> Result<Option<String>> {
        let Some(dir) = self.source_dir(abi) else {
            return Ok(None);
        };

        let header = fs::read_to_string(&dir.join("sip.h.in"))?;

        for line in header.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() == 3 && parts[0] == "#define" && parts[1] == "SIP_MODULE_PATCH_VERSION" {
                return Ok(Some(format!("{}.{}", abi, parts[2])));
            }
        }

        anyhow::bail!(
            "'SIP_MODULE_PATCH_VERSION' not found for ABI {} in {}",
            abi,
            dir.display()
        )
    }

    /// Copy the sources of a non-shared sip module into a directory and
    /// return the names of the files to compile.
    pub fn copy_nonshared_sources(
        &self,
        abi: AbiVersion,
        module_name: &str,
        target_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let Some(source_dir) = self.source_dir(abi) else {
            return Ok(Vec::new());
        };

        let mut sources = Vec::new();

        for entry in std::fs::read_dir(&source_dir)
            .with_context(|| format!("failed to read directory: {}", source_dir.display()))?
        {
            let path = entry?.path();
            let Some(file_name) = path.file_name() else {
                continue;
            };

            match path.extension().and_then(|e| e.to_str()) {
                Some("c") | Some("cpp") => {
                    let target = target_dir.join(file_name);
                    fs::copy_file(&path, &target)?;
                    sources.push(target);
                }
                Some("h") => {
                    fs::copy_file(&path, &target_dir.join(file_name))?;
                }
                _ => {}
            }
        }

        self.install_sip_h(abi, module_name, false, target_dir)?;

        sources.sort();
        Ok(sources)
    }

    /// Install `sip.h` configured for a sip module in a directory.
    pub fn install_sip_h(
        &self,
        abi: AbiVersion,
        sip_module: &str,
        shared: bool,
        target_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let Some(source_dir) = self.source_dir(abi) else {
            return Ok(None);
        };

        let template = fs::read_to_string(&source_dir.join("sip.h.in"))?;
        let target = target_dir.join("sip.h");
        fs::write_string(&target, &configure_sip_h(&template, sip_module, shared))?;

        Ok(Some(target))
    }
}

fn configure_sip_h(template: &str, sip_module: &str, shared: bool) -> String {
    let base_name = sip_module.rsplit('.').next().unwrap_or(sip_module);
    let legacy = sip_module == "PyQt5.sip";

    template
        .replace("@_SIP_MODULE_FQ_NAME@", sip_module)
        .replace("@_SIP_MODULE_SHARED@", if shared { "1" } else { "0" })
        .replace("@_SIP_MODULE_ENTRY@", &format!("PyInit_{}", base_name))
        .replace("@_SIP_MODULE_BASE_NAME@", base_name)
        .replace("@_SIP_MODULE_LEGACY@", if legacy { "1" } else { "0" })
}

/// Add the requirement on the sip module distribution to a project's
/// dependencies unless the project already names it.
pub fn add_sip_module_requirement(
    requires_dist: &mut Vec<String>,
    sip_module: &str,
    abi: AbiVersion,
) {
    let project = sip_module_project(sip_module);

    let already_present = requires_dist.iter().any(|rd| {
        rd.split_whitespace()
            .next()
            .map(|first| requirement_name(first) == project)
            .unwrap_or(false)
    });

    if !already_present {
        requires_dist.insert(0, abi.requirement(sip_module));
    }
}

fn requirement_name(token: &str) -> &str {
    let end = token
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(token.len());
    &token[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn installed() -> Vec<AbiVersion> {
        vec![
            AbiVersion::new(12, 0),
            AbiVersion::new(12, 5),
            AbiVersion::new(13, 0),
        ]
    }

    #[test]
    fn test_empty_request_selects_latest() {
        assert_eq!(
            resolve_abi_version("", true, &installed()).unwrap(),
            AbiVersion::new(13, 0)
        );
    }

    #[test]
    fn test_major_request_selects_latest_of_major() {
        assert_eq!(
            resolve_abi_version("12", true, &installed()).unwrap(),
            AbiVersion::new(12, 5)
        );

        let err = resolve_abi_version("9", true, &installed()).unwrap_err();
        assert!(matches!(err, UserError::UnsupportedAbiMajorVersion(ref v) if v == "9"));
    }

    #[test]
    fn test_minimum_and_exact_requests() {
        assert_eq!(
            resolve_abi_version("12.2", false, &installed()).unwrap(),
            AbiVersion::new(12, 5)
        );
        assert_eq!(
            resolve_abi_version("12.5", true, &installed()).unwrap(),
            AbiVersion::new(12, 5)
        );

        let err = resolve_abi_version("12.2", true, &installed()).unwrap_err();
        assert_eq!(err.to_string(), "'12.2' is not a supported ABI version");

        assert!(resolve_abi_version("12.6", false, &installed()).is_err());
    }

    #[test]
    fn test_malformed_requests() {
        for request in ["twelve", "12.x", "12.", ".5", "1.2.3"] {
            let err = resolve_abi_version(request, true, &installed()).unwrap_err();
            assert!(
                matches!(err, UserError::InvalidAbiVersion(_)),
                "{}: {}",
                request,
                err
            );
        }
    }

    #[test]
    fn test_ordering_is_numeric() {
        let mut versions = vec![
            AbiVersion::new(12, 10),
            AbiVersion::new(12, 9),
            AbiVersion::new(11, 20),
        ];
        versions.sort();
        assert_eq!(versions[0], AbiVersion::new(11, 20));
        assert_eq!(versions[2], AbiVersion::new(12, 10));
    }

    #[test]
    fn test_requirement_is_inserted_first() {
        let mut requires = vec!["eggs>=2".to_string()];
        add_sip_module_requirement(&mut requires, "PyQt6.sip", AbiVersion::new(13, 6));
        assert_eq!(requires[0], "PyQt6-sip (>=13.6, <14)");
        assert_eq!(requires.len(), 2);

        add_sip_module_requirement(&mut requires, "PyQt6.sip", AbiVersion::new(13, 6));
        assert_eq!(requires.len(), 2);
    }

    #[test]
    fn test_existing_requirement_is_kept() {
        let mut requires = vec!["PyQt6-sip>=13.8,<14".to_string()];
        add_sip_module_requirement(&mut requires, "PyQt6.sip", AbiVersion::new(13, 6));
        assert_eq!(requires, vec!["PyQt6-sip>=13.8,<14".to_string()]);
    }

    fn module_source_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let abi = tmp.path().join("13.8");
        std::fs::create_dir_all(&abi).unwrap();
        std::fs::create_dir_all(tmp.path().join("12.15")).unwrap();
        std::fs::create_dir_all(tmp.path().join("not-a-version")).unwrap();
        std::fs::write(
            abi.join("sip.h.in"),
            "#define SIP_MODULE_PATCH_VERSION 1\n#define SIP_MODULE_NAME \"@_SIP_MODULE_FQ_NAME@\"\n#define SIP_MODULE_SHARED @_SIP_MODULE_SHARED@\n#define SIP_MODULE_ENTRY @_SIP_MODULE_ENTRY@\n",
        )
        .unwrap();
        std::fs::write(abi.join("siplib.c"), "").unwrap();
        std::fs::write(abi.join("array.c"), "").unwrap();
        std::fs::write(abi.join("sip_array.h"), "").unwrap();
        tmp
    }

    #[test]
    fn test_installed_versions_from_directory() {
        let tmp = module_source_dir();
        let sources = ModuleSources::Directory(tmp.path().to_path_buf());

        assert_eq!(
            sources.installed().unwrap(),
            vec![AbiVersion::new(12, 15), AbiVersion::new(13, 8)]
        );
        assert_eq!(
            sources
                .sip_module_version(AbiVersion::new(13, 8))
                .unwrap()
                .as_deref(),
            Some("13.8.1")
        );
    }

    #[test]
    fn test_copy_nonshared_sources() {
        let tmp = module_source_dir();
        let sources = ModuleSources::Directory(tmp.path().to_path_buf());
        let target = TempDir::new().unwrap();

        let copied = sources
            .copy_nonshared_sources(AbiVersion::new(13, 8), "spam", target.path())
            .unwrap();

        assert_eq!(copied.len(), 2);
        assert!(target.path().join("sip_array.h").exists());

        let sip_h = std::fs::read_to_string(target.path().join("sip.h")).unwrap();
        assert!(sip_h.contains("\"spam\""));
        assert!(sip_h.contains("SIP_MODULE_SHARED 0"));
        assert!(sip_h.contains("PyInit_spam"));
    }

    #[test]
    fn test_builtin_sources_have_no_files() {
        let sources = ModuleSources::builtin();
        let installed = sources.installed().unwrap();
        assert!(!installed.is_empty());
        assert!(sources.source_dir(installed[0]).is_none());
        assert_eq!(sources.sip_module_version(installed[0]).unwrap(), None);
    }
}
