//! pyproject.toml loading.
//!
//! The `[tool.sip.*]` sections are kept as raw TOML tables since their keys
//! are validated against the option registries of the entities they
//! configure. The project metadata is deserialised from `[project]`, or from
//! `[tool.sip.metadata]` for projects that predate PEP 621.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::util::errors::UserError;

/// The name of the project file.
pub const PYPROJECT_FILE: &str = "pyproject.toml";

pub const PROJECT_SECTION: &str = "tool.sip.project";
pub const BUILDER_SECTION: &str = "tool.sip.builder";
pub const BINDINGS_SECTION: &str = "tool.sip.bindings";
pub const METADATA_SECTION: &str = "tool.sip.metadata";

/// A parsed pyproject.toml.
#[derive(Debug, Clone)]
pub struct PyProject {
    path: PathBuf,
    table: toml::Table,
}

impl PyProject {
    /// Load the pyproject.toml in a directory.
    pub fn load(root_dir: &Path) -> Result<Self> {
        let path = root_dir.join(PYPROJECT_FILE);

        if !path.is_file() {
            return Err(UserError::with_detail(
                "unable to find pyproject.toml",
                format!("there is no file '{}'", path.display()),
            )
            .into());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            UserError::with_detail(
                format!("unable to read '{}'", path.display()),
                e.to_string(),
            )
        })?;

        Self::parse(&content, &path)
    }

    /// Parse pyproject.toml content.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|e| {
            UserError::with_detail(
                format!("unable to parse '{}'", path.display()),
                e.message().to_string(),
            )
        })?;

        Ok(PyProject {
            path: path.to_path_buf(),
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a section by its dotted name.
    pub fn section(&self, name: &str) -> Result<Option<&toml::Table>, UserError> {
        let mut table = &self.table;

        for part in name.split('.') {
            match table.get(part) {
                None => return Ok(None),
                Some(toml::Value::Table(t)) => table = t,
                Some(_) => {
                    return Err(UserError::new(format!(
                        "'{}' in pyproject.toml must be a section",
                        name
                    )))
                }
            }
        }

        Ok(Some(table))
    }

    /// The `[[tool.sip.bindings]]` sections, in file order.
    pub fn bindings_sections(&self) -> Result<Vec<&toml::Table>, UserError> {
        let Some(tool_sip) = self.section("tool.sip")? else {
            return Ok(Vec::new());
        };

        match tool_sip.get("bindings") {
            None => Ok(Vec::new()),
            Some(toml::Value::Table(t)) => Ok(vec![t]),
            Some(toml::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    toml::Value::Table(t) => Ok(t),
                    _ => Err(UserError::new(format!(
                        "each '{}' in pyproject.toml must be a section",
                        BINDINGS_SECTION
                    ))),
                })
                .collect(),
            Some(_) => Err(UserError::new(format!(
                "'{}' in pyproject.toml must be a list of sections",
                BINDINGS_SECTION
            ))),
        }
    }

    /// Get the project metadata.
    pub fn metadata(&self) -> Result<Metadata> {
        if let Some(project) = self.section("project")? {
            let raw: RawProject = toml::Value::Table(project.clone())
                .try_into()
                .map_err(|e: toml::de::Error| {
                    UserError::with_detail("the [project] section is invalid", e.to_string())
                })?;
            return raw.into_metadata("project");
        }

        if let Some(section) = self.section(METADATA_SECTION)? {
            let raw: RawSipMetadata = toml::Value::Table(section.clone())
                .try_into()
                .map_err(|e: toml::de::Error| {
                    UserError::with_detail(
                        format!("the [{}] section is invalid", METADATA_SECTION),
                        e.to_string(),
                    )
                })?;
            return raw.into_metadata();
        }

        Err(UserError::new("pyproject.toml does not define a [project] section").into())
    }
}

/// The core metadata of the project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
    pub requires_python: Option<String>,
    pub license: Option<String>,
    pub requires_dist: Vec<String>,
    pub project_urls: Vec<(String, String)>,
}

impl Metadata {
    /// Render as a `METADATA`/`PKG-INFO` file.
    pub fn to_core_metadata(&self) -> String {
        let mut out = String::new();

        out.push_str("Metadata-Version: 2.1\n");
        out.push_str(&format!("Name: {}\n", self.name));
        out.push_str(&format!("Version: {}\n", self.version));

        if let Some(ref summary) = self.summary {
            out.push_str(&format!("Summary: {}\n", summary));
        }
        if let Some(ref license) = self.license {
            out.push_str(&format!("License: {}\n", license));
        }
        if let Some(ref requires_python) = self.requires_python {
            out.push_str(&format!("Requires-Python: {}\n", requires_python));
        }
        for (label, url) in &self.project_urls {
            out.push_str(&format!("Project-URL: {}, {}\n", label, url));
        }
        for requirement in &self.requires_dist {
            out.push_str(&format!("Requires-Dist: {}\n", requirement));
        }

        out
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLicense {
    Expression(String),
    Text { text: String },
    File { file: String },
}

/// A PEP 621 `[project]` section.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawProject {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    requires_python: Option<String>,
    license: Option<RawLicense>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    urls: toml::Table,
}

impl RawProject {
    fn into_metadata(self, section: &str) -> Result<Metadata> {
        let name = required(self.name, "name", section)?;
        let version = required(self.version, "version", section)?;

        let license = self.license.map(|l| match l {
            RawLicense::Expression(s) | RawLicense::Text { text: s } => s,
            RawLicense::File { file } => file,
        });

        let project_urls = self
            .urls
            .into_iter()
            .filter_map(|(label, url)| url.as_str().map(|u| (label, u.to_string())))
            .collect();

        Ok(Metadata {
            name,
            version,
            summary: self.description,
            requires_python: self.requires_python,
            license,
            requires_dist: self.dependencies,
            project_urls,
        })
    }
}

/// A `[tool.sip.metadata]` section, keyed by core metadata field names.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSipMetadata {
    name: Option<String>,
    version: Option<String>,
    summary: Option<String>,
    requires_python: Option<String>,
    license: Option<String>,
    requires_dist: Option<StringOrList>,
}

impl RawSipMetadata {
    fn into_metadata(self) -> Result<Metadata> {
        Ok(Metadata {
            name: required(self.name, "name", METADATA_SECTION)?,
            version: required(self.version, "version", METADATA_SECTION)?,
            summary: self.summary,
            requires_python: self.requires_python,
            license: self.license,
            requires_dist: self
                .requires_dist
                .map(StringOrList::into_vec)
                .unwrap_or_default(),
            project_urls: Vec::new(),
        })
    }
}

fn required(value: Option<String>, name: &str, section: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(UserError::UndefinedOption {
            name: name.to_string(),
            section: Some(section.to_string()),
        }
        .into()),
    }
}
