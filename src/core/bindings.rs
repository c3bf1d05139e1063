//! A set of bindings for a single extension module.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::codegen::{CodeGenerator, CodeOptions, ParseRequest};
use crate::core::configurable::{merge_section, Configurable, DefaultStep};
use crate::core::option::{ConfigOption, ConfigValues, Origin, Value, COMPILING_TOOLS};
use crate::core::project::ResolvedProject;
use crate::core::pyproject::BINDINGS_SECTION;
use crate::util::errors::UserError;
use crate::util::fs;

/// Decides if a set of bindings can be built on the current system.
pub type BuildablePredicate = Box<dyn Fn(&Bindings) -> bool>;

/// The options of a set of bindings.
pub fn bindings_options() -> Vec<ConfigOption> {
    vec![
        // Tags used by the generator to select backstops.
        ConfigOption::list("backstops"),
        // Builder-specific settings.
        ConfigOption::list("builder_settings"),
        ConfigOption::list("define_macros"),
        ConfigOption::list("disabled_features"),
        ConfigOption::bool("exceptions"),
        ConfigOption::list("headers"),
        ConfigOption::list("include_dirs"),
        ConfigOption::list("libraries"),
        ConfigOption::list("library_dirs"),
        ConfigOption::string("name"),
        ConfigOption::bool("release_gil"),
        ConfigOption::string("sip_file"),
        ConfigOption::string("source_suffix"),
        ConfigOption::list("sources"),
        ConfigOption::list("tags"),
        // Options given on the command line apply to every set of bindings
        // but each can have its own value in pyproject.toml.
        ConfigOption::int("concatenate")
            .help("concatenate the generated bindings into N source files")
            .metavar("N")
            .tools(COMPILING_TOOLS),
        ConfigOption::bool("debug")
            .help("build with debugging symbols")
            .tools(COMPILING_TOOLS),
        ConfigOption::bool("docstrings")
            .default(Value::Bool(true))
            .inverted()
            .help("disable the generation of docstrings")
            .tools(COMPILING_TOOLS),
        ConfigOption::string("generate_api")
            .help("generate a QScintilla .api file")
            .metavar("FILE")
            .tools(COMPILING_TOOLS),
        ConfigOption::list("generate_extracts")
            .help("generate an extract file")
            .metavar("ID:FILE")
            .tools(COMPILING_TOOLS),
        ConfigOption::bool("pep484_stubs")
            .help("generate a PEP 484 .pyi file")
            .tools(COMPILING_TOOLS),
        ConfigOption::bool("protected_is_public")
            .help("enable the protected/public hack (default on non-Windows)")
            .tools(COMPILING_TOOLS),
        ConfigOption::bool("protected_is_public")
            .inverted()
            .help("disable the protected/public hack (default on Windows)")
            .tools(COMPILING_TOOLS),
        ConfigOption::bool("tracing")
            .help("build with tracing support")
            .tools(COMPILING_TOOLS),
    ]
}

/// What was created by generating the bindings.
///
/// All paths are absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedBindings {
    /// The fully qualified name of the module.
    pub name: String,
    pub uses_limited_api: bool,
    pub pyi_file: Option<PathBuf>,
    pub define_macros: Vec<String>,
    pub sources_dir: PathBuf,
    pub sources: Vec<PathBuf>,
    pub headers: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
}

impl GeneratedBindings {
    /// The last component of the module name.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// The configuration file written next to the installed bindings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct BindingsConfiguration<'a> {
    sip_version: &'a str,
    sip_abi_version: String,
    module_tags: &'a [String],
    module_disabled_features: &'a [String],
}

/// The configuration of one extension module.
pub struct Bindings {
    options: Vec<ConfigOption>,
    values: ConfigValues,
    buildable: Option<BuildablePredicate>,
    generated: Option<GeneratedBindings>,
    sip_files: Option<Vec<PathBuf>>,
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("name", &self.name())
            .field("values", &self.values)
            .field("generated", &self.generated)
            .finish()
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Bindings::new()
    }
}

impl Bindings {
    /// Unnamed bindings, to be configured from a pyproject.toml section.
    pub fn new() -> Self {
        let options = bindings_options();
        let values = ConfigValues::new(&options);

        Bindings {
            options,
            values,
            buildable: None,
            generated: None,
            sip_files: None,
        }
    }

    /// Bindings with a name set by the program.
    pub fn named(name: &str) -> Result<Self> {
        let mut bindings = Bindings::new();
        bindings
            .values
            .set("name", Value::str(name), Origin::Program)?;
        Ok(bindings)
    }

    /// Install a predicate deciding if the bindings can be built.
    pub fn with_buildable(mut self, predicate: impl Fn(&Bindings) -> bool + 'static) -> Self {
        self.buildable = Some(Box::new(predicate));
        self
    }

    /// Configure from a `[[tool.sip.bindings]]` section.
    ///
    /// The bindings must be named, either already or by the section, before
    /// any other key is looked at.
    pub fn configure(&mut self, section: &toml::Table) -> Result<()> {
        let named_by_section =
            matches!(section.get("name"), Some(toml::Value::String(s)) if !s.is_empty());

        if !named_by_section && self.name().is_empty() {
            return Err(UserError::UndefinedOption {
                name: "name".to_string(),
                section: Some(BINDINGS_SECTION.to_string()),
            }
            .into());
        }

        merge_section(self, section)
    }

    pub fn name(&self) -> &str {
        self.values.str("name").unwrap_or("")
    }

    pub fn sip_file(&self) -> Option<&str> {
        self.values.str("sip_file")
    }

    pub fn tags(&self) -> &[String] {
        self.values.list("tags")
    }

    pub fn disabled_features(&self) -> &[String] {
        self.values.list("disabled_features")
    }

    pub fn debug(&self) -> bool {
        self.values.flag("debug")
    }

    pub fn libraries(&self) -> &[String] {
        self.values.list("libraries")
    }

    pub fn builder_settings(&self) -> &[String] {
        self.values.list("builder_settings")
    }

    /// The library directories, made absolute.
    pub fn library_dirs(&self, root_dir: &Path) -> Vec<PathBuf> {
        absolute_paths(root_dir, self.values.list("library_dirs"))
    }

    /// Whether the bindings can be built. Not asked for bindings that were
    /// explicitly enabled.
    pub fn is_buildable(&self) -> bool {
        self.buildable.as_ref().map_or(true, |predicate| predicate(self))
    }

    /// The result of the last successful `generate()`.
    pub fn generated(&self) -> Option<&GeneratedBindings> {
        self.generated.as_ref()
    }

    /// Check the configuration is complete and consistent.
    pub fn verify(&self, project: &ResolvedProject) -> Result<()> {
        if project.py_platform == "win32" {
            if self.debug() && !project.py_debug {
                return Err(UserError::new(format!(
                    "a debug version of Python must be used when building a debug version of the {} bindings",
                    self.name()
                ))
                .into());
            }

            if !self.debug() && project.py_debug {
                return Err(UserError::new(format!(
                    "a debug version of the {} bindings must be built when a debug version of Python is used",
                    self.name()
                ))
                .into());
            }
        }

        let sip_path = self.sip_path(project)?;
        if !sip_path.is_file() {
            return Err(UserError::option(
                "sip-file",
                Some(BINDINGS_SECTION),
                format!(
                    "the file '{}' for the '{}' bindings does not exist",
                    fs::relative_path(&project.root_dir, &sip_path).display(),
                    self.name()
                ),
            )
            .into());
        }

        Ok(())
    }

    fn sip_path(&self, project: &ResolvedProject) -> Result<PathBuf> {
        match self.sip_file() {
            Some(sip_file) => Ok(project.sip_files_dir.join(sip_file)),
            None => anyhow::bail!("the .sip file of the '{}' bindings has no default", self.name()),
        }
    }

    /// Generate the source code of the bindings and any optional extras.
    pub fn generate(
        &mut self,
        project: &ResolvedProject,
        generator: &dyn CodeGenerator,
    ) -> Result<()> {
        let sip_path = self.sip_path(project)?;
        let cwd = sip_path.parent().unwrap_or(&project.sip_files_dir).to_path_buf();
        let sip_file = PathBuf::from(sip_path.file_name().unwrap_or_default());

        let parsed = generator.parse(&ParseRequest {
            sip_file: &sip_file,
            cwd: &cwd,
            tags: self.tags(),
            backstops: self.values.list("backstops"),
            disabled_features: self.disabled_features(),
            protected_is_public: self.values.flag("protected_is_public"),
            include_dirs: &project.sip_include_dirs,
        })?;

        let module_name = parsed.module_name;
        let uses_limited_api = parsed.uses_limited_api && !project.py_debug;

        match project.sip_module {
            Some(_) if !module_name.contains('.') => {
                return Err(UserError::new(format!(
                    "module '{}' must be part of a project when used with a shared 'sip' module",
                    module_name
                ))
                .into());
            }
            None if uses_limited_api => {
                return Err(UserError::new(format!(
                    "module '{}' cannot use the limited API without using a shared 'sip' module",
                    module_name
                ))
                .into());
            }
            _ => {}
        }

        if self.sip_files.is_none() {
            self.sip_files = Some(parsed.sip_files);
        }

        let sources_dir = project.build_dir.join(self.name());
        fs::ensure_dir(&sources_dir)?;

        let base_name = module_name.rsplit('.').next().unwrap_or(&module_name).to_string();

        let api_file = match (self.values.str("generate_api"), &project.api_dir) {
            (Some(file), _) => Some(project.root_dir.join(file)),
            (None, Some(api_dir)) => Some(api_dir.join(format!("{}.api", self.name()))),
            (None, None) => None,
        };
        if let Some(api_file) = api_file {
            generator.generate_api(&parsed.spec, &api_file)?;
        }

        let extracts = self.values.list("generate_extracts");
        if !extracts.is_empty() {
            let extracts: Vec<String> = extracts
                .iter()
                .map(|extract| match extract.split_once(':') {
                    Some((id, file)) => {
                        format!("{}:{}", id, project.root_dir.join(file).display())
                    }
                    None => extract.clone(),
                })
                .collect();
            generator.generate_extracts(&parsed.spec, &extracts)?;
        }

        let pyi_file = if self.values.flag("pep484_stubs") {
            let pyi_file = sources_dir.join(format!("{}.pyi", base_name));
            generator.generate_type_hints(&parsed.spec, &pyi_file)?;
            Some(pyi_file)
        } else {
            None
        };

        let code = generator.generate_code(
            &parsed.spec,
            &CodeOptions {
                sources_dir: &sources_dir,
                source_suffix: self.values.str("source_suffix").filter(|s| !s.is_empty()),
                exceptions: self.values.flag("exceptions"),
                tracing: self.values.flag("tracing"),
                release_gil: self.values.flag("release_gil"),
                concatenate: self.values.int("concatenate"),
                docstrings: self.values.flag("docstrings"),
                py_debug: project.py_debug,
                sip_module: project.sip_module.as_deref(),
                warnings: project.warnings,
                warnings_are_errors: project.warnings_are_errors,
            },
        )?;

        let mut headers = vec![code.header];
        headers.extend(absolute_paths(&project.root_dir, self.values.list("headers")));

        let mut sources = code.sources;
        let mut include_dirs = vec![sources_dir.clone()];

        if project.sip_module.is_some() {
            // sip.h is installed in the build directory.
            include_dirs.push(project.build_dir.clone());
        } else {
            sources.extend(project.module_sources.copy_nonshared_sources(
                project.abi_version,
                &base_name,
                &sources_dir,
            )?);
        }

        include_dirs.extend(absolute_paths(&project.root_dir, self.values.list("include_dirs")));
        sources.extend(absolute_paths(&project.root_dir, self.values.list("sources")));

        let mut define_macros = Vec::new();
        if self.values.flag("protected_is_public") {
            define_macros.push("SIP_PROTECTED_IS_PUBLIC".to_string());
            define_macros.push("protected=public".to_string());
        }
        if uses_limited_api {
            define_macros.push("Py_LIMITED_API=0x03040000".to_string());
        }
        define_macros.extend(self.values.list("define_macros").iter().cloned());

        self.generated = Some(GeneratedBindings {
            name: module_name,
            uses_limited_api,
            pyi_file,
            define_macros,
            sources_dir,
            sources,
            headers,
            include_dirs,
        });

        Ok(())
    }

    /// The .sip files that define the bindings, relative to the project root.
    pub fn sip_files(
        &mut self,
        project: &ResolvedProject,
        generator: &dyn CodeGenerator,
    ) -> Result<Vec<PathBuf>> {
        if project.sip_module.is_some() {
            let dir = project.sip_files_dir.join(self.name());
            if !dir.is_dir() {
                return Ok(Vec::new());
            }
            return fs::walk_files(&dir, &project.root_dir);
        }

        let sip_files = match self.sip_files.clone() {
            Some(sip_files) => sip_files,
            None => {
                let sip_path = self.sip_path(project)?;
                let cwd = sip_path.parent().unwrap_or(&project.sip_files_dir).to_path_buf();
                let sip_file = PathBuf::from(sip_path.file_name().unwrap_or_default());

                let parsed = generator.parse(&ParseRequest {
                    sip_file: &sip_file,
                    cwd: &cwd,
                    tags: self.tags(),
                    backstops: self.values.list("backstops"),
                    disabled_features: self.disabled_features(),
                    protected_is_public: self.values.flag("protected_is_public"),
                    include_dirs: &project.sip_include_dirs,
                })?;
                self.sip_files = Some(parsed.sip_files.clone());
                parsed.sip_files
            }
        };

        let root_dir = fs::normalize_path(&project.root_dir);
        let mut relative = Vec::with_capacity(sip_files.len());

        for file in sip_files {
            let file = fs::normalize_path(&file);
            if !file.starts_with(&root_dir) {
                return Err(UserError::new(format!(
                    "the .sip files that define the bindings must all be in the '{}' directory or a sub-directory",
                    root_dir.display()
                ))
                .into());
            }
            relative.push(fs::relative_path(&root_dir, &file));
        }

        Ok(relative)
    }

    /// The filename extension of the built module.
    pub fn module_extension(&self, project: &ResolvedProject) -> String {
        if project.py_platform == "win32" {
            return ".pyd".to_string();
        }

        if self.generated.as_ref().is_some_and(|g| g.uses_limited_api) {
            return ".abi3.so".to_string();
        }

        project
            .ext_suffix
            .clone()
            .unwrap_or_else(|| ".so".to_string())
    }

    /// Write the configuration of the bindings to
    /// `<bindings_dir>/<name>/<name>.toml` and return its name.
    pub fn write_configuration(
        &self,
        bindings_dir: &Path,
        project: &ResolvedProject,
    ) -> Result<PathBuf> {
        let config_file = bindings_dir
            .join(self.name())
            .join(format!("{}.toml", self.name()));

        let configuration = BindingsConfiguration {
            sip_version: crate::VERSION,
            sip_abi_version: project.abi_version.to_string(),
            module_tags: self.tags(),
            module_disabled_features: self.disabled_features(),
        };

        let body = toml::to_string(&configuration)?;
        fs::write_string(
            &config_file,
            &format!(
                "# Automatically generated configuration for '{}'.\n\n{}",
                self.name(),
                body
            ),
        )?;

        Ok(config_file)
    }
}

fn absolute_paths(root_dir: &Path, paths: &[String]) -> Vec<PathBuf> {
    paths.iter().map(|p| root_dir.join(p)).collect()
}

impl Configurable for Bindings {
    fn section(&self) -> &'static str {
        BINDINGS_SECTION
    }

    fn options(&self) -> &[ConfigOption] {
        &self.options
    }

    fn values(&self) -> &ConfigValues {
        &self.values
    }

    fn values_mut(&mut self) -> &mut ConfigValues {
        &mut self.values
    }

    fn default_steps(&self) -> Vec<DefaultStep> {
        vec![
            DefaultStep::user("protected_is_public", &[], |env, _| {
                let platform = env
                    .project
                    .and_then(|p| p.str("py_platform"))
                    .map(str::to_string)
                    .unwrap_or_else(|| env.python.platform());
                Some(Value::Bool(platform != "win32"))
            }),
            DefaultStep::user("sip_file", &["name"], |env, values| {
                let name = values.str("name")?;
                let shared = env.project.and_then(|p| p.str("sip_module")).is_some();
                let file = if shared {
                    format!("{}/{}.sip", name, name)
                } else {
                    format!("{}.sip", name)
                };
                Some(Value::Str(file))
            }),
        ]
    }
}

/// The bindings of a project, keyed by name in declaration order.
#[derive(Debug, Default)]
pub struct BindingsSet {
    bindings: IndexMap<String, Bindings>,

    /// Every name ever inserted, including bindings since removed by `resolve`.
    declared: IndexSet<String>,
}

impl BindingsSet {
    pub fn new() -> Self {
        BindingsSet::default()
    }

    /// Add a set of bindings. The name must be set and unique.
    pub fn insert(&mut self, bindings: Bindings) -> Result<()> {
        let name = bindings.name().to_string();

        if name.is_empty() {
            return Err(UserError::UndefinedOption {
                name: "name".to_string(),
                section: Some(BINDINGS_SECTION.to_string()),
            }
            .into());
        }

        if self.declared.contains(&name) {
            return Err(UserError::option(
                "name",
                Some(BINDINGS_SECTION),
                format!("the '{}' bindings are defined more than once", name),
            )
            .into());
        }

        self.declared.insert(name.clone());
        self.bindings.insert(name, bindings);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Bindings> {
        self.bindings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Bindings> {
        self.bindings.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bindings> {
        self.bindings.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Bindings> {
        self.bindings.values_mut()
    }

    /// Apply the explicitly enabled or disabled bindings.
    ///
    /// Enabled bindings restrict the set to exactly those and are assumed to
    /// be buildable. Otherwise disabled bindings are removed. With neither,
    /// any bindings that say they are not buildable are removed. Names are
    /// checked against everything declared so resolving again is a no-op.
    pub fn resolve(&mut self, enable: &[String], disable: &[String]) -> Result<(), UserError> {
        if !enable.is_empty() {
            if let Some(unknown) = enable.iter().find(|n| !self.declared.contains(*n)) {
                return Err(UserError::UnknownEnabledBindings(unknown.clone()));
            }
            self.bindings.retain(|name, _| enable.contains(name));
        } else if !disable.is_empty() {
            if let Some(unknown) = disable.iter().find(|n| !self.declared.contains(*n)) {
                return Err(UserError::UnknownDisabledBindings(unknown.clone()));
            }
            self.bindings.retain(|name, _| !disable.contains(name));
        } else {
            self.bindings.retain(|_, bindings| bindings.is_buildable());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::testing::StubGenerator;
    use crate::core::project::test_project;
    use tempfile::TempDir;

    fn set(names: &[&str]) -> BindingsSet {
        let mut set = BindingsSet::new();
        for name in names {
            set.insert(Bindings::named(name).unwrap()).unwrap();
        }
        set
    }

    fn names(set: &BindingsSet) -> Vec<&str> {
        set.names().collect()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_enable_restricts() {
        let mut bindings = set(&["a", "b", "c"]);
        bindings.resolve(&strings(&["a"]), &[]).unwrap();
        assert_eq!(names(&bindings), vec!["a"]);

        bindings.resolve(&strings(&["a"]), &[]).unwrap();
        assert_eq!(names(&bindings), vec!["a"]);
    }

    #[test]
    fn test_disable_removes() {
        let mut bindings = set(&["a", "b", "c"]);
        bindings.resolve(&[], &strings(&["b"])).unwrap();
        assert_eq!(names(&bindings), vec!["a", "c"]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut bindings = set(&["a", "b", "c"]);
        bindings.resolve(&[], &strings(&["b"])).unwrap();
        bindings.resolve(&[], &strings(&["b"])).unwrap();
        assert_eq!(names(&bindings), vec!["a", "c"]);

        let mut bindings = set(&["a", "b", "c"]);
        bindings.resolve(&strings(&["a", "c"]), &[]).unwrap();
        bindings.resolve(&strings(&["a", "c"]), &[]).unwrap();
        assert_eq!(names(&bindings), vec!["a", "c"]);
    }

    #[test]
    fn test_removed_name_cannot_be_redeclared() {
        let mut bindings = set(&["a", "b"]);
        bindings.resolve(&[], &strings(&["b"])).unwrap();
        assert!(bindings.insert(Bindings::named("b").unwrap()).is_err());
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let mut bindings = set(&["a", "b"]);

        let err = bindings.resolve(&strings(&["x"]), &[]).unwrap_err();
        assert_eq!(err.to_string(), "unknown enabled bindings 'x'");

        let err = bindings.resolve(&[], &strings(&["y"])).unwrap_err();
        assert_eq!(err.to_string(), "unknown disabled bindings 'y'");

        assert_eq!(names(&bindings), vec!["a", "b"]);
    }

    #[test]
    fn test_unbuildable_bindings_are_removed_unless_enabled() {
        let build = || {
            let mut set = BindingsSet::new();
            set.insert(Bindings::named("a").unwrap()).unwrap();
            set.insert(Bindings::named("b").unwrap().with_buildable(|_| false))
                .unwrap();
            set
        };

        let mut bindings = build();
        bindings.resolve(&[], &[]).unwrap();
        assert_eq!(names(&bindings), vec!["a"]);

        let mut bindings = build();
        bindings.resolve(&strings(&["b"]), &[]).unwrap();
        assert_eq!(names(&bindings), vec!["b"]);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut bindings = set(&["a"]);
        assert!(bindings.insert(Bindings::named("a").unwrap()).is_err());
    }

    #[test]
    fn test_section_without_name_fails_first() {
        let mut bindings = Bindings::new();
        let section: toml::Table = toml::from_str("bogus-key = 1\n").unwrap();

        let err = bindings.configure(&section).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'tool.sip.bindings.name': must be defined"
        );
    }

    #[test]
    fn test_section_configures_named_bindings() {
        let mut bindings = Bindings::named("QtCore").unwrap();
        let section: toml::Table =
            toml::from_str("tags = [\"Qt_6_7_0\"]\nrelease-gil = true\n").unwrap();

        bindings.configure(&section).unwrap();
        assert_eq!(bindings.tags(), &["Qt_6_7_0".to_string()]);
        assert!(bindings.values().flag("release_gil"));
    }

    fn project_with_sip(
        tmp: &TempDir,
        sip_module: Option<&str>,
        files: &[(&str, &str)],
    ) -> ResolvedProject {
        for (name, content) in files {
            let path = tmp.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let mut project = test_project(tmp.path());
        project.sip_module = sip_module.map(str::to_string);
        project
    }

    fn named_with_file(name: &str, sip_file: &str) -> Bindings {
        let mut bindings = Bindings::named(name).unwrap();
        bindings
            .values_mut()
            .set("sip_file", Value::str(sip_file), Origin::Program)
            .unwrap();
        bindings
    }

    #[test]
    fn test_verify_requires_existing_sip_file() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(&tmp, None, &[]);

        let err = named_with_file("spam", "spam.sip").verify(&project).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'tool.sip.bindings.sip-file': the file 'spam.sip' for the 'spam' bindings does not exist"
        );
    }

    #[test]
    fn test_verify_windows_debug_pairing() {
        let tmp = TempDir::new().unwrap();
        let mut project = project_with_sip(&tmp, None, &[("spam.sip", "%Module(name=spam)\n")]);
        project.py_platform = "win32".to_string();

        let mut bindings = named_with_file("spam", "spam.sip");
        bindings
            .values_mut()
            .set("debug", Value::Bool(true), Origin::CommandLine)
            .unwrap();
        assert!(bindings.verify(&project).is_err());

        project.py_debug = true;
        assert!(bindings.verify(&project).is_ok());

        project.py_platform = "linux".to_string();
        project.py_debug = false;
        assert!(bindings.verify(&project).is_ok());
    }

    #[test]
    fn test_generate_without_shared_module() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(&tmp, None, &[("spam.sip", "%Module(name=spam)\n")]);

        let mut bindings = named_with_file("spam", "spam.sip");
        bindings
            .values_mut()
            .set("protected_is_public", Value::Bool(true), Origin::UserDefault)
            .unwrap();
        bindings
            .values_mut()
            .set("define_macros", Value::list(["SPAM=1"]), Origin::Program)
            .unwrap();

        bindings.generate(&project, &StubGenerator).unwrap();

        let generated = bindings.generated().unwrap();
        assert_eq!(generated.name, "spam");
        assert_eq!(generated.sources_dir, project.build_dir.join("spam"));
        assert_eq!(
            generated.define_macros,
            strings(&["SIP_PROTECTED_IS_PUBLIC", "protected=public", "SPAM=1"])
        );
        assert!(generated.headers[0].ends_with("sipAPIspam.h"));
        assert_eq!(generated.include_dirs, vec![generated.sources_dir.clone()]);
        assert_eq!(bindings.module_extension(&project), ".so");
    }

    #[test]
    fn test_generate_limited_api_requires_shared_module() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(
            &tmp,
            None,
            &[("spam.sip", "%Module(name=spam, use_limited_api=True)\n")],
        );

        let err = named_with_file("spam", "spam.sip")
            .generate(&project, &StubGenerator)
            .unwrap_err();
        assert!(err.to_string().contains("cannot use the limited API"));
    }

    #[test]
    fn test_generate_shared_module_requires_package() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(
            &tmp,
            Some("spam.sip"),
            &[("spam/spam.sip", "%Module(name=spam)\n")],
        );

        let err = named_with_file("spam", "spam/spam.sip")
            .generate(&project, &StubGenerator)
            .unwrap_err();
        assert!(err.to_string().contains("must be part of a project"));
    }

    #[test]
    fn test_generate_limited_api_with_shared_module() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(
            &tmp,
            Some("spam.sip"),
            &[("core/core.sip", "%Module(name=spam.core, use_limited_api=True)\n")],
        );

        let mut bindings = named_with_file("core", "core/core.sip");
        bindings.generate(&project, &StubGenerator).unwrap();

        let generated = bindings.generated().unwrap();
        assert!(generated.uses_limited_api);
        assert!(generated
            .define_macros
            .contains(&"Py_LIMITED_API=0x03040000".to_string()));
        assert!(generated.include_dirs.contains(&project.build_dir));
        assert_eq!(bindings.module_extension(&project), ".abi3.so");
    }

    #[test]
    fn test_pep484_stubs_are_recorded() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(&tmp, None, &[("spam.sip", "%Module(name=spam)\n")]);

        let mut bindings = named_with_file("spam", "spam.sip");
        bindings
            .values_mut()
            .set("pep484_stubs", Value::Bool(true), Origin::CommandLine)
            .unwrap();
        bindings.generate(&project, &StubGenerator).unwrap();

        let pyi = bindings.generated().unwrap().pyi_file.clone().unwrap();
        assert!(pyi.ends_with("spam.pyi"));
        assert!(pyi.exists());
    }

    #[test]
    fn test_sip_files_with_shared_module_walk_the_directory() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(
            &tmp,
            Some("spam.sip"),
            &[
                ("core/core.sip", "%Module(name=spam.core)\n"),
                ("core/extra.sip", ""),
            ],
        );

        let mut bindings = named_with_file("core", "core/core.sip");
        let files = bindings.sip_files(&project, &StubGenerator).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("core/core.sip"), PathBuf::from("core/extra.sip")]
        );
    }

    #[test]
    fn test_sip_files_without_shared_module_are_parsed() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(
            &tmp,
            None,
            &[
                ("spam.sip", "%Module(name=spam)\n%Include eggs.sip\n"),
                ("eggs.sip", ""),
            ],
        );

        let mut bindings = named_with_file("spam", "spam.sip");
        let files = bindings.sip_files(&project, &StubGenerator).unwrap();
        assert_eq!(files, vec![PathBuf::from("spam.sip"), PathBuf::from("eggs.sip")]);
    }

    #[test]
    fn test_write_configuration() {
        let tmp = TempDir::new().unwrap();
        let project = project_with_sip(&tmp, None, &[]);

        let mut bindings = Bindings::named("QtCore").unwrap();
        bindings
            .values_mut()
            .set("tags", Value::list(["Qt_6_7_0"]), Origin::Program)
            .unwrap();

        let file = bindings
            .write_configuration(&tmp.path().join("bindings"), &project)
            .unwrap();
        assert_eq!(file, tmp.path().join("bindings/QtCore/QtCore.toml"));

        let content = std::fs::read_to_string(file).unwrap();
        assert!(content.starts_with("# Automatically generated configuration for 'QtCore'."));

        let parsed: toml::Table = toml::from_str(&content).unwrap();
        assert_eq!(parsed["sip-abi-version"].as_str(), Some("13.8"));
        assert_eq!(parsed["module-tags"].as_array().unwrap().len(), 1);
        assert!(parsed["module-disabled-features"].as_array().unwrap().is_empty());
    }
}
