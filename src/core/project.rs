//! The project: one builder and the bindings it builds.
//!
//! A [`Project`] is mutable while it is being configured. Once verified it
//! produces a [`ResolvedProject`] that generation and building read from.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::builder::{Builder, BuilderRegistry, DEFAULT_BUILDER};
use crate::core::abi::{add_sip_module_requirement, resolve_abi_version, AbiVersion, ModuleSources};
use crate::core::bindings::{Bindings, BindingsSet};
use crate::core::configurable::{
    apply_defaults, merge_section, trace_values, Configurable, DefaultPass, DefaultStep,
    DefaultsEnv,
};
use crate::core::option::{ConfigOption, ConfigValues, Tool, Value, COMPILING_TOOLS};
use crate::core::pyproject::{
    Metadata, PyProject, BINDINGS_SECTION, BUILDER_SECTION, PROJECT_SECTION,
};
use crate::core::python::{PythonProbe, FIRST_SUPPORTED_MINOR, LAST_SUPPORTED_MINOR};
use crate::util::errors::UserError;
use crate::util::fs::BuildDir;

/// The options of a project.
pub fn project_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption::string("abi_version"),
        // The registered name of the builder.
        ConfigOption::string("builder"),
        ConfigOption::list("console_scripts"),
        ConfigOption::bool("dunder_init").default(Value::Bool(true)),
        ConfigOption::bool("py_debug"),
        ConfigOption::string("py_include_dir"),
        ConfigOption::string("py_platform"),
        ConfigOption::int("py_major_version"),
        ConfigOption::int("py_minor_version"),
        // With a shared sip module each set of bindings is in its own
        // sub-directory.
        ConfigOption::string("sip_files_dir"),
        // Glob patterns relative to the project directory.
        ConfigOption::list("sdist_excludes"),
        ConfigOption::list("sip_include_dirs"),
        ConfigOption::string("sip_module"),
        ConfigOption::bool("warnings"),
        ConfigOption::bool("warnings_are_errors"),
        ConfigOption::bool("quiet").help("disable all progress messages"),
        ConfigOption::bool("verbose").help("enable verbose progress messages"),
        ConfigOption::string("name")
            .help("the name used in sdist and wheel file names")
            .metavar("NAME")
            .tools(&[Tool::Sdist, Tool::Wheel]),
        ConfigOption::string("build_dir")
            .help("the build directory")
            .metavar("DIR"),
        ConfigOption::string("target_dir")
            .help("the target installation directory")
            .metavar("DIR")
            .tools(&[Tool::Install]),
        ConfigOption::string("api_dir")
            .help("generate a QScintilla .api file in DIR")
            .metavar("DIR")
            .tools(COMPILING_TOOLS),
    ]
}

/// The options that only make sense with more than one set of bindings.
pub fn multibindings_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption::list("disable")
            .help("disable the NAME bindings")
            .metavar("NAME")
            .tools(COMPILING_TOOLS),
        ConfigOption::list("enable")
            .help("enable the NAME bindings")
            .metavar("NAME")
            .tools(COMPILING_TOOLS),
    ]
}

/// Customisation of a project by the program embedding the library.
pub trait ProjectHooks {
    /// Bindings to create before pyproject.toml is read. A
    /// `[[tool.sip.bindings]]` section with the same name configures them
    /// further.
    fn bindings(&self, _metadata: &Metadata) -> Result<Vec<Bindings>> {
        Ok(Vec::new())
    }

    /// Called once, after defaults are applied and the build directory has
    /// been created but before anything is verified.
    fn update(&self, _project: &mut Project, _tool: Tool) -> Result<()> {
        Ok(())
    }
}

/// A project without customisation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ProjectHooks for NoHooks {}

/// The project's own options and values.
#[derive(Debug)]
struct Settings {
    options: Vec<ConfigOption>,
    values: ConfigValues,
}

impl Settings {
    fn new() -> Self {
        let mut options = project_options();
        options.extend(multibindings_options());
        let values = ConfigValues::new(&options);

        Settings { options, values }
    }
}

impl Configurable for Settings {
    fn section(&self) -> &'static str {
        PROJECT_SECTION
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
        project_default_steps()
    }
}

fn project_default_steps() -> Vec<DefaultStep> {
    vec![
        DefaultStep::internal("py_major_version", &[], |env, _| {
            env.python.target().map(|t| Value::Int(t.major.into()))
        }),
        DefaultStep::internal("py_minor_version", &[], |env, _| {
            env.python.target().map(|t| Value::Int(t.minor.into()))
        }),
        DefaultStep::internal("py_platform", &[], |env, _| Some(Value::Str(env.python.platform()))),
        DefaultStep::internal("py_debug", &[], |env, _| {
            Some(Value::Bool(env.python.target().is_some_and(|t| t.debug)))
        }),
        DefaultStep::internal("py_include_dir", &[], |env, _| {
            env.python
                .target()
                .and_then(|t| t.include_dir.as_ref())
                .map(|dir| Value::str(dir.display().to_string()))
        }),
        DefaultStep::user("name", &[], |env, _| Some(Value::str(env.metadata.name.clone()))),
        // The build tool keeps its build directory. Everything else uses a
        // temporary one in case the project directory is read-only.
        DefaultStep::user("build_dir", &[], |env, _| {
            (env.tool == Tool::Build).then(|| Value::str("build"))
        }),
        DefaultStep::user("target_dir", &[], |env, _| {
            env.python
                .target()
                .and_then(|t| t.platlib.as_ref())
                .map(|dir| Value::str(dir.display().to_string()))
        }),
        DefaultStep::user("sip_files_dir", &[], |env, _| {
            Some(Value::str(env.root_dir.display().to_string()))
        }),
    ]
}

/// A project being configured.
pub struct Project {
    root_dir: PathBuf,
    metadata: Metadata,
    settings: Settings,
    builder: Box<dyn Builder>,
    bindings: BindingsSet,
    python: PythonProbe,
    module_sources: ModuleSources,
    build_dir: Option<BuildDir>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("root_dir", &self.root_dir)
            .field("metadata", &self.metadata)
            .field("values", &self.settings.values)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl Project {
    /// Load the project in a directory from its pyproject.toml.
    pub fn load(
        root_dir: &Path,
        registry: &BuilderRegistry,
        hooks: &dyn ProjectHooks,
    ) -> Result<Self> {
        let pyproject = PyProject::load(root_dir)?;
        Self::from_pyproject(root_dir, &pyproject, registry, hooks)
    }

    /// Create the project, its builder and its bindings from the sections of
    /// a pyproject.toml.
    pub fn from_pyproject(
        root_dir: &Path,
        pyproject: &PyProject,
        registry: &BuilderRegistry,
        hooks: &dyn ProjectHooks,
    ) -> Result<Self> {
        let metadata = pyproject.metadata()?;

        let mut settings = Settings::new();
        if let Some(section) = pyproject.section(PROJECT_SECTION)? {
            merge_section(&mut settings, section)?;
        }

        let builder_name = settings
            .values
            .str("builder")
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_BUILDER);
        let mut builder = registry.create(builder_name)?;
        debug!("using the '{}' builder", builder_name);

        if let Some(section) = pyproject.section(BUILDER_SECTION)? {
            merge_section(builder.as_mut(), section)?;
        }

        let mut bindings = BindingsSet::new();
        for predeclared in hooks.bindings(&metadata)? {
            bindings.insert(predeclared)?;
        }

        let mut configured: Vec<String> = Vec::new();
        for section in pyproject.bindings_sections()? {
            let name = section.get("name").and_then(|v| v.as_str()).unwrap_or("");

            if !name.is_empty() && configured.iter().any(|c| c == name) {
                return Err(UserError::option(
                    "name",
                    Some(BINDINGS_SECTION),
                    format!("the '{}' bindings are defined more than once", name),
                )
                .into());
            }

            match bindings.get_mut(name) {
                Some(existing) => existing.configure(section)?,
                None => {
                    let mut new = Bindings::new();
                    new.configure(section)?;
                    bindings.insert(new)?;
                }
            }

            configured.push(name.to_string());
        }

        if bindings.is_empty() {
            bindings.insert(Bindings::named(&metadata.name)?)?;
        }

        Ok(Project {
            root_dir: root_dir.to_path_buf(),
            metadata,
            settings,
            builder,
            bindings,
            python: PythonProbe::new(),
            module_sources: ModuleSources::from_env(),
            build_dir: None,
        })
    }

    /// Use a particular Python probe instead of searching for an interpreter.
    pub fn with_python(mut self, python: PythonProbe) -> Self {
        self.python = python;
        self
    }

    pub fn with_module_sources(mut self, module_sources: ModuleSources) -> Self {
        self.module_sources = module_sources;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn builder(&self) -> &dyn Builder {
        self.builder.as_ref()
    }

    pub fn builder_mut(&mut self) -> &mut dyn Builder {
        self.builder.as_mut()
    }

    pub fn bindings(&self) -> &BindingsSet {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut BindingsSet {
        &mut self.bindings
    }

    /// The builder and the bindings together, for generating and building.
    pub fn parts_mut(&mut self) -> (&dyn Builder, &mut BindingsSet) {
        (self.builder.as_ref(), &mut self.bindings)
    }

    /// The build directory, once it has been created.
    pub fn build_dir(&self) -> Option<&Path> {
        self.build_dir.as_ref().map(BuildDir::path)
    }

    /// Apply both defaulting passes to the project, select the bindings to
    /// build, then apply the defaults of the builder and bindings.
    pub fn apply_defaults(&mut self, tool: Tool) -> Result<()> {
        let env = DefaultsEnv {
            tool,
            root_dir: &self.root_dir,
            python: &self.python,
            metadata: &self.metadata,
            project: None,
        };

        apply_defaults(&mut self.settings, DefaultPass::Internal, &env)?;
        apply_defaults(&mut self.settings, DefaultPass::User, &env)?;

        let enable = self.settings.values.list("enable").to_vec();
        let disable = self.settings.values.list("disable").to_vec();
        self.bindings.resolve(&enable, &disable)?;

        let env = DefaultsEnv {
            project: Some(&self.settings.values),
            ..env
        };

        apply_defaults(self.builder.as_mut(), DefaultPass::Internal, &env)?;
        apply_defaults(self.builder.as_mut(), DefaultPass::User, &env)?;

        for bindings in self.bindings.iter_mut() {
            apply_defaults(bindings, DefaultPass::Internal, &env)?;
            apply_defaults(bindings, DefaultPass::User, &env)?;
        }

        trace_values(&self.settings, "project");
        trace_values(self.builder.as_ref(), "builder");
        for bindings in self.bindings.iter() {
            trace_values(bindings, bindings.name());
        }

        Ok(())
    }

    /// Create a fresh build directory for the action.
    pub fn create_build_dir(&mut self) -> Result<&Path> {
        let build_dir = match self.settings.values.str("build_dir") {
            Some(dir) => BuildDir::persistent(&self.root_dir.join(dir))?,
            None => BuildDir::temporary()?,
        };
        debug!("build directory is {}", build_dir.path().display());

        Ok(self.build_dir.insert(build_dir).path())
    }

    /// Give up the build directory at the end of an action. A temporary
    /// directory is removed after success and kept after a failure.
    pub fn release_build_dir(&mut self, succeeded: bool) -> Result<()> {
        let Some(build_dir) = self.build_dir.take() else {
            return Ok(());
        };

        if succeeded {
            build_dir.release()
        } else {
            let kept = build_dir.abandon();
            debug!("the build directory {} has been kept", kept.display());
            Ok(())
        }
    }

    /// Check the configuration is complete and consistent and freeze it.
    pub fn verify(&self, tool: Tool) -> Result<ResolvedProject> {
        let values = &self.settings.values;

        let py_major = values.int("py_major_version");
        let py_minor = values.int("py_minor_version");

        match (py_major, py_minor) {
            (Some(major), Some(minor)) => {
                let supported = major == 3
                    && minor >= i64::from(FIRST_SUPPORTED_MINOR)
                    && minor <= i64::from(LAST_SUPPORTED_MINOR);
                if !supported {
                    let message = format!("Python v{}.{} is not supported", major, minor);
                    return Err(UserError::new(message).into());
                }
            }
            _ if tool != Tool::Sdist => {
                return Err(UserError::with_detail(
                    "unable to determine the version of the target Python",
                    "set 'py-major-version' and 'py-minor-version' in [tool.sip.project] or make a Python interpreter available",
                )
                .into());
            }
            _ => {}
        }

        let installed = self.module_sources.installed()?;
        let abi_version =
            resolve_abi_version(values.str("abi_version").unwrap_or(""), true, &installed)?;

        let sip_module = values.str("sip_module").filter(|s| !s.is_empty()).map(str::to_string);

        if self.bindings.len() > 1 && sip_module.is_none() {
            return Err(UserError::option(
                "sip-module",
                Some(PROJECT_SECTION),
                "must be defined when the project contains multiple sets of bindings",
            )
            .into());
        }

        let mut metadata = self.metadata.clone();
        if let Some(ref sip_module) = sip_module {
            add_sip_module_requirement(&mut metadata.requires_dist, sip_module, abi_version);

            if let Some(version) = self.module_sources.sip_module_version(abi_version)? {
                debug!("the {} module will be v{}", sip_module, version);
            }
        }

        let build_dir = self
            .build_dir()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow::anyhow!("the build directory has not been created"))?;

        let target = self.python.target();
        let path_value = |name: &str| {
            values
                .str(name)
                .filter(|s| !s.is_empty())
                .map(|s| self.root_dir.join(s))
        };

        let resolved = ResolvedProject {
            tool,
            root_dir: self.root_dir.clone(),
            build_dir,
            name: values.str("name").unwrap_or(self.metadata.name.as_str()).to_string(),
            metadata,
            abi_version,
            sip_module,
            module_sources: self.module_sources.clone(),
            sip_files_dir: path_value("sip_files_dir").unwrap_or_else(|| self.root_dir.clone()),
            sip_include_dirs: values
                .list("sip_include_dirs")
                .iter()
                .map(|d| self.root_dir.join(d))
                .collect(),
            api_dir: path_value("api_dir"),
            target_dir: path_value("target_dir"),
            py_platform: values.str("py_platform").unwrap_or_default().to_string(),
            py_debug: values.flag("py_debug"),
            py_major_version: py_major.unwrap_or(3) as u32,
            py_minor_version: py_minor.unwrap_or(0) as u32,
            py_include_dir: values.str("py_include_dir").map(PathBuf::from),
            py_library_dir: target.and_then(|t| t.library_dir.clone()),
            ext_suffix: target.and_then(|t| t.ext_suffix.clone()),
            platform_tag: target.and_then(|t| t.platform_tag.clone()),
            console_scripts: values.list("console_scripts").to_vec(),
            dunder_init: values.flag("dunder_init"),
            sdist_excludes: values.list("sdist_excludes").to_vec(),
            warnings: values.flag("warnings"),
            warnings_are_errors: values.flag("warnings_are_errors"),
            verbose: values.flag("verbose"),
            quiet: values.flag("quiet"),
        };

        self.builder.verify(&resolved)?;

        for bindings in self.bindings.iter() {
            bindings.verify(&resolved)?;
        }

        Ok(resolved)
    }
}

impl Configurable for Project {
    fn section(&self) -> &'static str {
        PROJECT_SECTION
    }

    fn options(&self) -> &[ConfigOption] {
        &self.settings.options
    }

    fn values(&self) -> &ConfigValues {
        &self.settings.values
    }

    fn values_mut(&mut self) -> &mut ConfigValues {
        &mut self.settings.values
    }

    fn default_steps(&self) -> Vec<DefaultStep> {
        project_default_steps()
    }
}

/// The verified configuration of a project.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub tool: Tool,
    pub root_dir: PathBuf,
    pub build_dir: PathBuf,
    /// The name used in sdist and wheel file names.
    pub name: String,
    /// The metadata, including any requirement on the sip module.
    pub metadata: Metadata,
    pub abi_version: AbiVersion,
    pub sip_module: Option<String>,
    pub module_sources: ModuleSources,
    pub sip_files_dir: PathBuf,
    pub sip_include_dirs: Vec<PathBuf>,
    pub api_dir: Option<PathBuf>,
    pub target_dir: Option<PathBuf>,
    pub py_platform: String,
    pub py_debug: bool,
    pub py_major_version: u32,
    pub py_minor_version: u32,
    pub py_include_dir: Option<PathBuf>,
    pub py_library_dir: Option<PathBuf>,
    pub ext_suffix: Option<String>,
    pub platform_tag: Option<String>,
    pub console_scripts: Vec<String>,
    pub dunder_init: bool,
    pub sdist_excludes: Vec<String>,
    pub warnings: bool,
    pub warnings_are_errors: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl ResolvedProject {
    /// Where the bindings configuration files are installed, relative to the
    /// target directory. Only projects with a shared sip module have one.
    pub fn bindings_dir(&self) -> Option<PathBuf> {
        let sip_module = self.sip_module.as_ref()?;

        let mut parts: Vec<&str> = sip_module.split('.').collect();
        if let Some(last) = parts.last_mut() {
            *last = "bindings";
        }

        Some(parts.iter().collect())
    }

    /// The name of the .dist-info directory.
    pub fn distinfo_name(&self) -> String {
        format!("{}-{}.dist-info", self.name.replace('-', "_"), self.metadata.version)
    }

    /// The contents of the `__init__.py` to install.
    pub fn dunder_init_content(&self) -> &'static str {
        ""
    }

    /// Report progress unless progress messages are disabled.
    pub fn progress(&self, message: &str) {
        if self.quiet {
            return;
        }

        if message.ends_with('.') {
            info!("{}", message);
        } else {
            info!("{}...", message);
        }
    }

    /// The progress message naming the bindings that will be built.
    pub fn bindings_message(bindings: &BindingsSet) -> String {
        let names: Vec<&str> = bindings.names().collect();
        format!("These bindings will be built: {}.", names.join(", "))
    }
}

#[cfg(test)]
pub(crate) fn test_project(root_dir: &Path) -> ResolvedProject {
    ResolvedProject {
        tool: Tool::Build,
        root_dir: root_dir.to_path_buf(),
        build_dir: root_dir.join("build"),
        name: "spam".to_string(),
        metadata: Metadata {
            name: "spam".to_string(),
            version: "1.0".to_string(),
            ..Metadata::default()
        },
        abi_version: AbiVersion::new(13, 8),
        sip_module: None,
        module_sources: ModuleSources::builtin(),
        sip_files_dir: root_dir.to_path_buf(),
        sip_include_dirs: Vec::new(),
        api_dir: None,
        target_dir: None,
        py_platform: "linux".to_string(),
        py_debug: false,
        py_major_version: 3,
        py_minor_version: 12,
        py_include_dir: None,
        py_library_dir: None,
        ext_suffix: None,
        platform_tag: None,
        console_scripts: Vec::new(),
        dunder_init: true,
        sdist_excludes: Vec::new(),
        warnings: false,
        warnings_are_errors: false,
        verbose: false,
        quiet: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::option::Origin;
    use crate::core::python::test_target;
    use tempfile::TempDir;

    const SINGLE: &str = r#"
[project]
name = "spam"
version = "1.2"

[tool.sip.project]
py-major-version = 3
py-minor-version = 11
"#;

    fn write_project(tmp: &TempDir, pyproject: &str, sip_files: &[&str]) {
        std::fs::write(tmp.path().join("pyproject.toml"), pyproject).unwrap();
        for file in sip_files {
            let path = tmp.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "%Module(name=spam)\n").unwrap();
        }
    }

    fn load(tmp: &TempDir) -> Result<Project> {
        load_with(tmp, &NoHooks)
    }

    fn load_with(tmp: &TempDir, hooks: &dyn ProjectHooks) -> Result<Project> {
        Ok(Project::load(tmp.path(), &BuilderRegistry::new(), hooks)?
            .with_python(PythonProbe::fixed(Some(test_target("linux"))))
            .with_module_sources(ModuleSources::builtin()))
    }

    fn configure(project: &mut Project, tool: Tool) -> Result<ResolvedProject> {
        project.apply_defaults(tool)?;
        project.create_build_dir()?;
        project.verify(tool)
    }

    #[test]
    fn test_default_bindings_are_named_after_the_project() {
        let tmp = TempDir::new().unwrap();
        write_project(&tmp, SINGLE, &["spam.sip"]);

        let mut project = load(&tmp).unwrap();
        let names: Vec<_> = project.bindings().names().collect();
        assert_eq!(names, vec!["spam"]);

        let resolved = configure(&mut project, Tool::Sdist).unwrap();
        assert_eq!(resolved.py_minor_version, 11);
        assert_eq!(resolved.abi_version, AbiVersion::new(13, 8));
        assert_eq!(resolved.distinfo_name(), "spam-1.2.dist-info");
        assert!(resolved.bindings_dir().is_none());

        let bindings = project.bindings().get("spam").unwrap();
        assert_eq!(bindings.sip_file(), Some("spam.sip"));
        assert_eq!(bindings.values().bool("protected_is_public"), Some(true));

        project.release_build_dir(true).unwrap();
    }

    #[test]
    fn test_multiple_bindings_require_sip_module() {
        let tmp = TempDir::new().unwrap();
        write_project(
            &tmp,
            &format!(
                "{}\n[[tool.sip.bindings]]\nname = \"a\"\n\n[[tool.sip.bindings]]\nname = \"b\"\n",
                SINGLE
            ),
            &["a.sip", "b.sip"],
        );

        let mut project = load(&tmp).unwrap();
        let err = configure(&mut project, Tool::Sdist).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'tool.sip.project.sip-module': must be defined when the project contains multiple sets of bindings"
        );
    }

    #[test]
    fn test_shared_sip_module_adds_requirement() {
        let tmp = TempDir::new().unwrap();
        write_project(
            &tmp,
            &format!(
                "{}sip-module = \"PyQt6.sip\"\nabi-version = \"12.15\"\n\n[[tool.sip.bindings]]\nname = \"QtCore\"\n\n[[tool.sip.bindings]]\nname = \"QtGui\"\n",
                SINGLE
            ),
            &["QtCore/QtCore.sip", "QtGui/QtGui.sip"],
        );

        let mut project = load(&tmp).unwrap();
        let resolved = configure(&mut project, Tool::Sdist).unwrap();

        assert_eq!(resolved.metadata.requires_dist, vec!["PyQt6-sip (>=12.15, <13)".to_string()]);
        assert_eq!(resolved.bindings_dir(), Some(PathBuf::from("PyQt6/bindings")));
        assert_eq!(
            project.bindings().get("QtGui").unwrap().sip_file(),
            Some("QtGui/QtGui.sip")
        );
    }

    #[test]
    fn test_exact_abi_version_must_be_installed() {
        let tmp = TempDir::new().unwrap();
        write_project(&tmp, &format!("{}abi-version = \"13.2\"\n", SINGLE), &["spam.sip"]);

        let mut project = load(&tmp).unwrap();
        let err = configure(&mut project, Tool::Sdist).unwrap_err();
        assert_eq!(err.to_string(), "'13.2' is not a supported ABI version");
    }

    #[test]
    fn test_unsupported_python_version() {
        let tmp = TempDir::new().unwrap();
        write_project(
            &tmp,
            "[project]\nname = \"spam\"\nversion = \"1\"\n\n[tool.sip.project]\npy-major-version = 3\npy-minor-version = 4\n",
            &["spam.sip"],
        );

        let mut project = load(&tmp).unwrap();
        let err = configure(&mut project, Tool::Build).unwrap_err();
        assert_eq!(err.to_string(), "Python v3.4 is not supported");
    }

    #[test]
    fn test_unknown_project_key() {
        let tmp = TempDir::new().unwrap();
        write_project(&tmp, &format!("{}bogus = 1\n", SINGLE), &[]);

        let err = load(&tmp).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'bogus' is not a valid option in the [tool.sip.project] section"
        );
    }

    #[test]
    fn test_unknown_builder() {
        let tmp = TempDir::new().unwrap();
        write_project(&tmp, &format!("{}builder = \"bazel\"\n", SINGLE), &[]);

        let err = load(&tmp).unwrap_err();
        assert!(err.to_string().contains("'bazel' is not a registered builder"));
    }

    #[test]
    fn test_duplicate_bindings_sections() {
        let tmp = TempDir::new().unwrap();
        write_project(
            &tmp,
            &format!(
                "{}\n[[tool.sip.bindings]]\nname = \"a\"\n\n[[tool.sip.bindings]]\nname = \"a\"\n",
                SINGLE
            ),
            &[],
        );

        assert!(load(&tmp).is_err());
    }

    #[test]
    fn test_build_tool_keeps_its_build_dir() {
        let tmp = TempDir::new().unwrap();
        write_project(&tmp, SINGLE, &["spam.sip"]);

        let mut project = load(&tmp).unwrap();
        let resolved = configure(&mut project, Tool::Build).unwrap();
        assert_eq!(resolved.build_dir, tmp.path().join("build"));

        project.release_build_dir(true).unwrap();
        assert!(tmp.path().join("build").is_dir());
    }

    #[test]
    fn test_temporary_build_dir_is_released() {
        let tmp = TempDir::new().unwrap();
        write_project(&tmp, SINGLE, &["spam.sip"]);

        let mut project = load(&tmp).unwrap();
        let resolved = configure(&mut project, Tool::Wheel).unwrap();
        assert!(resolved.build_dir.is_dir());

        project.release_build_dir(true).unwrap();
        assert!(!resolved.build_dir.exists());
    }

    #[test]
    fn test_failed_action_keeps_the_build_dir() {
        let tmp = TempDir::new().unwrap();
        write_project(&tmp, SINGLE, &["spam.sip"]);

        let mut project = load(&tmp).unwrap();
        let resolved = configure(&mut project, Tool::Install).unwrap();

        project.release_build_dir(false).unwrap();
        assert!(resolved.build_dir.is_dir());
        std::fs::remove_dir_all(&resolved.build_dir).unwrap();
    }

    struct PreDeclared;

    impl ProjectHooks for PreDeclared {
        fn bindings(&self, _metadata: &Metadata) -> Result<Vec<Bindings>> {
            Ok(vec![Bindings::named("core")?.with_buildable(|_| false), Bindings::named("extra")?])
        }

        fn update(&self, project: &mut Project, _tool: Tool) -> Result<()> {
            assert!(project.build_dir().is_some());
            project
                .values_mut()
                .set("sip_module", Value::str("spam.sip"), Origin::Hook)
        }
    }

    #[test]
    fn test_hooks_predeclare_bindings_and_update() {
        let tmp = TempDir::new().unwrap();
        write_project(
            &tmp,
            &format!("{}\n[[tool.sip.bindings]]\nname = \"extra\"\ntags = [\"X\"]\n", SINGLE),
            &["extra.sip"],
        );

        let hooks = PreDeclared;
        let mut project = load_with(&tmp, &hooks).unwrap();
        assert_eq!(project.bindings().len(), 2);

        // "core" isn't buildable and nothing was explicitly enabled.
        project.apply_defaults(Tool::Sdist).unwrap();
        assert_eq!(project.bindings().names().collect::<Vec<_>>(), vec!["extra"]);
        assert_eq!(project.bindings().get("extra").unwrap().tags(), &["X".to_string()]);

        project.create_build_dir().unwrap();
        hooks.update(&mut project, Tool::Sdist).unwrap();

        let resolved = project.verify(Tool::Sdist).unwrap();
        assert_eq!(resolved.sip_module.as_deref(), Some("spam.sip"));
        project.release_build_dir(true).unwrap();
    }

    #[test]
    fn test_enable_from_pyproject() {
        let tmp = TempDir::new().unwrap();
        write_project(
            &tmp,
            &format!(
                "{}sip-module = \"spam.sip\"\nenable = [\"b\"]\n\n[[tool.sip.bindings]]\nname = \"a\"\n\n[[tool.sip.bindings]]\nname = \"b\"\n",
                SINGLE
            ),
            &["b/b.sip"],
        );

        let mut project = load(&tmp).unwrap();
        configure(&mut project, Tool::Sdist).unwrap();
        assert_eq!(project.bindings().names().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(
            ResolvedProject::bindings_message(project.bindings()),
            "These bindings will be built: b."
        );
        project.release_build_dir(true).unwrap();
    }
}
