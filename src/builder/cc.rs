//! The builder that drives a C/C++ compiler directly.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::debug;

use crate::builder::toolchain::{
    detect_toolchain, parse_define, toolchain_for_compiler, CompileInput, Language, LinkInput,
    Toolchain,
};
use crate::builder::Builder;
use crate::core::bindings::Bindings;
use crate::core::configurable::Configurable;
use crate::core::option::{ConfigOption, ConfigValues, Tool, COMPILING_TOOLS};
use crate::core::project::ResolvedProject;
use crate::core::pyproject::{BUILDER_SECTION, PROJECT_SECTION};
use crate::util::errors::UserError;

pub const BUILDER_NAME: &str = "cc";

fn cc_options() -> Vec<ConfigOption> {
    vec![
        // Overrides `CC` and the compiler search.
        ConfigOption::string("compiler"),
        ConfigOption::list("extra_compile_args"),
        ConfigOption::list("extra_link_args"),
        ConfigOption::int("jobs")
            .help("the number of source files to compile in parallel")
            .metavar("N")
            .tools(COMPILING_TOOLS),
    ]
}

/// Compiles each module's sources and links them into a loadable module.
#[derive(Debug)]
pub struct CcBuilder {
    options: Vec<ConfigOption>,
    values: ConfigValues,
}

impl Default for CcBuilder {
    fn default() -> Self {
        CcBuilder::new()
    }
}

impl CcBuilder {
    pub fn new() -> Self {
        let options = cc_options();
        let values = ConfigValues::new(&options);

        CcBuilder { options, values }
    }

    fn toolchain(&self) -> Result<Box<dyn Toolchain>> {
        match self.values.str("compiler").filter(|c| !c.is_empty()) {
            Some(compiler) => Ok(toolchain_for_compiler(Path::new(compiler))),
            None => detect_toolchain().map_err(|e| {
                anyhow::Error::from(UserError::with_detail(
                    "unable to find a C/C++ compiler",
                    format!("{:#}", e),
                ))
            }),
        }
    }

    fn compile_inputs(
        &self,
        bindings: &Bindings,
        project: &ResolvedProject,
        toolchain: &dyn Toolchain,
    ) -> Result<Vec<(CompileInput, Language)>> {
        let generated = bindings
            .generated()
            .with_context(|| format!("the {} bindings have not been generated", bindings.name()))?;

        let mut include_dirs = generated.include_dirs.clone();
        if let Some(ref py_include_dir) = project.py_include_dir {
            include_dirs.push(py_include_dir.clone());
        }

        let defines: Vec<_> = generated.define_macros.iter().map(|m| parse_define(m)).collect();

        let mut cflags = bindings.builder_settings().to_vec();
        cflags.extend(self.values.list("extra_compile_args").iter().cloned());

        let objects_dir = generated.sources_dir.join("objects");
        let mut taken = HashSet::new();

        Ok(generated
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let mut object = object_name(source, &generated.sources_dir, &project.root_dir);
                if !taken.insert(object.clone()) {
                    object = PathBuf::from(format!("{}-{}", index, object.display()));
                    taken.insert(object.clone());
                }

                let mut output = objects_dir.join(object).into_os_string();
                output.push(".");
                output.push(toolchain.object_extension());

                let input = CompileInput {
                    source: source.clone(),
                    output: PathBuf::from(output),
                    include_dirs: include_dirs.clone(),
                    defines: defines.clone(),
                    cflags: cflags.clone(),
                    debug: bindings.debug(),
                };

                (input, Language::from_source(source))
            })
            .collect())
    }
}

/// The object name of a source, relative to the objects directory.
///
/// Sources keep their directory and full file name so that `a/util.c` and
/// `b/util.cpp` don't share an object.
fn object_name(source: &Path, sources_dir: &Path, root_dir: &Path) -> PathBuf {
    let relative = if source.is_relative() {
        Some(source)
    } else {
        source
            .strip_prefix(sources_dir)
            .or_else(|_| source.strip_prefix(root_dir))
            .ok()
    };

    match relative {
        Some(rel) if rel.components().all(|c| matches!(c, Component::Normal(_))) => {
            rel.to_path_buf()
        }
        _ => PathBuf::from(source.file_name().unwrap_or_default()),
    }
}

impl Configurable for CcBuilder {
    fn section(&self) -> &'static str {
        BUILDER_SECTION
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
}

impl Builder for CcBuilder {
    fn name(&self) -> &'static str {
        BUILDER_NAME
    }

    fn verify(&self, project: &ResolvedProject) -> Result<()> {
        if project.tool == Tool::Sdist {
            return Ok(());
        }

        if project.py_include_dir.is_none() {
            return Err(UserError::option(
                "py-include-dir",
                Some(PROJECT_SECTION),
                "must be defined when the target Python interpreter can't be queried",
            )
            .into());
        }

        if let Some(jobs) = self.values.int("jobs") {
            if jobs < 1 {
                return Err(
                    UserError::option("jobs", Some(BUILDER_SECTION), "must be at least 1").into(),
                );
            }
        }

        Ok(())
    }

    fn build_extension_module(
        &self,
        bindings: &Bindings,
        project: &ResolvedProject,
    ) -> Result<PathBuf> {
        let generated = bindings
            .generated()
            .with_context(|| format!("the {} bindings have not been generated", bindings.name()))?;

        let toolchain = self.toolchain()?;
        debug!(
            "building the {} module with {}",
            generated.name,
            toolchain.platform().as_str()
        );

        let inputs = self.compile_inputs(bindings, project, toolchain.as_ref())?;
        for (input, _) in &inputs {
            if let Some(parent) = input.output.parent() {
                crate::util::fs::ensure_dir(parent)?;
            }
        }

        let verbose = project.verbose;
        let compile = |(input, lang): &(CompileInput, Language)| -> Result<PathBuf> {
            toolchain
                .compile_command(input, *lang)
                .to_process()
                .cwd(&generated.sources_dir)
                .run(verbose)?;
            Ok(input.output.clone())
        };

        let objects = match self.values.int("jobs") {
            Some(jobs) if jobs > 0 => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs as usize)
                .build()
                .context("failed to create the compile thread pool")?
                .install(|| inputs.par_iter().map(compile).collect::<Result<Vec<_>>>())?,
            _ => inputs.par_iter().map(compile).collect::<Result<Vec<_>>>()?,
        };

        let mut lib_dirs = bindings.library_dirs(&project.root_dir);
        if project.py_platform == "win32" {
            if let Some(ref py_library_dir) = project.py_library_dir {
                lib_dirs.push(py_library_dir.clone());
            }
        }

        let module = generated.sources_dir.join(format!(
            "{}{}",
            generated.base_name(),
            bindings.module_extension(project)
        ));

        let link = LinkInput {
            objects,
            output: module.clone(),
            lib_dirs,
            libs: bindings.libraries().to_vec(),
            ldflags: self.values.list("extra_link_args").to_vec(),
            init_symbol: format!("PyInit_{}", generated.base_name()),
            debug: bindings.debug(),
        };

        toolchain
            .link_module_command(&link, Language::for_link(&generated.sources))
            .to_process()
            .cwd(&generated.sources_dir)
            .run(verbose)?;

        Ok(module)
    }
}
