//! Toolchain abstraction for C/C++ compilers.
//!
//! This module generates the compile and link commands for an extension
//! module across different toolchains (GCC, Clang, MSVC).

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::util::process::ProcessBuilder;

/// The language of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    /// The language of a source file, from its extension.
    pub fn from_source(source: &Path) -> Language {
        match source.extension().and_then(|e| e.to_str()) {
            Some("c") => Language::C,
            _ => Language::Cxx,
        }
    }

    /// The language used to link objects compiled from these sources.
    pub fn for_link<'a>(sources: impl IntoIterator<Item = &'a PathBuf>) -> Language {
        if sources
            .into_iter()
            .any(|s| Language::from_source(s) == Language::Cxx)
        {
            Language::Cxx
        } else {
            Language::C
        }
    }
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to run (e.g., "gcc", "cl.exe")
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Convert to a process ready to run.
    pub fn to_process(&self) -> ProcessBuilder {
        let mut process = ProcessBuilder::new(&self.program).args(&self.args);
        for (key, value) in &self.env {
            process = process.env(key, value);
        }
        process
    }
}

/// Input for a compile step.
#[derive(Debug, Clone)]
pub struct CompileInput {
    pub source: PathBuf,
    /// Output object file
    pub output: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    /// Preprocessor defines (name, optional value)
    pub defines: Vec<(String, Option<String>)>,
    pub cflags: Vec<String>,
    pub debug: bool,
}

/// Input for linking an extension module.
#[derive(Debug, Clone)]
pub struct LinkInput {
    pub objects: Vec<PathBuf>,
    /// The extension module
    pub output: PathBuf,
    pub lib_dirs: Vec<PathBuf>,
    /// Libraries to link (without -l prefix)
    pub libs: Vec<String>,
    pub ldflags: Vec<String>,
    /// The symbol Python calls to initialise the module.
    pub init_symbol: String,
    pub debug: bool,
}

/// Parse a `NAME` or `NAME=VALUE` macro definition.
pub fn parse_define(macro_def: &str) -> (String, Option<String>) {
    match macro_def.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (macro_def.to_string(), None),
    }
}

/// The platform/family of a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainPlatform {
    Gcc,
    Clang,
    AppleClang,
    Msvc,
}

impl ToolchainPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainPlatform::Gcc => "gcc",
            ToolchainPlatform::Clang => "clang",
            ToolchainPlatform::AppleClang => "apple-clang",
            ToolchainPlatform::Msvc => "msvc",
        }
    }
}

/// Trait for toolchain implementations.
///
/// Each toolchain knows how to generate commands for its specific compiler.
pub trait Toolchain: Send + Sync {
    fn platform(&self) -> ToolchainPlatform;

    /// The compiler used for a language.
    fn compiler_path(&self, lang: Language) -> &Path;

    fn compile_command(&self, input: &CompileInput, lang: Language) -> CommandSpec;

    /// Generate the command that links a loadable extension module.
    fn link_module_command(&self, input: &LinkInput, driver: Language) -> CommandSpec;

    fn object_extension(&self) -> &str;
}

/// GCC/Clang toolchain (Unix-like systems).
#[derive(Debug, Clone)]
pub struct GccToolchain {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub family: ToolchainPlatform,
}

impl GccToolchain {
    pub fn new(cc: PathBuf, cxx: PathBuf, family: ToolchainPlatform) -> Self {
        GccToolchain { cc, cxx, family }
    }

    /// Infer C++ compiler path from C compiler path.
    ///
    /// Handles common patterns:
    /// - gcc, x86_64-linux-gnu-gcc -> g++, x86_64-linux-gnu-g++
    /// - clang -> clang++
    /// - cc, /usr/bin/cc -> c++, /usr/bin/c++
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if cc_str.ends_with("gcc") {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 2]));
        }

        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }

        // Only match "cc" when it's a complete basename (not "mycc")
        let is_standalone_cc = cc_str == "cc"
            || cc_str.ends_with("/cc")
            || cc_str.ends_with("\\cc")
            || cc_str.ends_with("-cc");

        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }
}

impl Toolchain for GccToolchain {
    fn platform(&self) -> ToolchainPlatform {
        self.family
    }

    fn compiler_path(&self, lang: Language) -> &Path {
        match lang {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        }
    }

    fn compile_command(&self, input: &CompileInput, lang: Language) -> CommandSpec {
        let mut cmd = CommandSpec::new(self.compiler_path(lang))
            .arg("-c")
            .arg("-fPIC")
            .arg("-fno-strict-aliasing");

        if input.debug {
            cmd = cmd.arg("-g").arg("-O0");
        } else {
            cmd = cmd.arg("-O2").arg("-DNDEBUG");
        }

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }

        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("-D{}={}", name, v)),
                None => cmd = cmd.arg(format!("-D{}", name)),
            }
        }

        cmd = cmd.args(input.cflags.iter().cloned());

        cmd.arg(input.source.display().to_string())
            .arg("-o")
            .arg(input.output.display().to_string())
    }

    fn link_module_command(&self, input: &LinkInput, driver: Language) -> CommandSpec {
        let mut cmd = CommandSpec::new(self.compiler_path(driver));

        // Python symbols are resolved by the interpreter at load time.
        if self.family == ToolchainPlatform::AppleClang || cfg!(target_os = "macos") {
            cmd = cmd.arg("-bundle").arg("-undefined").arg("dynamic_lookup");
        } else {
            cmd = cmd.arg("-shared");
        }

        if input.debug {
            cmd = cmd.arg("-g");
        }

        cmd = cmd.arg("-o").arg(input.output.display().to_string());

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("-L{}", dir.display()));
        }

        for lib in &input.libs {
            cmd = cmd.arg(format!("-l{}", lib));
        }

        cmd.args(input.ldflags.iter().cloned())
    }

    fn object_extension(&self) -> &str {
        "o"
    }
}

/// MSVC toolchain (Windows).
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    /// Path to cl.exe (compiler)
    pub cl: PathBuf,
    /// Path to link.exe (linker)
    pub link: PathBuf,
}

impl MsvcToolchain {
    pub fn new(cl: PathBuf, link: PathBuf) -> Self {
        MsvcToolchain { cl, link }
    }
}

impl Toolchain for MsvcToolchain {
    fn platform(&self) -> ToolchainPlatform {
        ToolchainPlatform::Msvc
    }

    fn compiler_path(&self, _lang: Language) -> &Path {
        &self.cl
    }

    fn compile_command(&self, input: &CompileInput, lang: Language) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.cl).arg("/nologo").arg("/c");

        if lang == Language::Cxx {
            cmd = cmd.arg("/TP").arg("/EHsc");
        }

        // Python extensions always use the dynamic runtime.
        if input.debug {
            cmd = cmd.arg("/MDd").arg("/Zi").arg("/Od");
        } else {
            cmd = cmd.arg("/MD").arg("/O2").arg("/DNDEBUG");
        }

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("/I{}", dir.display()));
        }

        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("/D{}={}", name, v)),
                None => cmd = cmd.arg(format!("/D{}", name)),
            }
        }

        cmd = cmd.args(input.cflags.iter().cloned());

        cmd.arg(input.source.display().to_string())
            .arg(format!("/Fo{}", input.output.display()))
    }

    fn link_module_command(&self, input: &LinkInput, _driver: Language) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.link)
            .arg("/nologo")
            .arg("/DLL")
            .arg(format!("/EXPORT:{}", input.init_symbol))
            .arg(format!("/OUT:{}", input.output.display()));

        if input.debug {
            cmd = cmd.arg("/DEBUG");
        }

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("/LIBPATH:{}", dir.display()));
        }

        for lib in &input.libs {
            cmd = cmd.arg(format!("{}.lib", lib));
        }

        cmd.args(input.ldflags.iter().cloned())
    }

    fn object_extension(&self) -> &str {
        "obj"
    }
}

/// Detect the available toolchain.
///
/// On Windows a configured MSVC environment is used if there is one. Then
/// `CC` or the first of cc/gcc/clang.
pub fn detect_toolchain() -> Result<Box<dyn Toolchain>> {
    if let Some(toolchain) = try_detect_msvc() {
        return Ok(toolchain);
    }

    if let Some(toolchain) = try_detect_gcc() {
        return Ok(toolchain);
    }

    bail!(
        "no C compiler found\n\
         \n\
         Building extension modules requires a C compiler (gcc, clang, or cl).\n\
         Set the CC environment variable or install a compiler."
    )
}

/// A toolchain for a specific compiler.
pub fn toolchain_for_compiler(compiler: &Path) -> Box<dyn Toolchain> {
    let name = compiler
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name == "cl" {
        let link = compiler.with_file_name(if cfg!(windows) { "link.exe" } else { "link" });
        return Box::new(MsvcToolchain::new(compiler.to_path_buf(), link));
    }

    let cxx = std::env::var("CXX")
        .map(PathBuf::from)
        .unwrap_or_else(|_| GccToolchain::infer_cxx(compiler));
    let family = detect_compiler_family(compiler);

    Box::new(GccToolchain::new(compiler.to_path_buf(), cxx, family))
}

/// A Developer Command Prompt puts cl.exe in PATH and sets INCLUDE and LIB.
fn try_detect_msvc() -> Option<Box<dyn Toolchain>> {
    if !cfg!(target_os = "windows") {
        return None;
    }

    let cl = which::which("cl").ok()?;
    if std::env::var("INCLUDE").is_err() || std::env::var("LIB").is_err() {
        tracing::debug!("cl.exe found but the MSVC environment is not configured");
        return None;
    }
    let link = which::which("link").ok()?;

    Some(Box::new(MsvcToolchain::new(cl, link)))
}

fn try_detect_gcc() -> Option<Box<dyn Toolchain>> {
    use which::which;

    let cc = match std::env::var("CC") {
        Ok(cc_env) if !cc_env.is_empty() => PathBuf::from(cc_env),
        _ => which("cc")
            .or_else(|_| which("gcc"))
            .or_else(|_| which("clang"))
            .ok()?,
    };

    let cxx = match std::env::var("CXX") {
        Ok(cxx_env) if !cxx_env.is_empty() => PathBuf::from(cxx_env),
        _ => which("c++")
            .or_else(|_| which("g++"))
            .or_else(|_| which("clang++"))
            .unwrap_or_else(|_| GccToolchain::infer_cxx(&cc)),
    };

    let family = detect_compiler_family(&cc);

    Some(Box::new(GccToolchain::new(cc, cxx, family)))
}

/// Detect whether the compiler is GCC, Clang, or Apple Clang.
fn detect_compiler_family(cc: &Path) -> ToolchainPlatform {
    let name = cc
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.contains("gcc") || name.contains("g++") {
        return ToolchainPlatform::Gcc;
    }

    let version = std::process::Command::new(cc)
        .arg("--version")
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).to_lowercase())
        .unwrap_or_default();

    if version.contains("apple") {
        ToolchainPlatform::AppleClang
    } else if name.contains("clang") || version.contains("clang") {
        ToolchainPlatform::Clang
    } else {
        ToolchainPlatform::Gcc
    }
}
