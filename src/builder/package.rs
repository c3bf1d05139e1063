//! Building, installing and packaging in terms of a [`Builder`].

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::builder::{BuildContext, Builder};
use crate::core::bindings::BindingsSet;
use crate::core::project::ResolvedProject;
use crate::core::pyproject::{PROJECT_SECTION, PYPROJECT_FILE};
use crate::util::errors::UserError;
use crate::util::{fs, hash};

/// A built file and where it goes relative to the target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installable {
    pub source: PathBuf,
    pub target: PathBuf,

    /// Extension modules are installed executable.
    pub executable: bool,
}

/// Generate and build every set of bindings and return what must be installed.
pub fn build_modules<B: Builder + ?Sized>(
    builder: &B,
    ctx: &BuildContext<'_>,
    bindings: &mut BindingsSet,
) -> Result<Vec<Installable>> {
    let project = ctx.project;
    let mut installables: Vec<Installable> = Vec::new();

    if let Some(ref sip_module) = project.sip_module {
        project
            .module_sources
            .install_sip_h(project.abi_version, sip_module, true, &project.build_dir)?;
    }

    let bindings_dir = project.bindings_dir();

    for b in bindings.iter_mut() {
        project.progress(&format!("Generating the {} bindings", b.name()));
        b.generate(project, ctx.generator)?;

        let Some(generated) = b.generated().cloned() else {
            continue;
        };

        project.progress(&format!("Compiling the '{}' module", generated.name));
        let module = builder.build_extension_module(b, project)?;

        let package_dir = package_dir(&generated.name);
        let module_name = module
            .file_name()
            .with_context(|| format!("invalid module path: {}", module.display()))?;
        add_installable(&mut installables, module.clone(), package_dir.join(module_name), true);

        if let Some(ref pyi_file) = generated.pyi_file {
            if pyi_file.is_file() {
                add_installable(
                    &mut installables,
                    pyi_file.clone(),
                    package_dir.join(format!("{}.pyi", generated.base_name())),
                    false,
                );
            }
        }

        if let Some(ref bindings_dir) = bindings_dir {
            let config_file = b.write_configuration(&project.build_dir.join("bindings"), project)?;
            add_installable(
                &mut installables,
                config_file,
                bindings_dir.join(b.name()).join(format!("{}.toml", b.name())),
                false,
            );

            let sip_dir = project.sip_files_dir.join(b.name());
            for sip_file in b.sip_files(project, ctx.generator)? {
                let source = project.root_dir.join(&sip_file);
                let target = bindings_dir
                    .join(b.name())
                    .join(fs::relative_path(&sip_dir, &source));
                add_installable(&mut installables, source, target, false);
            }
        }

        if project.dunder_init && generated.name.contains('.') {
            let init_py = project.build_dir.join("__init__.py");
            fs::write_string(&init_py, project.dunder_init_content())?;
            add_installable(&mut installables, init_py, package_dir.join("__init__.py"), false);
        }
    }

    Ok(installables)
}

fn add_installable(
    installables: &mut Vec<Installable>,
    source: PathBuf,
    target: PathBuf,
    executable: bool,
) {
    if !installables.iter().any(|i| i.target == target) {
        installables.push(Installable {
            source,
            target,
            executable,
        });
    }
}

/// The directory of a module's package relative to the target directory.
fn package_dir(module_name: &str) -> PathBuf {
    let mut parts: Vec<&str> = module_name.split('.').collect();
    parts.pop();
    parts.iter().collect()
}

/// Build the project and install it in the target directory.
pub fn install<B: Builder + ?Sized>(
    builder: &B,
    ctx: &BuildContext<'_>,
    bindings: &mut BindingsSet,
) -> Result<PathBuf> {
    let project = ctx.project;

    let Some(target_dir) = project.target_dir.clone() else {
        return Err(UserError::option(
            "target-dir",
            Some(PROJECT_SECTION),
            "must be defined when the target Python interpreter can't be queried",
        )
        .into());
    };

    let installables = build_modules(builder, ctx, bindings)?;

    project.progress(&format!("Installing in {}", target_dir.display()));

    let distinfo = target_dir.join(project.distinfo_name());
    remove_previous_install(&target_dir, &distinfo)?;

    let mut writer = DirectoryWriter::new(&target_dir);
    for installable in &installables {
        writer.add_file(&installable.target, &installable.source, installable.executable)?;
    }

    writer.add_bytes(&Path::new(&project.distinfo_name()).join("INSTALLER"), b"sipbuild\n")?;
    write_distinfo(&mut writer, project, &[])?;

    Ok(target_dir)
}

/// Remove the files listed in the `RECORD` of an earlier installation.
fn remove_previous_install(target_dir: &Path, distinfo: &Path) -> Result<()> {
    let record = distinfo.join("RECORD");

    if record.is_file() {
        debug!("removing the previous installation recorded in {}", record.display());

        for line in fs::read_to_string(&record)?.lines() {
            let Some(name) = line.split(',').next().filter(|n| !n.is_empty()) else {
                continue;
            };

            let name = Path::new(name);
            if name.is_absolute() || name.components().any(|c| c == Component::ParentDir) {
                continue;
            }

            let installed = target_dir.join(name);
            if installed.is_file() {
                std::fs::remove_file(&installed)
                    .with_context(|| format!("failed to remove {}", installed.display()))?;
            }
        }
    }

    fs::remove_dir_all_if_exists(distinfo)
}

/// Create an sdist of the project in a directory.
pub fn build_sdist(
    ctx: &BuildContext<'_>,
    bindings: &mut BindingsSet,
    sdist_dir: &Path,
) -> Result<PathBuf> {
    let project = ctx.project;
    let base = format!("{}-{}", project.name.replace('-', "_"), project.metadata.version);

    project.progress("Creating the sdist");

    let mut files = sdist_files(project)?;

    // The .sip files are needed to rebuild regardless of the excludes.
    for b in bindings.iter_mut() {
        for sip_file in b.sip_files(project, ctx.generator)? {
            files.insert(sip_file);
        }
    }

    if project.root_dir.join(PYPROJECT_FILE).is_file() {
        files.insert(PathBuf::from(PYPROJECT_FILE));
    }

    fs::ensure_dir(sdist_dir)?;
    let sdist_file = sdist_dir.join(format!("{}.tar.gz", base));

    // An earlier sdist written into the project itself.
    files.remove(&fs::relative_path(&project.root_dir, &sdist_file));

    let file = File::create(&sdist_file)
        .with_context(|| format!("failed to create {}", sdist_file.display()))?;
    let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let prefix = PathBuf::from(&base);

    for rel in &files {
        if *rel == Path::new("PKG-INFO") {
            continue;
        }

        archive
            .append_path_with_name(project.root_dir.join(rel), prefix.join(rel))
            .with_context(|| format!("failed to add {} to the sdist", rel.display()))?;
    }

    let pkg_info = project.metadata.to_core_metadata();
    let mut header = tar::Header::new_gnu();
    header.set_size(pkg_info.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive
        .append_data(&mut header, prefix.join("PKG-INFO"), pkg_info.as_bytes())
        .context("failed to add PKG-INFO to the sdist")?;

    archive
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .with_context(|| format!("failed to write {}", sdist_file.display()))?;

    Ok(sdist_file)
}

/// The files of the project tree that go in an sdist, relative to the root.
fn sdist_files(project: &ResolvedProject) -> Result<BTreeSet<PathBuf>> {
    let root_dir = &project.root_dir;

    let excluded: BTreeSet<PathBuf> = fs::glob_files(root_dir, &project.sdist_excludes)?
        .into_iter()
        .map(|p| fs::relative_path(root_dir, &p))
        .collect();

    let mut files = BTreeSet::new();

    let walker = WalkDir::new(root_dir).sort_by_file_name().into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }

        let name = entry.file_name().to_string_lossy();
        !(name.starts_with('.') || name == "__pycache__" || entry.path() == project.build_dir)
    });

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = fs::relative_path(root_dir, entry.path());
        if !excluded.contains(&rel) {
            files.insert(rel);
        }
    }

    Ok(files)
}

/// Build the project and package it as a wheel in a directory.
pub fn build_wheel<B: Builder + ?Sized>(
    builder: &B,
    ctx: &BuildContext<'_>,
    bindings: &mut BindingsSet,
    wheel_dir: &Path,
) -> Result<PathBuf> {
    let project = ctx.project;
    let installables = build_modules(builder, ctx, bindings)?;

    let limited_api = !bindings.is_empty()
        && bindings
            .iter()
            .all(|b| b.generated().is_some_and(|g| g.uses_limited_api));
    let tag = wheel_tag(project, limited_api);

    let wheel_file = wheel_dir.join(format!(
        "{}-{}-{}.whl",
        project.name.replace('-', "_"),
        project.metadata.version,
        tag
    ));

    project.progress(&format!("Creating {}", wheel_file.display()));

    fs::ensure_dir(wheel_dir)?;
    let mut writer = WheelWriter::new(&wheel_file)?;

    for installable in &installables {
        writer.add_file(&installable.target, &installable.source, installable.executable)?;
    }

    let wheel = format!(
        "Wheel-Version: 1.0\nGenerator: sipbuild {}\nRoot-Is-Purelib: false\nTag: {}\n",
        crate::VERSION,
        tag
    );
    write_distinfo(&mut writer, project, &[("WHEEL", wheel)])?;
    writer.finish()?;

    Ok(wheel_file)
}

/// The `<python>-<abi>-<platform>` tag of the wheel.
pub fn wheel_tag(project: &ResolvedProject, limited_api: bool) -> String {
    let python = format!("cp{}{}", project.py_major_version, project.py_minor_version);

    let abi = if limited_api {
        "abi3".to_string()
    } else if project.py_debug {
        format!("{}d", python)
    } else {
        python.clone()
    };

    let platform = project
        .platform_tag
        .as_deref()
        .unwrap_or(&project.py_platform)
        .replace(['-', '.'], "_");

    format!("{}-{}-{}", python, abi, platform)
}

/// Write the `.dist-info` directory, ending with its `RECORD`.
fn write_distinfo(
    writer: &mut dyn PackageWriter,
    project: &ResolvedProject,
    extra: &[(&str, String)],
) -> Result<()> {
    let distinfo = PathBuf::from(project.distinfo_name());

    writer.add_bytes(&distinfo.join("METADATA"), project.metadata.to_core_metadata().as_bytes())?;

    for (name, contents) in extra {
        writer.add_bytes(&distinfo.join(name), contents.as_bytes())?;
    }

    if !project.console_scripts.is_empty() {
        let mut entry_points = String::from("[console_scripts]\n");
        for script in &project.console_scripts {
            entry_points.push_str(script);
            entry_points.push('\n');
        }
        writer.add_bytes(&distinfo.join("entry_points.txt"), entry_points.as_bytes())?;
    }

    let record_name = distinfo.join("RECORD");
    let mut record = String::new();
    for entry in writer.record() {
        record.push_str(&format!("{},{},{}\n", entry.path, entry.hash, entry.size));
    }
    record.push_str(&format!("{},,\n", record_path(&record_name)));

    writer.add_unrecorded(&record_name, record.as_bytes(), FILE_MODE)
}

/// One line of a `RECORD`.
#[derive(Debug, Clone)]
struct RecordEntry {
    path: String,
    hash: String,
    size: usize,
}

/// `RECORD` paths always use `/`.
fn record_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

const FILE_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;

/// Somewhere installed files are written, keeping a `RECORD` of them.
trait PackageWriter {
    /// Write a file with unix permissions without recording it.
    fn add_unrecorded(&mut self, target: &Path, data: &[u8], mode: u32) -> Result<()>;

    fn record_mut(&mut self) -> &mut Vec<RecordEntry>;

    fn record(&self) -> &[RecordEntry];

    fn add_bytes(&mut self, target: &Path, data: &[u8]) -> Result<()> {
        self.add_bytes_with_mode(target, data, FILE_MODE)
    }

    fn add_bytes_with_mode(&mut self, target: &Path, data: &[u8], mode: u32) -> Result<()> {
        self.add_unrecorded(target, data, mode)?;
        self.record_mut().push(RecordEntry {
            path: record_path(target),
            hash: hash::record_hash(data),
            size: data.len(),
        });
        Ok(())
    }

    fn add_file(&mut self, target: &Path, source: &Path, executable: bool) -> Result<()> {
        let data = std::fs::read(source)
            .with_context(|| format!("failed to read {}", source.display()))?;
        let mode = if executable { EXECUTABLE_MODE } else { FILE_MODE };
        self.add_bytes_with_mode(target, &data, mode)
    }
}

/// Writes into a directory, normally `site-packages`.
struct DirectoryWriter {
    root: PathBuf,
    record: Vec<RecordEntry>,
}

impl DirectoryWriter {
    fn new(root: &Path) -> Self {
        DirectoryWriter {
            root: root.to_path_buf(),
            record: Vec::new(),
        }
    }
}

impl PackageWriter for DirectoryWriter {
    fn add_unrecorded(&mut self, target: &Path, data: &[u8], mode: u32) -> Result<()> {
        let path = self.root.join(target);
        if let Some(parent) = path.parent() {
            fs::ensure_dir(parent)?;
        }

        std::fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .with_context(|| format!("failed to set the permissions of {}", path.display()))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(())
    }

    fn record_mut(&mut self) -> &mut Vec<RecordEntry> {
        &mut self.record
    }

    fn record(&self) -> &[RecordEntry] {
        &self.record
    }
}

/// Writes into a wheel archive.
struct WheelWriter {
    zip: ZipWriter<File>,
    path: PathBuf,
    record: Vec<RecordEntry>,
}

impl WheelWriter {
    fn new(path: &Path) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;

        Ok(WheelWriter {
            zip: ZipWriter::new(file),
            path: path.to_path_buf(),
            record: Vec::new(),
        })
    }

    fn finish(self) -> Result<()> {
        self.zip
            .finish()
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl PackageWriter for WheelWriter {
    fn add_unrecorded(&mut self, target: &Path, data: &[u8], mode: u32) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode);

        self.zip
            .start_file(record_path(target), options)
            .with_context(|| {
                format!("failed to add {} to {}", target.display(), self.path.display())
            })?;
        self.zip.write_all(data)?;
        Ok(())
    }

    fn record_mut(&mut self) -> &mut Vec<RecordEntry> {
        &mut self.record
    }

    fn record(&self) -> &[RecordEntry] {
        &self.record
    }
}
