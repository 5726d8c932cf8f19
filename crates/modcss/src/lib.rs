//! CSS Modules transformation pipeline.
//!
//! Takes `*.module.css` / `*.modules.css` sources and produces scoped CSS,
//! a companion JS module exposing the generated class names, and optional
//! TypeScript declarations. Generated names are deterministic: they derive
//! from a build identity hashed over entry-point contents, the
//! output-affecting configuration, and the package name and version, so
//! repeated builds of the same inputs reproduce byte-identical output on
//! any machine.
//!
//! Results are cached per absolute path and validated by content, including
//! every file reached through `composes` or bundled `@import`s, so edits to
//! a composed dependency invalidate its dependents.
//!
//! # Example
//!
//! ```rust,no_run
//! use modcss::{BuildInputs, Options, Pipeline};
//!
//! # fn main() -> modcss::Result<()> {
//! let pipeline = Pipeline::new(
//!     Options::new(),
//!     BuildInputs::new("./app").entry("src/index.jsx"),
//! )?;
//! let result = pipeline.process("src/button.modules.css")?;
//! print!("{}", result.js);
//! # Ok(())
//! # }
//! ```

mod cache;
mod emit;
pub mod error;
pub mod identity;
mod inject;
#[cfg(feature = "logging")]
pub mod logging;
pub mod names;
pub mod options;
pub mod transform;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::transform::EngineOutput;

pub use error::{ConfigError, Error, IdentityError, NamingError, Result, TransformError};
pub use identity::{BuildId, BuildInputs, EntryPoint};
pub use names::{derive_export_name, LocalsConvention};
pub use options::{DeclarationFile, DtsExtension, InjectMode, Options, PackageInfo};
pub use transform::{ClassExport, ComposeRef, ExportTable, TransformResult};

/// The transformation pipeline: one instance per build.
///
/// Construction resolves the build root, discovers the package identity,
/// and computes the build id; after that every [`process`](Self::process)
/// call is independent and the pipeline can be shared across threads.
#[derive(Debug)]
pub struct Pipeline {
    options: Options,
    root: PathBuf,
    build_id: BuildId,
    package: PackageInfo,
    suffix: String,
    cache: ResultCache,
}

impl Pipeline {
    /// Validate `options`, resolve the root from `inputs`, and compute the
    /// build identity.
    pub fn new(options: Options, inputs: BuildInputs) -> Result<Self> {
        options.validate()?;
        let root = resolve_root(&inputs.root)?;
        let package = match &options.package {
            Some(package) => package.clone(),
            None => PackageInfo::discover(&root),
        };
        let build_id = identity::compute_build_id(&root, &inputs, &package)?;
        let suffix = transform::version_suffix(&package.version);
        let cache = ResultCache::new(options.cache_memory_limit);
        debug!(root = %root.display(), build_id = %build_id, "pipeline ready");
        Ok(Pipeline { options, root, build_id, package, suffix, cache })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Whether `path` matches the configured module filter.
    pub fn is_css_module(&self, path: impl AsRef<Path>) -> bool {
        self.options.filter().is_match(&path.as_ref().to_string_lossy())
    }

    /// Stable per-file digest under this build identity. Also the style
    /// element id (prefixed `_`) used by the injection runtime.
    pub fn digest_for(&self, path: impl AsRef<Path>) -> String {
        let abs = self.absolutize(path.as_ref());
        identity::digest(&self.build_id, &identity::root_relative(&self.root, &abs))
    }

    /// Transform one source file, serving from cache when its content and
    /// all composed dependencies are unchanged. `path` resolves against
    /// the build root.
    pub fn process(&self, path: impl AsRef<Path>) -> Result<Arc<TransformResult>> {
        let abs = self.absolutize(path.as_ref());
        let mut stack = Vec::new();
        self.transform_inner(&abs, &mut stack)
    }

    /// Transform many files concurrently. Results come back in input order.
    pub fn process_many(
        &self,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<Arc<TransformResult>>)> {
        paths
            .par_iter()
            .map(|path| (path.clone(), self.process(path)))
            .collect()
    }

    /// Drop the cached result for `path`.
    pub fn invalidate(&self, path: impl AsRef<Path>) {
        self.cache.invalidate(&self.absolutize(path.as_ref()));
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Declaration files to write for `path`, as `(absolute path, contents)`
    /// pairs. Empty when declaration emission is off.
    pub fn declaration_outputs(
        &self,
        path: impl AsRef<Path>,
        result: &TransformResult,
    ) -> Vec<(PathBuf, String)> {
        let Some(dts) = &result.dts else {
            return Vec::new();
        };
        let abs = self.absolutize(path.as_ref());
        let Some(file_name) = abs.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Vec::new();
        };
        let parent = abs.parent().unwrap_or(&self.root);
        self.options
            .emit_declaration_file
            .variants()
            .into_iter()
            .map(|(ext, dir)| {
                let name = ext.output_name(&file_name);
                let target = match dir {
                    Some(dir) if dir.is_absolute() => dir.join(&name),
                    Some(dir) => self.root.join(dir).join(&name),
                    None => parent.join(&name),
                };
                (target, dts.clone())
            })
            .collect()
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf().clean()
        } else {
            self.root.join(path).clean()
        }
    }

    fn transform_inner(
        &self,
        abs: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Arc<TransformResult>> {
        if stack.iter().any(|p| p == abs) {
            let mut chain = stack.clone();
            chain.push(abs.to_path_buf());
            return Err(TransformError::ComposeCycle { chain }.into());
        }

        let bytes = std::fs::read(abs).map_err(|err| TransformError::Read {
            path: abs.to_path_buf(),
            source: err,
        })?;

        if !self.options.force {
            if let Some(hit) = self.cache.get(abs, &bytes) {
                debug!(path = %abs.display(), "result cache hit");
                return Ok(hit);
            }
        }

        let source = std::str::from_utf8(&bytes).map_err(|err| TransformError::Read {
            path: abs.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })?;

        let pattern = match &self.options.pattern {
            Some(pattern) => pattern.clone(),
            None => {
                let prefix = transform::scoped_name_prefix(abs);
                transform::default_pattern(&prefix, &self.suffix)
            }
        };

        debug!(path = %abs.display(), pattern = %pattern, "transforming");
        let EngineOutput { css, exports, reads, warnings } =
            transform::run_engine(&self.root, abs, source, &pattern, &self.options)?;

        let mut table = transform::export_skeleton(exports);

        let mut composed: Vec<PathBuf> = Vec::new();
        stack.push(abs.to_path_buf());
        let resolved = self.resolve_composes(&mut table, abs, &mut composed, stack);
        stack.pop();
        resolved?;

        // Bundled imports are content dependencies too. Their read order is
        // not deterministic, so they append sorted.
        let mut bundled: Vec<PathBuf> = reads.into_iter().filter(|p| p != abs).collect();
        bundled.sort();
        bundled.dedup();
        for file in bundled {
            push_unique(&mut composed, file);
        }

        let rel = identity::root_relative(&self.root, abs);
        let digest = identity::digest(&self.build_id, &rel);
        let emitted = emit::emit_module(&table, &css, &digest, &self.options, Path::new(&rel))?;

        for warning in &warnings {
            warn!(path = %rel, "css parse warning: {}", warning);
        }

        let result = Arc::new(TransformResult {
            css,
            js: emitted.js,
            dts: emitted.dts,
            exports: table,
            composed_files: composed.clone(),
            warnings,
        });

        let mut deps = Vec::with_capacity(composed.len());
        let mut cacheable = true;
        for file in &composed {
            match std::fs::read(file) {
                Ok(dep_bytes) => deps.push((file.clone(), blake3::hash(&dep_bytes))),
                Err(err) => {
                    debug!(path = %file.display(), error = %err, "dependency unreadable, skipping cache insert");
                    cacheable = false;
                    break;
                }
            }
        }
        if cacheable {
            self.cache.insert(abs.to_path_buf(), &bytes, deps, Arc::clone(&result));
        }

        Ok(result)
    }

    /// Fill every class list in `table`: composed names first (transitively
    /// resolved), the class's own generated name last, tokens deduplicated
    /// first-wins.
    fn resolve_composes(
        &self,
        table: &mut ExportTable,
        abs: &Path,
        composed: &mut Vec<PathBuf>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let by_generated: FxHashMap<String, String> = table
            .values()
            .map(|export| (export.generated.clone(), export.origin.clone()))
            .collect();
        let origins: Vec<String> = table.keys().cloned().collect();
        let mut visiting = FxHashSet::default();
        for origin in &origins {
            self.resolve_one(table, &by_generated, origin, abs, composed, stack, &mut visiting)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_one(
        &self,
        table: &mut ExportTable,
        by_generated: &FxHashMap<String, String>,
        origin: &str,
        abs: &Path,
        composed: &mut Vec<PathBuf>,
        stack: &mut Vec<PathBuf>,
        visiting: &mut FxHashSet<String>,
    ) -> Result<()> {
        let (composes, generated) = match table.get(origin) {
            Some(export) if export.class_list.is_empty() => {
                (export.composes.clone(), export.generated.clone())
            }
            _ => return Ok(()),
        };
        if !visiting.insert(origin.to_string()) {
            // Same-file compose cycle; the caller splices raw names.
            debug!(path = %abs.display(), class = origin, "compose cycle within file");
            return Ok(());
        }

        let mut parts: Vec<String> = Vec::with_capacity(composes.len() + 1);
        for reference in &composes {
            match reference {
                ComposeRef::Local { name } => {
                    let Some(dep_origin) = by_generated.get(name).cloned() else {
                        parts.push(name.clone());
                        continue;
                    };
                    self.resolve_one(
                        table,
                        by_generated,
                        &dep_origin,
                        abs,
                        composed,
                        stack,
                        visiting,
                    )?;
                    match table.get(&dep_origin) {
                        Some(dep) if !dep.class_list.is_empty() => {
                            parts.push(dep.class_list.clone())
                        }
                        _ => parts.push(name.clone()),
                    }
                }
                ComposeRef::Global { name } => parts.push(name.clone()),
                ComposeRef::Dependency { name, specifier } => {
                    let dep_abs = abs.parent().unwrap_or(&self.root).join(specifier).clean();
                    let dep_result = self.transform_inner(&dep_abs, stack)?;
                    let Some(dep_export) = dep_result.exports.get(name) else {
                        return Err(TransformError::UnknownComposes {
                            path: abs.to_path_buf(),
                            specifier: specifier.clone(),
                            name: name.clone(),
                        }
                        .into());
                    };
                    parts.push(dep_export.class_list.clone());
                    push_unique(composed, dep_abs);
                    for file in &dep_result.composed_files {
                        push_unique(composed, file.clone());
                    }
                }
            }
        }
        parts.push(generated);

        let mut seen = FxHashSet::default();
        let tokens: Vec<String> = parts
            .iter()
            .flat_map(|part| part.split_whitespace())
            .filter(|token| seen.insert(token.to_string()))
            .map(str::to_string)
            .collect();

        if let Some(export) = table.get_mut(origin) {
            export.class_list = tokens.join(" ");
        }
        visiting.remove(origin);
        Ok(())
    }
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    let abs = if root.is_absolute() {
        root.to_path_buf().clean()
    } else {
        std::env::current_dir().map_err(ConfigError::Io)?.join(root).clean()
    };
    if !abs.is_dir() {
        return Err(ConfigError::RootNotFound(abs).into());
    }
    Ok(abs)
}

fn push_unique(list: &mut Vec<PathBuf>, path: PathBuf) {
    if !list.contains(&path) {
        list.push(path);
    }
}
