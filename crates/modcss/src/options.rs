//! Pipeline configuration.
//!
//! Everything the caller can tune lives here: injection behavior, naming
//! conventions, the module filter, engine switches, and the package identity
//! baked into generated class names. `Options::validate` runs once before
//! any transform so bad combinations fail fast instead of mid-build.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lightningcss::css_modules::Pattern;
use lightningcss::targets::Browsers;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::names::LocalsConvention;

/// Paths matched by default: `*.module.css` and `*.modules.css`, any case.
pub static DEFAULT_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.modules?\.css$").expect("default filter is a valid regex")
});

/// Resident-memory threshold above which the result cache evicts everything.
pub const DEFAULT_CACHE_MEMORY_LIMIT: u64 = 250 * 1024 * 1024;

/// Code generator for custom injection: `(content_var, digest_var)` in,
/// JS statements out.
pub type InjectCodegen = dyn Fn(&str, &str) -> String + Send + Sync;

/// How generated CSS reaches the document at runtime.
#[derive(Clone, Default)]
pub enum InjectMode {
    /// No injection; the companion module only exposes class names.
    #[default]
    Off,
    /// Inject into the element matching this CSS selector (or its shadow
    /// root), falling back to `document.head`.
    Container(String),
    /// Splice caller-supplied code into the injector scaffolding.
    Custom(Arc<InjectCodegen>),
}

impl InjectMode {
    /// Inject into `document.head`.
    pub fn head() -> Self {
        InjectMode::Container("head".to_string())
    }

    pub fn enabled(&self) -> bool {
        !matches!(self, InjectMode::Off)
    }
}

impl fmt::Debug for InjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectMode::Off => write!(f, "Off"),
            InjectMode::Container(selector) => f.debug_tuple("Container").field(selector).finish(),
            InjectMode::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Declaration-file naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtsExtension {
    /// `app.modules.css` -> `app.modules.css.d.ts`
    CssDts,
    /// `app.modules.css` -> `app.modules.d.css.ts`
    DCssTs,
}

impl DtsExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            DtsExtension::CssDts => ".css.d.ts",
            DtsExtension::DCssTs => ".d.css.ts",
        }
    }

    /// Declaration file name for a given source file name.
    pub fn output_name(&self, file_name: &str) -> String {
        match self {
            DtsExtension::CssDts => format!("{}.d.ts", file_name),
            DtsExtension::DCssTs => match file_name.strip_suffix(".css") {
                Some(stem) => format!("{}.d.css.ts", stem),
                None => format!("{}.d.css.ts", file_name),
            },
        }
    }
}

impl std::str::FromStr for DtsExtension {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ".css.d.ts" => Ok(DtsExtension::CssDts),
            ".d.css.ts" => Ok(DtsExtension::DCssTs),
            other => Err(format!("invalid declaration extension: {}", other)),
        }
    }
}

impl fmt::Display for DtsExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether and how `.d.ts` companions are produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeclarationFile {
    #[default]
    Off,
    /// Emit next to the source, one file per extension variant.
    Extensions(Vec<DtsExtension>),
    /// Emit each extension variant into its own directory.
    PerExtensionDir(Vec<(DtsExtension, PathBuf)>),
}

impl DeclarationFile {
    pub fn enabled(&self) -> bool {
        !matches!(self, DeclarationFile::Off)
    }

    /// Normalized view: each requested variant with its optional target dir.
    pub(crate) fn variants(&self) -> Vec<(DtsExtension, Option<&Path>)> {
        match self {
            DeclarationFile::Off => Vec::new(),
            DeclarationFile::Extensions(exts) => {
                exts.iter().map(|ext| (*ext, None)).collect()
            }
            DeclarationFile::PerExtensionDir(map) => {
                map.iter().map(|(ext, dir)| (*ext, Some(dir.as_path()))).collect()
            }
        }
    }
}

/// Package identity folded into build ids and class-name suffixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageInfo { name: name.into(), version: version.into() }
    }

    /// Read `package.json` under `root`. Missing or malformed manifests
    /// resolve to the empty identity rather than failing the build.
    pub fn discover(root: &Path) -> Self {
        let manifest = root.join("package.json");
        let Ok(raw) = std::fs::read_to_string(&manifest) else {
            return PackageInfo::default();
        };
        match serde_json::from_str(&raw) {
            Ok(info) => info,
            Err(err) => {
                debug!(path = %manifest.display(), error = %err, "ignoring malformed package.json");
                PackageInfo::default()
            }
        }
    }
}

/// Tunable behavior of a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone)]
pub struct Options {
    /// Runtime style injection. Mutually exclusive with `named_exports`.
    pub inject: InjectMode,
    /// Export-key naming convention.
    pub locals_convention: LocalsConvention,
    /// Emit `export const <name> = "..."` bindings alongside the default object.
    pub named_exports: bool,
    /// Scoped-name pattern override. Must contain `[local]`.
    pub pattern: Option<String>,
    /// Which paths count as CSS Modules. Defaults to [`DEFAULT_FILTER`].
    pub filter: Option<Regex>,
    /// Skip cache reads; every transform runs fresh.
    pub force: bool,
    /// Inline local `url()` images as data URIs.
    pub force_inline_images: bool,
    /// Declaration-file emission.
    pub emit_declaration_file: DeclarationFile,
    /// Scope `--custom-property` names alongside classes.
    pub dashed_idents: bool,
    /// Package identity override; discovered from `package.json` when unset.
    pub package: Option<PackageInfo>,
    /// Resolve and inline `@import` dependencies into one stylesheet.
    pub bundle: bool,
    /// Minify the emitted CSS.
    pub minify: bool,
    /// Append an inline source map to the emitted CSS.
    pub source_map: bool,
    /// Browser targets for syntax lowering. Defaults to Chrome 112.
    pub targets: Option<Browsers>,
    /// Result-cache eviction threshold in bytes; `None` disables eviction.
    pub cache_memory_limit: Option<u64>,
}

impl Options {
    pub fn new() -> Self {
        Options {
            inject: InjectMode::Off,
            locals_convention: LocalsConvention::default(),
            named_exports: false,
            pattern: None,
            filter: None,
            force: false,
            force_inline_images: false,
            emit_declaration_file: DeclarationFile::Off,
            dashed_idents: false,
            package: None,
            bundle: true,
            minify: false,
            source_map: false,
            targets: None,
            cache_memory_limit: Some(DEFAULT_CACHE_MEMORY_LIMIT),
        }
    }

    pub fn with_inject(mut self, inject: InjectMode) -> Self {
        self.inject = inject;
        self
    }

    pub fn with_locals_convention(mut self, convention: LocalsConvention) -> Self {
        self.locals_convention = convention;
        self
    }

    pub fn with_named_exports(mut self, named_exports: bool) -> Self {
        self.named_exports = named_exports;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_filter(mut self, filter: Regex) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_force_inline_images(mut self, inline: bool) -> Self {
        self.force_inline_images = inline;
        self
    }

    pub fn with_declaration_file(mut self, emit: DeclarationFile) -> Self {
        self.emit_declaration_file = emit;
        self
    }

    pub fn with_dashed_idents(mut self, dashed_idents: bool) -> Self {
        self.dashed_idents = dashed_idents;
        self
    }

    pub fn with_package(mut self, package: PackageInfo) -> Self {
        self.package = Some(package);
        self
    }

    pub fn with_bundle(mut self, bundle: bool) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_source_map(mut self, source_map: bool) -> Self {
        self.source_map = source_map;
        self
    }

    pub fn with_targets(mut self, targets: Browsers) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_cache_memory_limit(mut self, limit: Option<u64>) -> Self {
        self.cache_memory_limit = limit;
        self
    }

    /// The active module filter.
    pub fn filter(&self) -> &Regex {
        self.filter.as_ref().unwrap_or(&DEFAULT_FILTER)
    }

    /// Reject option combinations that cannot produce valid output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inject.enabled() && self.named_exports {
            return Err(ConfigError::InjectWithNamedExports);
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.contains("[local]") {
                return Err(ConfigError::PatternMissingLocal(pattern.clone()));
            }
            Pattern::parse(pattern).map_err(|err| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: format!("{:?}", err),
            })?;
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::new()
    }
}
