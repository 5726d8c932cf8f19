//! Scoped-CSS transformation.
//!
//! Wraps the lightningcss engine: parse (or bundle `@import`s), scope
//! class names through the configured pattern, lower syntax for the
//! browser targets, then print with optional minification and an inline
//! source map. Parse errors inside rules are recovered and surfaced as
//! warnings so one bad declaration cannot take down the whole file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use indexmap::IndexMap;
use lightningcss::bundler::{Bundler, FileProvider, SourceProvider};
use lightningcss::css_modules::{self, CssModuleExports, CssModuleReference, Pattern};
use lightningcss::dependencies::{Dependency, DependencyOptions};
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserFlags, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use parking_lot::Mutex;
use path_clean::PathClean;

use crate::error::TransformError;
use crate::identity;
use crate::options::Options;

/// Chrome 112, the baseline the generated CSS is lowered to when the
/// caller gives no targets. Encoded as `major << 16`.
const DEFAULT_CHROME_TARGET: u32 = 112 << 16;

/// One `composes:` reference attached to a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeRef {
    /// Another class in the same file, by generated name.
    Local { name: String },
    /// A global (unscoped) class name.
    Global { name: String },
    /// A class in another file, by origin name and import specifier.
    Dependency { name: String, specifier: String },
}

/// A single scoped class on the export surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassExport {
    /// Class name as written in the source.
    pub origin: String,
    /// Generated scoped name.
    pub generated: String,
    /// Composition references in declaration order.
    pub composes: Vec<ComposeRef>,
    /// Space-joined composed names followed by `generated`; what consumers
    /// put into `class` attributes.
    pub class_list: String,
}

/// Export table keyed and ordered by origin class name.
pub type ExportTable = IndexMap<String, ClassExport>;

/// Everything produced for one source file.
#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Final CSS with scoped names applied.
    pub css: String,
    /// Companion JS module source.
    pub js: String,
    /// Declaration-file source, when emission is enabled.
    pub dts: Option<String>,
    pub exports: ExportTable,
    /// Files this result's content depends on besides the source itself:
    /// composes targets and bundled imports, absolute, first-seen order.
    pub composed_files: Vec<PathBuf>,
    /// Diagnostics recovered by the engine during parsing.
    pub warnings: Vec<String>,
}

/// Raw engine output before composes resolution and emission.
pub(crate) struct EngineOutput {
    pub css: String,
    pub exports: Option<CssModuleExports>,
    /// Absolute paths read while bundling, entry included.
    pub reads: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Parse and print one stylesheet through the engine.
///
/// In bundle mode `@import`s are resolved relative to their importing file
/// and inlined; the engine then sees a single stylesheet. The `pattern`
/// must already be validated. The source text is passed in so the caller
/// keeps the bytes for cache keying.
pub(crate) fn run_engine(
    root: &Path,
    abs_path: &Path,
    source: &str,
    pattern: &str,
    options: &Options,
) -> Result<EngineOutput, TransformError> {
    let rel = identity::root_relative(root, abs_path);
    let root_str = root.to_string_lossy().into_owned();
    let browsers = options.targets.clone().unwrap_or(Browsers {
        chrome: Some(DEFAULT_CHROME_TARGET),
        ..Browsers::default()
    });
    let targets = Targets::from(browsers);

    let pattern = Pattern::parse(pattern).map_err(|err| TransformError::Parse {
        path: abs_path.to_path_buf(),
        message: format!("{:?}", err),
    })?;
    // Declared before `warnings`: recovered parser errors borrow from the
    // provider's sources, so it must outlive them.
    let provider = RootedProvider::new(root.to_path_buf());
    let warnings = Arc::new(RwLock::new(Vec::new()));
    let parser_options = ParserOptions {
        filename: rel.clone(),
        css_modules: Some(css_modules::Config {
            pattern,
            dashed_idents: options.dashed_idents,
            ..Default::default()
        }),
        error_recovery: true,
        warnings: Some(Arc::clone(&warnings)),
        flags: ParserFlags::CUSTOM_MEDIA,
        ..Default::default()
    };

    let mut source_map = options.source_map.then(|| SourceMap::new(&root_str));

    let mut reads = Vec::new();
    let printed = if options.bundle {
        let stylesheet = {
            let mut bundler = Bundler::new(&provider, source_map.as_mut(), parser_options);
            bundler.bundle(Path::new(&rel)).map_err(|err| TransformError::Parse {
                path: abs_path.to_path_buf(),
                message: format!("{:?}", err),
            })?
        };
        let printed =
            finish(stylesheet, abs_path, &root_str, targets, options, source_map.as_mut())?;
        reads = provider.reads();
        printed
    } else {
        if let Some(map) = source_map.as_mut() {
            let index = map.add_source(&rel);
            map.set_source_content(index as usize, source).map_err(|err| {
                TransformError::SourceMap {
                    path: abs_path.to_path_buf(),
                    message: format!("{:?}", err),
                }
            })?;
        }
        let stylesheet = StyleSheet::parse(source, parser_options).map_err(|err| {
            TransformError::Parse {
                path: abs_path.to_path_buf(),
                message: format!("{:?}", err),
            }
        })?;
        finish(stylesheet, abs_path, &root_str, targets, options, source_map.as_mut())?
    };

    let mut css = printed.code;
    if let Some(dependencies) = &printed.dependencies {
        css = resolve_dependencies(css, dependencies, root, abs_path)?;
    }

    if let Some(map) = source_map.as_mut() {
        let json = map.to_json(None).map_err(|err| TransformError::SourceMap {
            path: abs_path.to_path_buf(),
            message: format!("{:?}", err),
        })?;
        css.push_str("\n/*# sourceMappingURL=data:application/json;base64,");
        css.push_str(&STANDARD.encode(json.as_bytes()));
        css.push_str(" */");
    }

    let warnings = warnings
        .read()
        .map(|list| list.iter().map(ToString::to_string).collect())
        .unwrap_or_default();

    Ok(EngineOutput { css, exports: printed.exports, reads, warnings })
}

struct Printed {
    code: String,
    exports: Option<CssModuleExports>,
    dependencies: Option<Vec<Dependency>>,
}

fn finish(
    mut stylesheet: StyleSheet,
    abs_path: &Path,
    root_str: &str,
    targets: Targets,
    options: &Options,
    source_map: Option<&mut SourceMap>,
) -> Result<Printed, TransformError> {
    stylesheet
        .minify(MinifyOptions { targets, ..Default::default() })
        .map_err(|err| TransformError::Minify {
            path: abs_path.to_path_buf(),
            message: format!("{:?}", err),
        })?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: options.minify,
            project_root: Some(root_str),
            targets,
            analyze_dependencies: options.force_inline_images.then(DependencyOptions::default),
            source_map,
            ..Default::default()
        })
        .map_err(|err| TransformError::Print {
            path: abs_path.to_path_buf(),
            message: format!("{:?}", err),
        })?;
    Ok(Printed {
        code: result.code,
        exports: result.exports,
        dependencies: result.dependencies,
    })
}

/// Replace engine dependency placeholders with final urls: local images
/// become data URIs, external urls and remaining imports are restored
/// unchanged.
fn resolve_dependencies(
    mut css: String,
    dependencies: &[Dependency],
    root: &Path,
    abs_path: &Path,
) -> Result<String, TransformError> {
    for dependency in dependencies {
        match dependency {
            Dependency::Url(url_dep) => {
                let replacement = if is_external_url(&url_dep.url) {
                    url_dep.url.clone()
                } else {
                    let declaring = root.join(&url_dep.loc.file_path);
                    let base = declaring.parent().unwrap_or(root);
                    let asset = base.join(&url_dep.url).clean();
                    match image_mime(&asset) {
                        Some(mime) => {
                            let bytes =
                                std::fs::read(&asset).map_err(|err| TransformError::AssetRead {
                                    path: asset.clone(),
                                    from: abs_path.to_path_buf(),
                                    source: err,
                                })?;
                            format!("data:{};base64,{}", mime, STANDARD.encode(&bytes))
                        }
                        None => url_dep.url.clone(),
                    }
                };
                css = css.replace(&url_dep.placeholder, &replacement);
            }
            Dependency::Import(import_dep) => {
                css = css.replace(&import_dep.placeholder, &import_dep.url);
            }
        }
    }
    Ok(css)
}

fn is_external_url(url: &str) -> bool {
    url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
        || url.starts_with("data:")
        || url.starts_with('#')
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        _ => return None,
    };
    Some(mime)
}

/// Build the sorted export table from raw engine exports. Class lists stay
/// empty here; composes resolution fills them in.
pub(crate) fn export_skeleton(raw: Option<CssModuleExports>) -> ExportTable {
    let mut entries: Vec<_> = raw.map(|map| map.into_iter().collect()).unwrap_or_default();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut table = ExportTable::with_capacity(entries.len());
    for (origin, export) in entries {
        let composes = export
            .composes
            .into_iter()
            .map(|reference| match reference {
                CssModuleReference::Local { name } => ComposeRef::Local { name },
                CssModuleReference::Global { name } => ComposeRef::Global { name },
                CssModuleReference::Dependency { name, specifier } => {
                    ComposeRef::Dependency { name, specifier }
                }
            })
            .collect();
        table.insert(
            origin.clone(),
            ClassExport { origin, generated: export.name, composes, class_list: String::new() },
        );
    }
    table
}

/// File-basename part of the default naming pattern, sanitized to
/// `[a-zA-Z0-9-]` with leading dashes stripped.
pub(crate) fn scoped_name_prefix(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    sanitized.trim_start_matches('-').to_string()
}

/// Package-version part of the default naming pattern, alphanumerics only.
pub(crate) fn version_suffix(version: &str) -> String {
    version.chars().filter(char::is_ascii_alphanumeric).collect()
}

pub(crate) fn default_pattern(prefix: &str, suffix: &str) -> String {
    format!("{}__[local]_[hash]__{}", prefix, suffix)
}

/// Bundler source provider rooted at the build root.
///
/// Relative reads (the entry) resolve against the root; `@import`
/// specifiers resolve against their importing file. Every read is recorded
/// so bundled files can be registered as dependencies of the entry.
struct RootedProvider {
    root: PathBuf,
    inner: FileProvider,
    reads: Mutex<Vec<PathBuf>>,
}

impl RootedProvider {
    fn new(root: PathBuf) -> Self {
        RootedProvider { root, inner: FileProvider::new(), reads: Mutex::new(Vec::new()) }
    }

    /// Absolute paths read so far, in first-read order.
    fn reads(&self) -> Vec<PathBuf> {
        self.reads.lock().clone()
    }

    fn absolutize(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf().clean()
        } else {
            self.root.join(file).clean()
        }
    }
}

impl SourceProvider for RootedProvider {
    type Error = std::io::Error;

    fn read<'a>(&'a self, file: &Path) -> Result<&'a str, Self::Error> {
        let abs = self.absolutize(file);
        self.reads.lock().push(abs.clone());
        self.inner.read(&abs)
    }

    fn resolve(&self, specifier: &str, originating_file: &Path) -> Result<PathBuf, Self::Error> {
        let origin = self.absolutize(originating_file);
        let base = origin.parent().unwrap_or(&self.root);
        Ok(base.join(specifier).clean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightningcss::css_modules::CssModuleExport;
    use lightningcss::dependencies::{ImportDependency, Location, SourceRange, UrlDependency};

    #[test]
    fn test_scoped_name_prefix_sanitizes() {
        assert_eq!(scoped_name_prefix(Path::new("app.modules.css")), "app-modules");
        assert_eq!(scoped_name_prefix(Path::new("src/Hello World.module.css")), "Hello-World-module");
        assert_eq!(scoped_name_prefix(Path::new("--lead.module.css")), "lead-module");
        assert_eq!(scoped_name_prefix(Path::new("trail-.module.css")), "trail--module");
    }

    #[test]
    fn test_version_suffix_strips_separators() {
        assert_eq!(version_suffix("1.2.3"), "123");
        assert_eq!(version_suffix("2.0.0-beta.1"), "200beta1");
        assert_eq!(version_suffix(""), "");
    }

    #[test]
    fn test_default_pattern_shape() {
        assert_eq!(default_pattern("app-modules", "123"), "app-modules__[local]_[hash]__123");
    }

    #[test]
    fn test_is_external_url() {
        assert!(is_external_url("https://cdn.example.com/x.png"));
        assert!(is_external_url("//cdn.example.com/x.png"));
        assert!(is_external_url("data:image/png;base64,AAAA"));
        assert!(is_external_url("#gradient"));
        assert!(!is_external_url("./x.png"));
        assert!(!is_external_url("images/x.png"));
    }

    #[test]
    fn test_image_mime_by_extension() {
        assert_eq!(image_mime(Path::new("a.png")), Some("image/png"));
        assert_eq!(image_mime(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(image_mime(Path::new("a.svg")), Some("image/svg+xml"));
        assert_eq!(image_mime(Path::new("a.woff2")), None);
        assert_eq!(image_mime(Path::new("noext")), None);
    }

    #[test]
    fn test_export_skeleton_sorts_and_maps() {
        let mut raw = CssModuleExports::default();
        raw.insert(
            "zed".to_string(),
            CssModuleExport {
                name: "p__zed_h".to_string(),
                composes: vec![CssModuleReference::Local { name: "p__base_h".to_string() }],
                is_referenced: false,
            },
        );
        raw.insert(
            "base".to_string(),
            CssModuleExport {
                name: "p__base_h".to_string(),
                composes: Vec::new(),
                is_referenced: true,
            },
        );

        let table = export_skeleton(Some(raw));
        let origins: Vec<&str> = table.keys().map(String::as_str).collect();
        assert_eq!(origins, vec!["base", "zed"]);
        assert_eq!(table["zed"].generated, "p__zed_h");
        assert_eq!(
            table["zed"].composes,
            vec![ComposeRef::Local { name: "p__base_h".to_string() }]
        );
        assert!(table["zed"].class_list.is_empty());
        assert!(export_skeleton(None).is_empty());
    }

    fn range(file_path: &str) -> SourceRange {
        SourceRange {
            file_path: file_path.to_string(),
            start: Location { line: 1, column: 1 },
            end: Location { line: 1, column: 1 },
        }
    }

    #[test]
    fn test_resolve_dependencies_restores_external_and_imports() {
        let css = "@import \"IMPORT_PH\";\n.a { background: url(URL_PH); }".to_string();
        let deps = vec![
            Dependency::Import(ImportDependency {
                url: "./theme.css".to_string(),
                placeholder: "IMPORT_PH".to_string(),
                supports: None,
                media: None,
                loc: range("a.modules.css"),
            }),
            Dependency::Url(UrlDependency {
                url: "https://cdn.example.com/bg.png".to_string(),
                placeholder: "URL_PH".to_string(),
                loc: range("a.modules.css"),
            }),
        ];
        let out =
            resolve_dependencies(css, &deps, Path::new("/root"), Path::new("/root/a.modules.css"))
                .unwrap();
        assert!(out.contains("@import \"./theme.css\";"));
        assert!(out.contains("url(https://cdn.example.com/bg.png)"));
        assert!(!out.contains("URL_PH"));
    }

    #[test]
    fn test_resolve_dependencies_inlines_local_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dot.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let css = ".a { background: url(URL_PH); }".to_string();
        let deps = vec![Dependency::Url(UrlDependency {
            url: "./dot.png".to_string(),
            placeholder: "URL_PH".to_string(),
            loc: range("a.modules.css"),
        })];
        let entry = dir.path().join("a.modules.css");
        let out = resolve_dependencies(css, &deps, dir.path(), &entry).unwrap();
        assert!(out.contains("url(data:image/png;base64,iVBORw==)"));
    }

    #[test]
    fn test_resolve_dependencies_missing_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let css = ".a { background: url(URL_PH); }".to_string();
        let deps = vec![Dependency::Url(UrlDependency {
            url: "./gone.png".to_string(),
            placeholder: "URL_PH".to_string(),
            loc: range("a.modules.css"),
        })];
        let entry = dir.path().join("a.modules.css");
        let err = resolve_dependencies(css, &deps, dir.path(), &entry).unwrap_err();
        assert!(matches!(err, TransformError::AssetRead { .. }));
    }

    #[test]
    fn test_resolve_dependencies_keeps_non_image_urls() {
        let css = ".a { src: url(URL_PH); }".to_string();
        let deps = vec![Dependency::Url(UrlDependency {
            url: "./font.woff2".to_string(),
            placeholder: "URL_PH".to_string(),
            loc: range("a.modules.css"),
        })];
        let out =
            resolve_dependencies(css, &deps, Path::new("/root"), Path::new("/root/a.modules.css"))
                .unwrap();
        assert!(out.contains("url(./font.woff2)"));
    }

    #[test]
    fn test_run_engine_scopes_classes() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("a.modules.css");
        let source = ".btn { color: red }";
        let options = Options::new().with_bundle(false);

        let output =
            run_engine(dir.path(), &entry, source, "x__[local]", &options).unwrap();
        assert!(output.css.contains(".x__btn"));
        let table = export_skeleton(output.exports);
        assert_eq!(table["btn"].generated, "x__btn");
        assert!(output.reads.is_empty());
    }

    #[test]
    fn test_run_engine_recovers_from_bad_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("a.modules.css");
        let source = ".btn { color: }\n.ok { margin: 0 }";
        let options = Options::new().with_bundle(false);

        let output =
            run_engine(dir.path(), &entry, source, "x__[local]", &options).unwrap();
        assert!(output.css.contains(".x__ok"));
        assert!(!output.warnings.is_empty());
    }
}
