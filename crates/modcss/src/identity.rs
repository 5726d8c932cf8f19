//! Build identity and per-file digests using BLAKE3 content-addressed hashing.
//!
//! The build identity is a deterministic hash of the logical build inputs,
//! so generated class-name hashes and injected-style element ids reproduce
//! across machines and CI runs. Output-location fields (outdir, outfile,
//! working directory) are deliberately absent from [`BuildInputs`] so moving
//! the output never changes the identity.

use std::path::{Path, PathBuf};

use blake3::Hasher;
use path_clean::PathClean;

use crate::error::IdentityError;
use crate::options::PackageInfo;

/// Current identity format version. Increment when the hashed layout changes.
const IDENTITY_FORMAT_VERSION: u32 = 1;

/// Namespace prefix mixed into every per-artifact digest.
const DIGEST_PREFIX: &str = "modcss";

/// Hex length of a per-file digest (style element ids stay short).
const DIGEST_LEN: usize = 32;

/// Stable fingerprint of the logical build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildId(String);

impl BuildId {
    /// Get the identity as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry point of the host build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Optional output name for named entries.
    pub name: Option<String>,
    /// Path to the entry file, absolute or relative to the build root.
    pub path: PathBuf,
}

/// The subset of the host build configuration that affects output bytes.
///
/// Only the fields here participate in the build identity: entry-point
/// contents, format/target/externals/loader settings, and naming templates.
#[derive(Debug, Clone, Default)]
pub struct BuildInputs {
    /// Build root directory. Only its basename participates in the identity.
    pub root: PathBuf,
    /// Entry points of the host build.
    pub entry_points: Vec<EntryPoint>,
    /// Output module format (`esm`, `cjs`, `iife`).
    pub format: Option<String>,
    /// Compilation targets (`es2020`, `chrome112`, ...).
    pub targets: Vec<String>,
    /// Import specifiers treated as external.
    pub externals: Vec<String>,
    /// Extension to loader mapping (`.jpg` -> `file`).
    pub loaders: Vec<(String, String)>,
    /// Entry naming template of the host build.
    pub entry_names: Option<String>,
    /// Asset naming template of the host build.
    pub asset_names: Option<String>,
}

impl BuildInputs {
    /// Create inputs rooted at `root` with no entries.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Add a plain entry point.
    pub fn entry(mut self, path: impl Into<PathBuf>) -> Self {
        self.entry_points.push(EntryPoint {
            name: None,
            path: path.into(),
        });
        self
    }

    /// Add a named entry point.
    pub fn named_entry(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entry_points.push(EntryPoint {
            name: Some(name.into()),
            path: path.into(),
        });
        self
    }

    /// Set the output module format.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Add a compilation target.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Mark an import specifier as external.
    pub fn external(mut self, specifier: impl Into<String>) -> Self {
        self.externals.push(specifier.into());
        self
    }

    /// Map a file extension to a loader.
    pub fn loader(mut self, ext: impl Into<String>, loader: impl Into<String>) -> Self {
        self.loaders.push((ext.into(), loader.into()));
        self
    }

    /// Set the entry naming template.
    pub fn entry_names(mut self, template: impl Into<String>) -> Self {
        self.entry_names = Some(template.into());
        self
    }

    /// Set the asset naming template.
    pub fn asset_names(mut self, template: impl Into<String>) -> Self {
        self.asset_names = Some(template.into());
        self
    }
}

/// Compute the build identity.
///
/// The identity is a BLAKE3 hash of:
/// 1. Identity format version and crate version
/// 2. Basename of the build root
/// 3. Sorted entry names, paths, and content hashes
/// 4. Format, targets, externals, loaders, naming templates
/// 5. Package name and version
///
/// `root` is the already-resolved build root; entries resolve against it.
/// An unreadable entry is an error: the identity is a pure function of
/// entry contents, and a silently skipped file would change every generated
/// class name on the machine where it exists.
pub fn compute_build_id(
    root: &Path,
    inputs: &BuildInputs,
    package: &PackageInfo,
) -> Result<BuildId, IdentityError> {
    let mut hasher = Hasher::new();

    hasher.update(&IDENTITY_FORMAT_VERSION.to_le_bytes());
    hash_field(&mut hasher, env!("CARGO_PKG_VERSION"));

    // Basename only: the identity must not change when the tree moves.
    let base = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    hash_field(&mut hasher, &base);

    hash_entries(&mut hasher, root, inputs)?;

    hash_field(&mut hasher, inputs.format.as_deref().unwrap_or(""));
    hash_sorted(&mut hasher, &inputs.targets);
    hash_sorted(&mut hasher, &inputs.externals);
    hash_loaders(&mut hasher, &inputs.loaders);
    hash_field(&mut hasher, inputs.entry_names.as_deref().unwrap_or(""));
    hash_field(&mut hasher, inputs.asset_names.as_deref().unwrap_or(""));

    hash_field(&mut hasher, &package.name);
    hash_field(&mut hasher, &package.version);

    Ok(BuildId(hasher.finalize().to_hex().to_string()))
}

/// Stable per-artifact digest of `modcss:<buildId>:<s>`.
///
/// Used to name injected `<style>` elements and anywhere a short
/// deterministic per-file id is needed.
pub fn digest(build_id: &BuildId, s: &str) -> String {
    let preimage = format!("{DIGEST_PREFIX}:{}:{s}", build_id.as_str());
    let hex = blake3::hash(preimage.as_bytes()).to_hex();
    hex[..DIGEST_LEN].to_string()
}

/// Hash entry files (names + paths + content), sorted for determinism.
fn hash_entries(
    hasher: &mut Hasher,
    root: &Path,
    inputs: &BuildInputs,
) -> Result<(), IdentityError> {
    let mut entries: Vec<(String, &EntryPoint)> = inputs
        .entry_points
        .iter()
        .map(|e| (root_relative(root, &e.path), e))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (rel, entry) in entries {
        hash_field(hasher, entry.name.as_deref().unwrap_or(""));
        hash_field(hasher, &rel);

        let full = if entry.path.is_absolute() {
            entry.path.clean()
        } else {
            root.join(&entry.path).clean()
        };
        let content = std::fs::read(&full).map_err(|source| IdentityError::EntryRead {
            path: full.clone(),
            source,
        })?;
        hasher.update(blake3::hash(&content).as_bytes());
    }

    Ok(())
}

fn hash_field(hasher: &mut Hasher, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update(b"\0");
}

fn hash_sorted(hasher: &mut Hasher, values: &[String]) {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    for value in sorted {
        hash_field(hasher, value);
    }
}

fn hash_loaders(hasher: &mut Hasher, loaders: &[(String, String)]) {
    let mut sorted: Vec<(&str, &str)> = loaders
        .iter()
        .map(|(ext, loader)| (ext.as_str(), loader.as_str()))
        .collect();
    sorted.sort_unstable();
    for (ext, loader) in sorted {
        hash_field(hasher, ext);
        hash_field(hasher, loader);
    }
}

/// Path relative to the build root, cleaned, with forward slashes.
///
/// Relative paths keep generated `[hash]` values and digests machine
/// independent. Paths outside the root stay absolute.
pub(crate) fn root_relative(root: &Path, path: &Path) -> String {
    let cleaned = path.clean();
    let rel = cleaned.strip_prefix(root).unwrap_or(&cleaned);
    let display = rel.to_string_lossy();
    if cfg!(windows) {
        display.replace('\\', "/")
    } else {
        display.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn package() -> PackageInfo {
        PackageInfo {
            name: "demo".to_string(),
            version: "1.2.3".to_string(),
        }
    }

    fn write_entries(dir: &TempDir) {
        fs::write(dir.path().join("app.jsx"), "import './a.modules.css';").unwrap();
        fs::write(dir.path().join("admin.jsx"), "export default 1;").unwrap();
    }

    #[test]
    fn test_build_id_deterministic() {
        let dir = TempDir::new().unwrap();
        write_entries(&dir);

        let inputs = BuildInputs::new(dir.path())
            .entry("app.jsx")
            .entry("admin.jsx")
            .format("esm")
            .target("es2020");

        let a = compute_build_id(dir.path(), &inputs, &package()).unwrap();
        let b = compute_build_id(dir.path(), &inputs, &package()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_id_ignores_entry_order() {
        let dir = TempDir::new().unwrap();
        write_entries(&dir);

        let forward = BuildInputs::new(dir.path()).entry("app.jsx").entry("admin.jsx");
        let reverse = BuildInputs::new(dir.path()).entry("admin.jsx").entry("app.jsx");

        let a = compute_build_id(dir.path(), &forward, &package()).unwrap();
        let b = compute_build_id(dir.path(), &reverse, &package()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_id_changes_on_entry_content_change() {
        let dir = TempDir::new().unwrap();
        write_entries(&dir);
        let inputs = BuildInputs::new(dir.path()).entry("app.jsx");

        let before = compute_build_id(dir.path(), &inputs, &package()).unwrap();
        fs::write(dir.path().join("app.jsx"), "import './b.modules.css';").unwrap();
        let after = compute_build_id(dir.path(), &inputs, &package()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_build_id_changes_on_package_version() {
        let dir = TempDir::new().unwrap();
        write_entries(&dir);
        let inputs = BuildInputs::new(dir.path()).entry("app.jsx");

        let a = compute_build_id(dir.path(), &inputs, &package()).unwrap();
        let bumped = PackageInfo {
            name: "demo".to_string(),
            version: "1.2.4".to_string(),
        };
        let b = compute_build_id(dir.path(), &inputs, &bumped).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_build_id_uses_root_basename_not_location() {
        let parent_a = TempDir::new().unwrap();
        let parent_b = TempDir::new().unwrap();
        let root_a = parent_a.path().join("project");
        let root_b = parent_b.path().join("project");
        fs::create_dir(&root_a).unwrap();
        fs::create_dir(&root_b).unwrap();
        fs::write(root_a.join("app.jsx"), "same").unwrap();
        fs::write(root_b.join("app.jsx"), "same").unwrap();

        let a = compute_build_id(
            &root_a,
            &BuildInputs::new(&root_a).entry("app.jsx"),
            &package(),
        )
        .unwrap();
        let b = compute_build_id(
            &root_b,
            &BuildInputs::new(&root_b).entry("app.jsx"),
            &package(),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let inputs = BuildInputs::new(dir.path()).entry("nope.jsx");
        let err = compute_build_id(dir.path(), &inputs, &package()).unwrap_err();
        let IdentityError::EntryRead { path, .. } = err;
        assert!(path.ends_with("nope.jsx"));
    }

    #[test]
    fn test_digest_shape_and_stability() {
        let dir = TempDir::new().unwrap();
        write_entries(&dir);
        let inputs = BuildInputs::new(dir.path()).entry("app.jsx");
        let id = compute_build_id(dir.path(), &inputs, &package()).unwrap();

        let d1 = digest(&id, "styles/app.modules.css");
        let d2 = digest(&id, "styles/app.modules.css");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 32);
        assert!(d1.chars().all(|c| c.is_ascii_hexdigit()));

        let other = digest(&id, "styles/other.modules.css");
        assert_ne!(d1, other);
    }

    #[test]
    fn test_root_relative_normalizes() {
        let rel = root_relative(Path::new("/work/app"), Path::new("/work/app/styles/./x.css"));
        assert_eq!(rel, "styles/x.css");

        // Outside the root stays absolute.
        let out = root_relative(Path::new("/work/app"), Path::new("/elsewhere/x.css"));
        assert_eq!(out, "/elsewhere/x.css");
    }
}
