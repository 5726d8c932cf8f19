//! Error types for the transform pipeline.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for pipeline construction and per-file transforms.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Naming(#[from] NamingError),
}

/// Invalid option combinations, detected eagerly before any file is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`inject` and `namedExports` cannot be used at the same time")]
    InjectWithNamedExports,

    #[error("naming pattern must contain `[local]`: {0}")]
    PatternMissingLocal(String),

    #[error("invalid naming pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("build root is not a directory: {0}")]
    RootNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while computing the build identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read entry point {}: {source}", path.display())]
    EntryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while transforming a single CSS file. Other files may still
/// transform; nothing is written for the failed one.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to minify {}: {message}", path.display())]
    Minify { path: PathBuf, message: String },

    #[error("failed to print {}: {message}", path.display())]
    Print { path: PathBuf, message: String },

    #[error("failed to build source map for {}: {message}", path.display())]
    SourceMap { path: PathBuf, message: String },

    #[error("failed to read asset {} referenced from {}: {source}", path.display(), from.display())]
    AssetRead {
        path: PathBuf,
        from: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown composes target `{name}` in {specifier} (referenced from {})", path.display())]
    UnknownComposes {
        path: PathBuf,
        specifier: String,
        name: String,
    },

    #[error("circular composes chain: {}", format_cycle(chain))]
    ComposeCycle { chain: Vec<PathBuf> },
}

/// A derived export identifier collides with a reserved JS keyword in
/// named-exports mode. Names the identifier and file so the user can rename
/// the source class.
#[derive(Debug, Error)]
#[error("class name cannot be a js keyword: `{name}` in {}", path.display())]
pub struct NamingError {
    pub name: String,
    pub path: PathBuf,
}

fn format_cycle(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl Error {
    /// Path of the file this error belongs to, when the error is tied to one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Config(_) => None,
            Error::Identity(IdentityError::EntryRead { path, .. }) => Some(path),
            Error::Transform(e) => match e {
                TransformError::Read { path, .. }
                | TransformError::Parse { path, .. }
                | TransformError::Minify { path, .. }
                | TransformError::Print { path, .. }
                | TransformError::SourceMap { path, .. }
                | TransformError::UnknownComposes { path, .. } => Some(path),
                TransformError::AssetRead { from, .. } => Some(from),
                TransformError::ComposeCycle { chain } => chain.first().map(PathBuf::as_path),
            },
            Error::Naming(NamingError { path, .. }) => Some(path),
        }
    }
}
