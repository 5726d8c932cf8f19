//! Shared test utilities for modcss tests
//!
//! This module provides common helper functions used across test files
//! to reduce duplication and ensure consistent test patterns.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use modcss::{BuildInputs, Options, Pipeline};
use tempfile::TempDir;

/// Scaffold a demo project: a `package.json`, a JS entry point, and an
/// empty `src/` directory for stylesheets.
pub fn demo_project() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp project");
    fs::write(
        dir.path().join("package.json"),
        r#"{"name": "demo-app", "version": "1.2.3"}"#,
    )
    .expect("write package.json");
    fs::write(dir.path().join("index.jsx"), "export {};").expect("write entry");
    fs::create_dir_all(dir.path().join("src")).expect("create src dir");
    dir
}

/// Write a stylesheet under the project and return its absolute path.
pub fn write_css(dir: &TempDir, relative: &str, css: &str) -> PathBuf {
    let path = dir.path().join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create stylesheet parent dir");
    }
    fs::write(&path, css).expect("write stylesheet");
    path
}

pub fn demo_inputs(dir: &TempDir) -> BuildInputs {
    BuildInputs::new(dir.path()).entry("index.jsx")
}

/// Pipeline over the demo project with default options.
pub fn demo_pipeline(dir: &TempDir) -> Pipeline {
    pipeline_with(dir, Options::new())
}

pub fn pipeline_with(dir: &TempDir, options: Options) -> Pipeline {
    Pipeline::new(options, demo_inputs(dir)).expect("build pipeline")
}

/// Assert that `haystack` contains `needle`, with a preview on failure.
pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected output to contain '{}', but it didn't.\nOutput preview (first 500 chars): {}",
        needle,
        &haystack[..haystack.len().min(500)]
    );
}

/// Assert that `haystack` does NOT contain `needle`.
pub fn assert_not_contains(haystack: &str, needle: &str) {
    assert!(
        !haystack.contains(needle),
        "Expected output NOT to contain '{}', but it did.\nOutput preview (first 500 chars): {}",
        needle,
        &haystack[..haystack.len().min(500)]
    );
}
