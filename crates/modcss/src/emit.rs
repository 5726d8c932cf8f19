//! Companion-module emission.
//!
//! Turns an export table into the JS module consumers import in place of
//! the CSS file: optional named-export bindings, a default object mapping
//! every exposed key to its class-name string, and, when injection is on,
//! per-key getters that run `inject()` before returning the value so CSS
//! reaches the document on first use. All interpolated strings are
//! JSON-encoded; class names cannot break out of the generated source.

use std::path::Path;

use crate::error::NamingError;
use crate::inject;
use crate::names::{self, ExportSurface, SurfaceValue};
use crate::options::Options;
use crate::transform::ExportTable;

/// No-op source map appended to every generated module. Host bundlers
/// otherwise try (and fail) to locate a real map for synthesized sources.
pub(crate) const EMPTY_SOURCE_MAP_COMMENT: &str = "//# sourceMappingURL=data:application/json;base64,eyJ2ZXJzaW9uIjozLCJzb3VyY2VzIjpbIiJdLCJtYXBwaW5ncyI6IkEifQ==";

/// JSON-encode a string as a JS literal, quotes included.
pub(crate) fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// Generated companion sources for one stylesheet.
#[derive(Debug, Clone)]
pub(crate) struct EmitOutput {
    pub js: String,
    pub dts: Option<String>,
}

/// Render the companion module for `exports`.
///
/// `path` only feeds error reporting; `css` and `digest` feed the injector
/// snippet when injection is enabled.
pub(crate) fn emit_module(
    exports: &ExportTable,
    css: &str,
    digest: &str,
    options: &Options,
    path: &Path,
) -> Result<EmitOutput, NamingError> {
    let surface = names::build_surface(
        exports
            .iter()
            .map(|(origin, export)| (origin.as_str(), export.class_list.as_str())),
        options.locals_convention,
        options.named_exports,
        path,
    )?;

    let mut js = String::new();
    if let Some(snippet) = inject::injector_snippet(css, digest, &options.inject) {
        js.push_str(&snippet);
        js.push('\n');
    }

    for (name, class_list) in &surface.consts {
        js.push_str("export const ");
        js.push_str(name);
        js.push_str(" = ");
        js.push_str(&js_string(class_list));
        js.push_str(";\n");
    }
    if !surface.consts.is_empty() {
        js.push('\n');
    }

    let inject_reads = options.inject.enabled();
    if surface.entries.is_empty() {
        js.push_str("export default {};\n");
    } else {
        js.push_str("export default {\n");
        let lines: Vec<String> = surface
            .entries
            .iter()
            .map(|(key, value)| {
                let value_src = match value {
                    SurfaceValue::Literal(class_list) => js_string(class_list),
                    SurfaceValue::Ref(name) => name.clone(),
                };
                if inject_reads {
                    format!("  get {}() {{ inject(); return {}; }}", js_string(key), value_src)
                } else {
                    format!("  {}: {}", js_string(key), value_src)
                }
            })
            .collect();
        js.push_str(&lines.join(",\n"));
        js.push_str("\n};\n");
    }
    js.push_str(EMPTY_SOURCE_MAP_COMMENT);
    js.push('\n');

    let dts = options.emit_declaration_file.enabled().then(|| declaration_text(&surface));

    Ok(EmitOutput { js, dts })
}

/// String-typed declarations mirroring the export surface.
fn declaration_text(surface: &ExportSurface) -> String {
    let mut out = String::from("declare const ClassNames: {\n");
    for (key, _) in &surface.entries {
        out.push_str("  ");
        out.push_str(&js_string(key));
        out.push_str(": string,\n");
    }
    out.push_str("};\nexport default ClassNames;\n");
    for (name, _) in &surface.consts {
        out.push_str("export declare const ");
        out.push_str(name);
        out.push_str(": string;\n");
    }
    out
}
