//! Injector snippet generation.
//!
//! Renders the `inject()` function that carries a stylesheet into the
//! document at runtime. Injection is deferred onto a macrotask so it runs
//! after the importing module graph finishes evaluating, and the
//! `id="_<digest>"` existence check keeps repeated calls from inserting
//! duplicate style elements.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::emit::js_string;
use crate::options::InjectMode;

/// Escaped newlines, raw newlines, and block comments inside a quoted CSS
/// literal. Stripping them keeps the inlined content on one line.
static CSS_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\\n|\n|/\*.+?\*/)").expect("valid noise pattern"));

/// Collapse a JSON-quoted CSS literal onto a single line.
pub(crate) fn simple_minify_css(css_literal: &str) -> String {
    CSS_NOISE.replace_all(css_literal, "").into_owned()
}

/// Render the injector snippet for one stylesheet, or `None` when
/// injection is off. `css` and `digest` are spliced in as string literals;
/// the snippet declares `content`, `digest`, and `inject`.
pub(crate) fn injector_snippet(css: &str, digest: &str, mode: &InjectMode) -> Option<String> {
    let body = match mode {
        InjectMode::Off => return None,
        InjectMode::Container(selector) => default_body(selector),
        InjectMode::Custom(generator) => format!("    {}", generator("content", "digest")),
    };
    let content = simple_minify_css(&js_string(css));
    let digest = js_string(digest);
    Some(format!(
        r#"const content = {content};
const digest = {digest};
const inject = () => {{
  setTimeout(() => {{
{body}
  }}, 0);
}};
"#
    ))
}

fn default_body(selector: &str) -> String {
    format!(
        r##"    if (!globalThis.document) {{
      return;
    }}
    let root = globalThis.document.querySelector({selector});
    if (root && root.shadowRoot) {{
      root = root.shadowRoot;
    }}
    if (!root) {{
      root = globalThis.document.head;
    }}
    let container = root.querySelector("#_" + digest);
    if (!container) {{
      container = globalThis.document.createElement("style");
      container.id = "_" + digest;
      const text = globalThis.document.createTextNode(content);
      container.appendChild(text);
      root.appendChild(container);
    }}"##,
        selector = js_string(selector)
    )
}
