//! Export-name derivation: case conventions, keyword safety, and the
//! ordered export surface of the companion module.
//!
//! Conversion follows the word-splitting rules JS tooling inherited from
//! lodash: runs of letters split at case transitions, trailing digits stick
//! to a preceding lowercase word, and everything else separates.

use std::path::Path;

use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;

use crate::error::NamingError;

/// Reserved JS identifiers that can never be named-export bindings.
const JS_KEYWORDS: &[&str] = &[
    "await",
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "implements",
    "import",
    "in",
    "instanceof",
    "interface",
    "let",
    "new",
    "null",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "super",
    "switch",
    "static",
    "this",
    "throw",
    "try",
    "true",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
];

static KEYWORD_SET: Lazy<FxHashSet<&'static str>> =
    Lazy::new(|| JS_KEYWORDS.iter().copied().collect());

/// Whether `name` is a reserved JS keyword.
pub fn is_js_keyword(name: &str) -> bool {
    KEYWORD_SET.contains(name)
}

/// How origin class names map onto companion-module keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalsConvention {
    /// Expose the camelCase name and the original name.
    CamelCase,
    /// Expose only the camelCase name (default).
    #[default]
    CamelCaseOnly,
    /// Expose the PascalCase name and the original name.
    PascalCase,
    /// Expose only the PascalCase name.
    PascalCaseOnly,
}

impl LocalsConvention {
    /// Whether the original (non-converted) name stays on the export surface.
    pub fn keeps_origin(&self) -> bool {
        matches!(self, LocalsConvention::CamelCase | LocalsConvention::PascalCase)
    }
}

impl std::str::FromStr for LocalsConvention {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "camelCase" => Ok(LocalsConvention::CamelCase),
            "camelCaseOnly" => Ok(LocalsConvention::CamelCaseOnly),
            "pascalCase" => Ok(LocalsConvention::PascalCase),
            "pascalCaseOnly" => Ok(LocalsConvention::PascalCaseOnly),
            other => Err(format!("invalid locals convention: {}", other)),
        }
    }
}

impl std::fmt::Display for LocalsConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LocalsConvention::CamelCase => "camelCase",
            LocalsConvention::CamelCaseOnly => "camelCaseOnly",
            LocalsConvention::PascalCase => "pascalCase",
            LocalsConvention::PascalCaseOnly => "pascalCaseOnly",
        };
        write!(f, "{}", s)
    }
}

/// Convert an origin class name per the configured convention.
///
/// Deterministic: same name and convention always produce the same output.
pub fn derive_export_name(origin: &str, convention: LocalsConvention) -> String {
    match convention {
        LocalsConvention::CamelCase | LocalsConvention::CamelCaseOnly => camel_case(origin),
        LocalsConvention::PascalCase | LocalsConvention::PascalCaseOnly => pascal_case(origin),
    }
}

/// Split into words the way lodash does for ASCII input.
fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_uppercase() {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_ascii_uppercase() {
                j += 1;
            }
            if j - i >= 2 {
                if j < chars.len() && chars[j].is_ascii_lowercase() {
                    // Last upper of the run starts the next word: "ABCDef" -> ABC, Def
                    out.push(chars[i..j - 1].iter().collect());
                    i = j - 1;
                } else {
                    out.push(chars[i..j].iter().collect());
                    i = j;
                }
            } else {
                // Single upper absorbs following lowercase, then digits.
                let mut k = j;
                while k < chars.len() && chars[k].is_ascii_lowercase() {
                    k += 1;
                }
                if k > j {
                    while k < chars.len() && chars[k].is_ascii_digit() {
                        k += 1;
                    }
                }
                out.push(chars[i..k].iter().collect());
                i = k;
            }
        } else if c.is_ascii_lowercase() {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_ascii_lowercase() {
                j += 1;
            }
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            out.push(chars[i..j].iter().collect());
            i = j;
        } else if c.is_ascii_digit() {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            out.push(chars[i..j].iter().collect());
            i = j;
        } else {
            i += 1;
        }
    }

    out
}

/// lodash-style camelCase: first word lowercased, the rest capitalized.
pub fn camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (index, word) in words(s).into_iter().enumerate() {
        let lower = word.to_ascii_lowercase();
        if index == 0 {
            out.push_str(&lower);
        } else {
            out.push_str(&upper_first(&lower));
        }
    }
    out
}

/// camelCase with the first letter uppercased.
pub fn pascal_case(s: &str) -> String {
    upper_first(&camel_case(s))
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// A value slot on the export surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SurfaceValue {
    /// Class-name string, emitted as a quoted literal.
    Literal(String),
    /// Reference to a named-export binding.
    Ref(String),
}

/// The companion module's export surface in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExportSurface {
    /// `export const <name> = "<classes>";` bindings, deduplicated.
    pub consts: Vec<(String, String)>,
    /// Default-object entries: converted keys first, then kept origin keys,
    /// first occurrence winning on collisions.
    pub entries: Vec<(String, SurfaceValue)>,
}

/// Assemble the export surface from `(origin, class list)` pairs.
///
/// Pairs must arrive sorted by origin name; that ordering is the
/// deduplication contract. Fails when a derived binding would collide with
/// a reserved keyword in named-exports mode.
pub(crate) fn build_surface<'a, I>(
    exports: I,
    convention: LocalsConvention,
    named_exports: bool,
    path: &Path,
) -> Result<ExportSurface, NamingError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut name_set: FxHashSet<String> = FxHashSet::default();
    let mut consts: Vec<(String, String)> = Vec::new();
    let mut js_entries: Vec<(String, SurfaceValue)> = Vec::new();
    let mut origin_entries: Vec<(String, SurfaceValue)> = Vec::new();

    for (origin, class_list) in exports {
        let js_name = derive_export_name(origin, convention);

        if named_exports {
            if is_js_keyword(&js_name) {
                return Err(NamingError {
                    name: js_name,
                    path: path.to_path_buf(),
                });
            }
            if !name_set.contains(&js_name) {
                consts.push((js_name.clone(), class_list.to_string()));
            }
        }

        let value = if named_exports {
            SurfaceValue::Ref(js_name.clone())
        } else {
            SurfaceValue::Literal(class_list.to_string())
        };

        js_entries.push((js_name.clone(), value.clone()));
        if convention.keeps_origin() && origin != js_name {
            origin_entries.push((origin.to_string(), value));
            name_set.insert(origin.to_string());
        }
        name_set.insert(js_name);
    }

    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut entries = Vec::with_capacity(js_entries.len() + origin_entries.len());
    for (key, value) in js_entries.into_iter().chain(origin_entries) {
        if seen.insert(key.clone()) {
            entries.push((key, value));
        }
    }

    Ok(ExportSurface { consts, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_camel_case_matches_lodash() {
        assert_eq!(camel_case("hello-world"), "helloWorld");
        assert_eq!(camel_case("hello_world"), "helloWorld");
        assert_eq!(camel_case("--primary--color--"), "primaryColor");
        assert_eq!(camel_case("helloWorld"), "helloWorld");
        assert_eq!(camel_case("HelloWorld"), "helloWorld");
        assert_eq!(camel_case("ABCDef"), "abcDef");
        assert_eq!(camel_case("ABC2"), "abc2");
        assert_eq!(camel_case("FOO2bar"), "foo2Bar");
        assert_eq!(camel_case("foo2bar"), "foo2Bar");
        assert_eq!(camel_case("foo2"), "foo2");
        assert_eq!(camel_case("2bar"), "2Bar");
        assert_eq!(camel_case("var"), "var");
        assert_eq!(camel_case(""), "");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("hello-world"), "HelloWorld");
        assert_eq!(pascal_case("btn"), "Btn");
        assert_eq!(pascal_case(""), "");
    }

    #[test]
    fn test_convention_parsing_round_trip() {
        for convention in [
            LocalsConvention::CamelCase,
            LocalsConvention::CamelCaseOnly,
            LocalsConvention::PascalCase,
            LocalsConvention::PascalCaseOnly,
        ] {
            assert_eq!(convention.to_string().parse::<LocalsConvention>(), Ok(convention));
        }
        assert!("dashes".parse::<LocalsConvention>().is_err());
    }

    #[test]
    fn test_keyword_set() {
        assert!(is_js_keyword("class"));
        assert!(is_js_keyword("const"));
        assert!(is_js_keyword("yield"));
        assert!(!is_js_keyword("classes"));
        assert!(!is_js_keyword("helloWorld"));
    }

    #[test]
    fn test_surface_camel_case_only_hides_origin() {
        let surface = build_surface(
            [("hello-world", "a b")],
            LocalsConvention::CamelCaseOnly,
            false,
            Path::new("x.modules.css"),
        )
        .unwrap();
        assert_eq!(
            surface.entries,
            vec![("helloWorld".to_string(), SurfaceValue::Literal("a b".to_string()))]
        );
        assert!(surface.consts.is_empty());
    }

    #[test]
    fn test_surface_camel_case_keeps_both_keys() {
        let surface = build_surface(
            [("hello-world", "gen")],
            LocalsConvention::CamelCase,
            false,
            Path::new("x.modules.css"),
        )
        .unwrap();
        let keys: Vec<&str> = surface.entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["helloWorld", "hello-world"]);
        for (_, value) in &surface.entries {
            assert_eq!(value, &SurfaceValue::Literal("gen".to_string()));
        }
    }

    #[test]
    fn test_surface_first_wins_on_collision() {
        // Sorted origin order: "hello-world" < "helloWorld" in ASCII.
        let surface = build_surface(
            [("hello-world", "first"), ("helloWorld", "second")],
            LocalsConvention::CamelCase,
            false,
            Path::new("x.modules.css"),
        )
        .unwrap();
        let hello = surface
            .entries
            .iter()
            .find(|(k, _)| k == "helloWorld")
            .map(|(_, v)| v.clone());
        assert_eq!(hello, Some(SurfaceValue::Literal("first".to_string())));
        assert_eq!(surface.entries.len(), 2);
    }

    #[test]
    fn test_surface_named_exports_dedup_consts() {
        let surface = build_surface(
            [("hello-world", "first"), ("helloWorld", "second")],
            LocalsConvention::CamelCase,
            true,
            Path::new("x.modules.css"),
        )
        .unwrap();
        assert_eq!(surface.consts, vec![("helloWorld".to_string(), "first".to_string())]);
        for (_, value) in &surface.entries {
            assert_eq!(value, &SurfaceValue::Ref("helloWorld".to_string()));
        }
    }

    #[test]
    fn test_surface_rejects_keyword_binding() {
        let err = build_surface(
            [("class", "gen")],
            LocalsConvention::CamelCaseOnly,
            true,
            Path::new("styles/app.modules.css"),
        )
        .unwrap_err();
        assert_eq!(err.name, "class");
        assert!(err.path.ends_with("app.modules.css"));
    }

    #[test]
    fn test_surface_keyword_allowed_without_named_exports() {
        let surface = build_surface(
            [("class", "gen")],
            LocalsConvention::CamelCaseOnly,
            false,
            Path::new("x.modules.css"),
        )
        .unwrap();
        assert_eq!(surface.entries.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// camelCase output never contains separators and is idempotent
        /// over the lowercase names CSS authors actually write.
        #[test]
        fn prop_camel_case_idempotent(s in "[a-z0-9_-]{0,24}") {
            let once = camel_case(&s);
            prop_assert!(once.chars().all(|c| c.is_ascii_alphanumeric()));
            prop_assert_eq!(camel_case(&once), once.clone());
        }

        /// Derivation is a pure function of its inputs.
        #[test]
        fn prop_derive_deterministic(s in "[a-z0-9-]{0,24}") {
            let a = derive_export_name(&s, LocalsConvention::CamelCaseOnly);
            let b = derive_export_name(&s, LocalsConvention::CamelCaseOnly);
            prop_assert_eq!(a, b);
        }
    }
}
