//! Import extraction and relative specifier resolution

use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

/// Extensions tried, in order, when a specifier omits one
pub const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"];

/// Directory index files tried when a specifier names a directory
pub const INDEX_FILES: &[&str] = &["index.ts", "index.tsx", "index.js", "index.jsx"];

fn import_regex() -> &'static Regex {
    static IMPORT_REGEX: OnceLock<Regex> = OnceLock::new();
    IMPORT_REGEX.get_or_init(|| {
        // static import, side-effect import, dynamic import(), require(), re-export
        Regex::new(
            r#"(?:\bimport\s+[^'";]+?\s+from\s*|\bimport\s*|\bimport\s*\(\s*|\brequire\s*\(\s*|\bexport\s+[^'";]+?\s+from\s*)['"]([^'"\n]+)['"]"#,
        )
        .expect("Invalid import regex")
    })
}

/// Every import-like specifier in `content`, in source order, without duplicates
pub fn extract_imports(content: &str) -> Vec<String> {
    let mut specifiers: Vec<String> = Vec::new();
    for captures in import_regex().captures_iter(content) {
        let Some(spec) = captures.get(1) else {
            continue;
        };
        let spec = spec.as_str().trim();
        if !spec.is_empty() && !specifiers.iter().any(|s| s == spec) {
            specifiers.push(spec.to_string());
        }
    }
    specifiers
}

pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with('.')
}

/// Only the relative (leading dot) specifiers of `content`
pub fn extract_relative_imports(content: &str) -> Vec<String> {
    extract_imports(content)
        .into_iter()
        .filter(|s| is_relative(s))
        .collect()
}

/// Collapses `.`/`..` segments and strips leading separators.
/// Returns `None` when the path climbs above its root.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The universe of file paths a plan creates or modifies.
///
/// Lookups use normalized paths but always hand back the path exactly as the
/// plan spelled it, so graph keys stay identical to plan paths.
#[derive(Debug, Clone, Default)]
pub struct KnownFiles {
    by_normalized: IndexMap<String, String>,
}

impl KnownFiles {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_normalized = IndexMap::new();
        for path in paths {
            let original = path.as_ref();
            if let Some(normalized) = normalize_path(original) {
                by_normalized
                    .entry(normalized)
                    .or_insert_with(|| original.to_string());
            }
        }
        Self { by_normalized }
    }

    pub fn lookup(&self, normalized: &str) -> Option<&str> {
        self.by_normalized.get(normalized).map(String::as_str)
    }

    /// Original plan paths, in first-seen order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_normalized.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_normalized.is_empty()
    }
}

/// Resolves a relative `specifier` imported from `from_file` against the known files.
///
/// Candidates are tried in order: the literal path, the path plus each source
/// extension, then each directory index file. Unknown targets resolve to `None`.
pub fn resolve_import<'a>(
    from_file: &str,
    specifier: &str,
    known: &'a KnownFiles,
) -> Option<&'a str> {
    if !is_relative(specifier) {
        return None;
    }

    let base = normalize_path(parent_dir(from_file))?;
    let joined = if base.is_empty() {
        specifier.to_string()
    } else {
        format!("{}/{}", base, specifier)
    };
    let target = normalize_path(&joined)?;
    if target.is_empty() {
        return None;
    }

    if let Some(found) = known.lookup(&target) {
        return Some(found);
    }

    for ext in SOURCE_EXTENSIONS {
        if let Some(found) = known.lookup(&format!("{}{}", target, ext)) {
            return Some(found);
        }
    }

    INDEX_FILES
        .iter()
        .find_map(|index| known.lookup(&format!("{}/{}", target, index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_all_import_forms() {
        let content = r#"
import { a } from './a';
import type { B } from "../b";
import * as c from 'lodash';
import './side-effect.css';
const d = await import('./lazy');
const e = require("../e");
const fs = require('fs');
export { f } from './f';
export * from '@scope/pkg';
"#;

        let imports = extract_imports(content);
        assert_eq!(
            imports,
            vec![
                "./a",
                "../b",
                "lodash",
                "./side-effect.css",
                "./lazy",
                "../e",
                "fs",
                "./f",
                "@scope/pkg",
            ]
        );

        let relative = extract_relative_imports(content);
        assert_eq!(
            relative,
            vec!["./a", "../b", "./side-effect.css", "./lazy", "../e", "./f"]
        );
    }

    #[test]
    fn test_multiline_named_import() {
        let content = "import {\n  one,\n  two,\n} from './numbers'\n";
        assert_eq!(extract_imports(content), vec!["./numbers"]);
    }

    #[test]
    fn test_duplicates_suppressed() {
        let content = "import a from './x';\nimport { b } from './x';";
        assert_eq!(extract_imports(content), vec!["./x"]);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/./b/../c.ts").as_deref(), Some("a/c.ts"));
        assert_eq!(normalize_path("./src/app.ts").as_deref(), Some("src/app.ts"));
        assert_eq!(normalize_path("../outside.ts"), None);
    }

    #[test]
    fn test_resolution_table() {
        let known = KnownFiles::from_paths([
            "a/utils.ts",
            "a/lib/bar.ts",
            "a/types.ts",
            "a/components/index.ts",
        ]);

        assert_eq!(resolve_import("a/app.ts", "./utils", &known), Some("a/utils.ts"));
        assert_eq!(resolve_import("a/lib/x.ts", "../types", &known), Some("a/types.ts"));
        assert_eq!(
            resolve_import("a/app.ts", "./components", &known),
            Some("a/components/index.ts")
        );
        assert_eq!(resolve_import("a/app.ts", "./missing", &known), None);
        assert_eq!(resolve_import("a/app.ts", "./lib/bar.ts", &known), Some("a/lib/bar.ts"));
    }

    #[test]
    fn test_resolution_keeps_plan_spelling() {
        let known = KnownFiles::from_paths(["./src/types.ts"]);
        assert_eq!(
            resolve_import("src/app.ts", "./types", &known),
            Some("./src/types.ts")
        );
    }

    #[test]
    fn test_non_relative_never_resolves() {
        let known = KnownFiles::from_paths(["react.ts"]);
        assert_eq!(resolve_import("app.ts", "react", &known), None);
    }

    #[test]
    fn test_escaping_root_is_unresolved() {
        let known = KnownFiles::from_paths(["types.ts"]);
        assert_eq!(resolve_import("app.ts", "../types", &known), None);
    }
}
