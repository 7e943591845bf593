//! Detection of third-party packages referenced by generated sources

use super::imports::{extract_imports, is_relative};

/// Node core modules that never need installing
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

const PLATFORM_PREFIXES: &[&str] = &["node:", "bun:", "deno:"];

/// Path aliases and subpath imports that point back into the project
const INTERNAL_PREFIXES: &[&str] = &["@/", "~/", "#", "/"];

/// Whether a plan command installs packages
pub fn is_install_command(command: &str) -> bool {
    command.contains("install") || command.contains("add ") || command.contains(" i ")
}

/// Package root of a bare specifier, or `None` when it is not an installable package.
///
/// `@scope/pkg/deep` reduces to `@scope/pkg`, `lodash/fp` to `lodash`.
pub fn package_name(specifier: &str) -> Option<String> {
    if specifier.is_empty() || is_relative(specifier) {
        return None;
    }
    if PLATFORM_PREFIXES.iter().any(|p| specifier.starts_with(p))
        || INTERNAL_PREFIXES.iter().any(|p| specifier.starts_with(p))
    {
        return None;
    }

    let mut segments = specifier.split('/');
    let first = segments.next()?;

    let name = if first.starts_with('@') {
        let scoped = segments.next().filter(|s| !s.is_empty())?;
        format!("{}/{}", first, scoped)
    } else {
        first.to_string()
    };

    if NODE_BUILTINS.contains(&name.as_str()) {
        return None;
    }
    Some(name)
}

/// Union of packages imported across `contents`, in first-seen order
pub fn detect_external_packages<'a, I>(contents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut packages: Vec<String> = Vec::new();
    for content in contents {
        for specifier in extract_imports(content) {
            if let Some(name) = package_name(&specifier) {
                if !packages.contains(&name) {
                    packages.push(name);
                }
            }
        }
    }
    packages
}
