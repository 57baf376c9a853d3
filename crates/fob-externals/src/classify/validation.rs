//! Whether a resolved file can be loaded by the runtime as-is.
//!
//! An external import is only useful if the runtime can load the target file
//! without a build step. Type declarations, TypeScript, framework components,
//! and ESM source hiding behind a `.js` extension in a CommonJS package all
//! need the bundler, so they are inlined instead.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::descriptor::find_nearest_descriptor;
use crate::runtime::Runtime;

/// Extensions the runtime loads natively regardless of package type.
const NATIVE_EXTENSIONS: &[&str] = &["mjs", "cjs", "node", "wasm"];

/// Modules provided by the runtime itself.
const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

static ESM_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)(?:[\s;]|^)(?:import[\s\w*,{}]*from|import\s*["'*{]|export\b\s*(?:[*{]|default|class|type|function|const|var|let|async function)|import\.meta\b)"#,
    )
    .expect("ESM syntax pattern is valid")
});

static COMMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("comment pattern is valid")
});

/// Paths conventionally used for ESM builds (`index.esm.js`, `/es/`, ...).
static ESM_BUILD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(\w+-)?esm?(-\w+)?\.js$|/(esm?)/").expect("ESM path pattern is valid")
});

/// `fs`, `node:fs`, `fs/promises`.
pub fn is_node_builtin(id: &str) -> bool {
    if id.starts_with("node:") {
        return true;
    }
    let base = id.split('/').next().unwrap_or(id);
    NODE_BUILTINS.contains(&base)
}

/// Whether `code` contains ESM `import`/`export` syntax outside comments.
pub fn has_esm_syntax(code: &str) -> bool {
    let stripped = COMMENTS.replace_all(code, "");
    ESM_SYNTAX.is_match(&stripped)
}

/// Decide whether the resolved file `path` is loadable without bundling.
///
/// Unreadable sources are treated as CommonJS.
pub async fn is_valid_node_import(runtime: &dyn Runtime, path: &Path) -> bool {
    let id = path.to_string_lossy();
    if is_node_builtin(&id) {
        return true;
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    if NATIVE_EXTENSIONS.contains(&extension) {
        return true;
    }
    if extension != "js" {
        return false;
    }

    if let Some(descriptor) = find_nearest_descriptor(runtime, path).await {
        if descriptor.module_type() == Some("module") {
            return true;
        }
    }

    if ESM_BUILD_PATH.is_match(&id.replace('\\', "/")) {
        return false;
    }

    let code = runtime
        .read_file(path)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();

    !has_esm_syntax(&code)
}
