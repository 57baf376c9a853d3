//! Built-in tracer: breadth-first walk over static module references.
//!
//! Each reached JavaScript file is parsed with `oxc_parser`; `import` and
//! `export ... from` declarations, `import("...")` with a literal argument and
//! `require("...")` calls are resolved from the file's directory and followed.
//! Computed specifiers cannot be followed statically and are skipped.

use async_trait::async_trait;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, ExportAllDeclaration, ExportNamedDeclaration, Expression,
    ImportDeclaration, ImportExpression,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{TracedFile, Tracer};
use crate::{Error, Result};
use crate::classify::is_node_builtin;
use crate::context::BuildContext;
use crate::resolver::{ModuleResolver, ResolveKind};
use crate::runtime::Runtime;

/// Upper bound on reached files before the walk stops following references.
pub const DEFAULT_MAX_FILES: usize = 50_000;

/// Extensions whose sources are parsed for further references.
const PARSED_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts"];

/// Default [`Tracer`] built on `oxc_parser` and `oxc_resolver`.
#[derive(Debug, Clone)]
pub struct StaticTracer {
    resolver: Arc<ModuleResolver>,
    runtime: Arc<dyn Runtime>,
    ignore: Vec<String>,
    max_files: usize,
}

impl StaticTracer {
    pub fn new(resolver: Arc<ModuleResolver>, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            resolver,
            runtime,
            ignore: Vec::new(),
            max_files: DEFAULT_MAX_FILES,
        }
    }

    /// Paths containing any of these substrings are recorded as ignored.
    pub fn with_ignore<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().replace('\\', "/");
        self.ignore.iter().any(|pattern| path.contains(pattern.as_str()))
    }

    async fn references(&self, path: &Path) -> Vec<(String, ResolveKind)> {
        let parsable = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PARSED_EXTENSIONS.contains(&ext));
        if !parsable {
            return Vec::new();
        }

        match self.runtime.read_file(path).await {
            Ok(bytes) => collect_references(path, &String::from_utf8_lossy(&bytes)),
            Err(err) => {
                tracing::debug!("[externals] cannot read traced file: {}", err);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Tracer for StaticTracer {
    async fn trace(&self, ctx: &BuildContext, roots: &[PathBuf]) -> Result<Vec<TracedFile>> {
        let mut files: BTreeMap<PathBuf, TracedFile> = BTreeMap::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();

        for root in roots {
            if !root.is_absolute() {
                return Err(Error::Trace(format!(
                    "trace root {} is not an absolute path",
                    root.display()
                )));
            }
            if !files.contains_key(root) {
                files.insert(root.clone(), TracedFile::new(root.clone()));
                queue.push_back(root.clone());
            }
        }

        let mut limit_reported = false;
        while let Some(path) = queue.pop_front() {
            if self.is_ignored(&path) {
                if let Some(file) = files.get_mut(&path) {
                    file.ignored = true;
                }
                continue;
            }

            let Some(dir) = path.parent() else {
                continue;
            };

            for (specifier, kind) in self.references(&path).await {
                if is_node_builtin(&specifier) {
                    continue;
                }
                let Some(target) = self.resolver.resolve_from(dir, &specifier, kind) else {
                    continue;
                };

                if let Some(existing) = files.get_mut(&target) {
                    existing.parents.insert(path.clone());
                    continue;
                }

                if files.len() >= self.max_files {
                    if !limit_reported {
                        ctx.warn(format!(
                            "Trace reached {} files, not following further references",
                            self.max_files
                        ));
                        limit_reported = true;
                    }
                    continue;
                }

                let mut file = TracedFile::new(target.clone());
                file.parents.insert(path.clone());
                files.insert(target.clone(), file);
                queue.push_back(target);
            }
        }

        tracing::debug!(
            "[externals] traced {} files from {} roots",
            files.len(),
            roots.len()
        );

        Ok(files.into_values().collect())
    }
}

/// Collect the static module references of one source file.
///
/// Files that do not parse as modules are retried as CommonJS; a file that
/// parses as neither contributes no references.
pub fn collect_references(path: &Path, source: &str) -> Vec<(String, ResolveKind)> {
    let source_type = SourceType::from_path(path).unwrap_or_default();

    parse_references(source, source_type)
        .or_else(|| parse_references(source, SourceType::cjs()))
        .unwrap_or_default()
}

fn parse_references(source: &str, source_type: SourceType) -> Option<Vec<(String, ResolveKind)>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return None;
    }

    let mut collector = ReferenceCollector::default();
    collector.visit_program(&ret.program);
    Some(collector.references)
}

#[derive(Default)]
struct ReferenceCollector {
    references: Vec<(String, ResolveKind)>,
}

impl ReferenceCollector {
    fn push(&mut self, specifier: &str, kind: ResolveKind) {
        self.references.push((specifier.to_string(), kind));
    }
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        if !decl.import_kind.is_type() {
            self.push(decl.source.value.as_str(), ResolveKind::Import);
        }
        walk::walk_import_declaration(self, decl);
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            if !decl.export_kind.is_type() {
                self.push(source.value.as_str(), ResolveKind::Import);
            }
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        if !decl.export_kind.is_type() {
            self.push(decl.source.value.as_str(), ResolveKind::Import);
        }
        walk::walk_export_all_declaration(self, decl);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &expr.source {
            self.push(lit.value.as_str(), ResolveKind::Import);
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &call.callee {
            if ident.name.as_str() == "require" && call.arguments.len() == 1 {
                if let Some(Argument::StringLiteral(lit)) = call.arguments.first() {
                    self.push(lit.value.as_str(), ResolveKind::Require);
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}
