//! Shared test utilities for fob-externals integration tests
//!
//! Fixtures lay out a real project directory (`app/`) with an installed
//! `node_modules` tree next to an empty output directory (`out/`).

#![allow(dead_code)]

use async_trait::async_trait;
use fob_externals::runtime::{FileMetadata, RuntimeResult};
use fob_externals::{
    BuildContext, Classification, ExternalsConfig, ExternalsEngine, ImportCandidate, NativeRuntime, Runtime,
    RuntimeError, TracedFile, Tracer,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// A temporary project with an output directory beside it.
pub struct Fixture {
    _temp: TempDir,
    pub app: PathBuf,
    pub out: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let app = root.join("app");
        std::fs::create_dir_all(app.join("server")).unwrap();
        std::fs::write(app.join("server/index.mjs"), "").unwrap();
        Self {
            _temp: temp,
            app,
            out: root.join("out"),
        }
    }

    /// The bundled entry every root import comes from.
    pub fn entry(&self) -> PathBuf {
        self.app.join("server/index.mjs")
    }

    /// Write `content` to `relative` inside the project.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.app.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Install a package at `dir` (e.g. `node_modules/a/node_modules/lodash`)
    /// with a descriptor and an `index.js` main.
    pub fn package(&self, dir: &str, name: &str, version: &str, index: &str) -> PathBuf {
        self.write(
            &format!("{dir}/package.json"),
            &format!(r#"{{"name":"{name}","version":"{version}","main":"index.js"}}"#),
        );
        self.write(&format!("{dir}/index.js"), index)
    }

    pub fn config(&self) -> ExternalsConfig {
        ExternalsConfig::new(&self.out)
            .with_module_directories([self.app.clone()])
            .with_copy_concurrency(8)
    }

    pub fn engine(&self, config: ExternalsConfig) -> ExternalsEngine {
        ExternalsEngine::new(config).unwrap()
    }

    pub fn out_path(&self, relative: &str) -> PathBuf {
        self.out.join(relative)
    }

    pub fn read_out(&self, relative: &str) -> String {
        std::fs::read_to_string(self.out_path(relative)).unwrap()
    }

    pub fn read_out_json(&self, relative: &str) -> serde_json::Value {
        serde_json::from_str(&self.read_out(relative)).unwrap()
    }

    /// Every entry of the output tree with its kind, without following links.
    pub fn out_listing(&self) -> BTreeMap<PathBuf, &'static str> {
        let mut listing = BTreeMap::new();
        walk(&self.out, &self.out, &mut listing);
        listing
    }
}

fn walk(base: &Path, dir: &Path, listing: &mut BTreeMap<PathBuf, &'static str>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let meta = std::fs::symlink_metadata(&path).unwrap();
        let relative = path.strip_prefix(base).unwrap().to_path_buf();
        if meta.file_type().is_symlink() {
            listing.insert(relative, "link");
        } else if meta.is_dir() {
            listing.insert(relative, "dir");
            walk(base, &path, listing);
        } else {
            listing.insert(relative, "file");
        }
    }
}

/// Classify bare ids imported by the entry.
pub async fn classify_all(
    engine: &ExternalsEngine,
    ctx: &BuildContext,
    fixture: &Fixture,
    ids: &[&str],
) -> Vec<Classification> {
    let mut decisions = Vec::new();
    for id in ids {
        decisions.push(
            engine
                .classify(ctx, &ImportCandidate::new(*id, fixture.entry()))
                .await,
        );
    }
    decisions
}

/// Tracer returning a fixed closure.
#[derive(Debug, Clone)]
pub struct FakeTracer {
    pub files: Vec<TracedFile>,
}

impl FakeTracer {
    pub fn new(files: Vec<TracedFile>) -> Arc<Self> {
        Arc::new(Self { files })
    }
}

#[async_trait]
impl Tracer for FakeTracer {
    async fn trace(
        &self,
        _ctx: &BuildContext,
        _roots: &[PathBuf],
    ) -> fob_externals::Result<Vec<TracedFile>> {
        Ok(self.files.clone())
    }
}

/// How [`FaultyRuntime`] fails copies of its target file.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Fails every attempt with a permission error.
    Permanent,
    /// Fails the first `n` attempts with a transient error.
    Transient(u32),
}

/// Native runtime that fails copies of one source file.
#[derive(Debug)]
pub struct FaultyRuntime {
    inner: NativeRuntime,
    target: PathBuf,
    fault: Fault,
    pub attempts: AtomicU32,
}

impl FaultyRuntime {
    pub fn new(target: impl Into<PathBuf>, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner: NativeRuntime::new(),
            target: target.into(),
            fault,
            attempts: AtomicU32::new(0),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runtime for FaultyRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        self.inner.write_file(path, content).await
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        self.inner.metadata(path).await
    }

    async fn symlink_metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        self.inner.symlink_metadata(path).await
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    async fn canonicalize(&self, path: &Path) -> RuntimeResult<PathBuf> {
        self.inner.canonicalize(path).await
    }

    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()> {
        self.inner.create_dir(path, recursive).await
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> RuntimeResult<()> {
        if from == self.target {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.fault {
                Fault::Permanent => {
                    return Err(RuntimeError::PermissionDenied(from.to_path_buf()));
                }
                Fault::Transient(n) if attempt <= n => {
                    return Err(RuntimeError::Other(format!(
                        "resource busy: {}",
                        from.display()
                    )));
                }
                Fault::Transient(_) => {}
            }
        }
        self.inner.copy_file(from, to).await
    }

    async fn read_link(&self, path: &Path) -> RuntimeResult<PathBuf> {
        self.inner.read_link(path).await
    }

    async fn symlink_dir(&self, target: &Path, link: &Path) -> RuntimeResult<()> {
        self.inner.symlink_dir(target, link).await
    }

    async fn remove_file(&self, path: &Path) -> RuntimeResult<()> {
        self.inner.remove_file(path).await
    }
}
