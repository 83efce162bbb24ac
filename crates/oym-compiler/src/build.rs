//! Directory compilation pass.
//!
//! Walks a source tree, compiles every exercise in parallel and mirrors the
//! tree under the output directory:
//!
//! ```text
//! content/exercises/suites/ex1.tex  ->  cache/exercises/suites/ex1.json
//!                                       static/artifacts/{id}.json
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use oym_cache::{BuildStats, CacheError, IncrementalCache, write_json_atomic};
use rayon::prelude::*;

use crate::compiler::{CompileError, DocumentCompiler};

/// Fatal build error. Per-file failures are counted, not raised.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("input file must be .{extension}: {}", path.display())]
    InputExtension { path: PathBuf, extension: String },
    #[error("cannot read input directory {}: {source}", path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Failure of one source file.
#[derive(Debug, thiserror::Error)]
enum FileError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("document id {0:?} cannot name an artifact bundle")]
    UnsafeId(String),
}

/// Result of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Compiled,
    Skipped,
    Failed,
}

/// Build pass settings.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Root of compiled document JSON; also the cache root.
    pub output_dir: PathBuf,
    /// Where artifact bundles are written.
    pub artifacts_dir: PathBuf,
    /// Source extension without the dot, matched case-insensitively.
    pub extension: String,
    pub incremental: bool,
    pub jobs: usize,
}

/// Compiles a source tree into the output tree.
pub struct Builder<'a> {
    compiler: &'a DocumentCompiler,
    cache: &'a IncrementalCache,
    options: BuildOptions,
}

impl<'a> Builder<'a> {
    #[must_use]
    pub fn new(
        compiler: &'a DocumentCompiler,
        cache: &'a IncrementalCache,
        options: BuildOptions,
    ) -> Self {
        Self {
            compiler,
            cache,
            options,
        }
    }

    /// Compile every source under `input` (a directory or a single file).
    ///
    /// Records the resulting stats in the cache metadata.
    pub fn build(&self, input: &Path) -> Result<BuildStats, BuildError> {
        let sources = self.discover(input)?;
        fs::create_dir_all(&self.options.output_dir).map_err(|source| BuildError::OutputDir {
            path: self.options.output_dir.clone(),
            source,
        })?;

        tracing::info!(
            files = sources.len(),
            incremental = self.options.incremental,
            converter = self.compiler.converter_name(),
            "Starting build"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()?;
        let outcomes: Vec<Outcome> = pool.install(|| {
            sources
                .par_iter()
                .map(|(source, output)| self.process(source, output))
                .collect()
        });

        let mut stats = BuildStats::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Compiled => stats.processed += 1,
                Outcome::Skipped => stats.skipped += 1,
                Outcome::Failed => stats.errors += 1,
            }
        }

        self.cache.update_metadata(stats)?;
        tracing::info!(
            processed = stats.processed,
            skipped = stats.skipped,
            errors = stats.errors,
            "Build finished"
        );
        Ok(stats)
    }

    /// Source files paired with their output paths, sorted by source path.
    fn discover(&self, input: &Path) -> Result<Vec<(PathBuf, PathBuf)>, BuildError> {
        if input.is_file() {
            if !has_extension(input, &self.options.extension) {
                return Err(BuildError::InputExtension {
                    path: input.to_path_buf(),
                    extension: self.options.extension.clone(),
                });
            }
            let output = self.output_path(Path::new(input.file_name().unwrap_or_default()));
            return Ok(vec![(input.to_path_buf(), output)]);
        }
        if !input.exists() {
            return Err(BuildError::InputNotFound(input.to_path_buf()));
        }
        fs::read_dir(input).map_err(|source| BuildError::InputUnreadable {
            path: input.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        collect_sources(input, &self.options.extension, &mut files);
        files.sort();

        Ok(files
            .into_iter()
            .map(|source| {
                let relative = source.strip_prefix(input).unwrap_or(&source);
                let output = self.output_path(relative);
                (source, output)
            })
            .collect())
    }

    /// `{output_dir}/{relative dir}/{stem}.json`.
    fn output_path(&self, relative: &Path) -> PathBuf {
        self.options.output_dir.join(relative).with_extension("json")
    }

    fn process(&self, source: &Path, output: &Path) -> Outcome {
        if self.options.incremental && self.cache.is_up_to_date(source, output) {
            tracing::info!(path = %source.display(), "Skipped (up to date)");
            return Outcome::Skipped;
        }

        match self.compile_one(source, output) {
            Ok(()) => {
                tracing::info!(path = %source.display(), "Compiled");
                Outcome::Compiled
            }
            Err(e) => {
                tracing::warn!(path = %source.display(), "Failed to compile: {e}");
                Outcome::Failed
            }
        }
    }

    fn compile_one(&self, source: &Path, output: &Path) -> Result<(), FileError> {
        let compilation = self.compiler.compile_file(source)?;
        for warning in &compilation.warnings {
            tracing::warn!(path = %source.display(), "{warning}");
        }

        let document = &compilation.document;
        if !compilation.bundle.is_empty() {
            if !is_plain_file_name(&document.id) {
                return Err(FileError::UnsafeId(document.id.clone()));
            }
            let bundle_path = self.options.artifacts_dir.join(format!("{}.json", document.id));
            write_json_atomic(&bundle_path, &compilation.bundle)?;
        }
        self.cache.save(output, document)?;
        Ok(())
    }
}

/// Recursively collect files with `extension`, skipping hidden entries.
fn collect_sources(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            collect_sources(&path, extension, files);
        } else if has_extension(&path, extension) {
            files.push(path);
        }
    }
}

/// True when `name` is one normal path component with no separators.
fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}
