//! The denoising pipeline for one artifact.
//!
//! # Flow
//!
//! ```text
//!            ┌─ pool job ─ fill_bucket(ref 1) ─┐
//! run(sink) ─┼─ pool job ─ fill_bucket(ref N) ─┼─ wait ─ diff ─ sink
//!            └─ prepare(target), calling thread┘
//! ```
//!
//! Each reference is fetched and normalized by a pool job that inserts
//! its line hashes into the shared bucket; the calling thread prepares
//! the target meanwhile. Once every reference job has been waited on,
//! the bucket is read without locking (the joins establish the
//! happens-before) and every target line whose hash is absent is handed
//! to the sink, in file order, on the calling thread.
//!
//! A failing reference surfaces after the wait; the target's own
//! failure wins when both fail. Nothing is emitted before all fetches
//! succeeded.

use crate::config::ArtifactConfig;
use crate::error::{Error, Result};
use crate::file::File;
use crate::line::Line;
use crate::log;
use crate::pool::WorkerPool;
use ahash::AHashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

/// Lines per pool job in the filter/normalize passes. Large enough to
/// amortize scheduling, small enough to spread a big log across workers.
const LINE_BATCH: usize = 1000;

/// Denoises one artifact against its references.
pub struct Denoiser {
    config: ArtifactConfig,
    pool: WorkerPool,
    bucket: Mutex<AHashSet<u64>>,
}

impl Denoiser {
    /// Builds a denoiser with the default pool size.
    pub fn new(config: ArtifactConfig) -> Denoiser {
        Denoiser::with_threads(config, 0)
    }

    /// Builds a denoiser with an explicit pool size (`0` = default).
    pub fn with_threads(config: ArtifactConfig, threads: usize) -> Denoiser {
        Denoiser {
            config,
            pool: WorkerPool::new(threads),
            bucket: Mutex::new(AHashSet::new()),
        }
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    /// Runs the pipeline, invoking `sink` for every surviving target
    /// line, in order, on this thread.
    pub fn run(&mut self, sink: &mut dyn FnMut(&Line)) -> Result<()> {
        let span = format!("processing {}", self.config.alias);
        log::profile(&span, || self.run_inner(sink))
    }

    fn run_inner(&mut self, sink: &mut dyn FnMut(&Line)) -> Result<()> {
        let this: &Denoiser = &*self;
        let errors: Mutex<Vec<Error>> = Mutex::new(Vec::new());

        let aliases: Vec<String> = (1..=this.config.reference.len())
            .map(|k| format!("{} #{k}", this.config.alias))
            .collect();

        let mut ref_jobs = Vec::with_capacity(this.config.reference.len());
        for (url, alias) in this.config.reference.iter().zip(&aliases) {
            let errors = &errors;
            let job: Box<dyn FnOnce() + Send + '_> = Box::new(move || {
                if let Err(e) = this.fill_bucket(url, alias) {
                    errors.lock().expect("error list mutex poisoned").push(e);
                }
            });
            // SAFETY: `wait_all(&ref_jobs)` below runs on every exit
            // path, including an unwind out of the target's prepare
            // (caught just underneath), before any of the borrows the
            // jobs capture can go out of scope.
            ref_jobs.push(unsafe { this.pool.submit_scoped(job) });
        }

        // The target shares the pool with the reference jobs, so a
        // panic in either side can surface here (the pool poisons
        // itself pool-wide). Catch it so the reference jobs are always
        // retired before this frame unwinds; `wait_all` itself only
        // re-raises a poison after every waited job has retired.
        let target = panic::catch_unwind(AssertUnwindSafe(|| {
            this.prepare(&this.config.target, &this.config.alias)
        }));
        this.pool.wait_all(&ref_jobs);
        let target = match target {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        };

        let target = target?;
        if let Some(err) = errors
            .into_inner()
            .expect("error list mutex poisoned")
            .into_iter()
            .next()
        {
            return Err(err);
        }

        // Every writer has been joined; exclusive access, no lock.
        let bucket = self.bucket.get_mut().expect("bucket mutex poisoned");
        for line in target.lines() {
            // A line emptied by the passes is noise by definition; its
            // hash is never consulted.
            if line.size() == 0 {
                continue;
            }
            if !bucket.contains(&line.hash()) {
                sink(line);
            }
        }
        Ok(())
    }

    /// Prepares one reference and folds its line hashes into the bucket.
    fn fill_bucket(&self, url: &str, alias: &str) -> Result<()> {
        let file = self.prepare(url, alias)?;

        let mut bucket = self.bucket.lock().expect("bucket mutex poisoned");
        // Amortized growth: make room for 1.5x this file's lines.
        let want = file.size() * 3 / 2;
        if bucket.len() < want {
            let more = want - bucket.len();
            bucket.reserve(more);
        }
        for line in file.lines() {
            bucket.insert(line.hash());
        }
        Ok(())
    }

    /// Fetches an artifact and applies the full pass sequence:
    /// filter, normalize, hash warm-up.
    fn prepare(&self, uri: &str, alias: &str) -> Result<File> {
        let mut file =
            log::profile(&format!("fetching {uri}"), || File::fetch(uri, Some(alias)))?;
        log::profile(&format!("filtering {alias}"), || self.filter(&mut file));
        log::profile(&format!("normalizing {alias}"), || self.normalize(&mut file));
        log::profile(&format!("computing hashes for {alias}"), || {
            compute_hashes(&file)
        });
        Ok(file)
    }

    /// Whole-line suppression pass. Filters run before normalizers.
    fn filter(&self, file: &mut File) {
        let filters = &self.config.rules.filters;
        if filters.is_empty() {
            return;
        }
        self.pool.for_each(file.lines_mut_slice(), LINE_BATCH, |line| {
            for pattern in filters {
                line.suppress(pattern);
            }
        });
    }

    /// In-place removal pass. Pattern order is semantic: later patterns
    /// see text already edited by earlier ones.
    fn normalize(&self, file: &mut File) {
        let normalizers = &self.config.rules.normalizers;
        if normalizers.is_empty() {
            return;
        }
        self.pool.for_each(file.lines_mut_slice(), LINE_BATCH, |line| {
            for pattern in normalizers {
                line.remove(pattern);
            }
        });
    }
}

/// Warms every line's lazy hash so the diff step only reads caches.
fn compute_hashes(file: &File) {
    for line in file.lines() {
        line.hash();
    }
}
