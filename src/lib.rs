//! Log denoiser: removes from a target artifact every line that, after
//! normalization, also appears in one or more reference artifacts.
//!
//! The typical use is CI triage: diff a failing job's log against a few
//! known-good runs of the same job, after erasing instance-specific
//! tokens (timestamps, PIDs, hostnames) that would otherwise make every
//! line unique.
//!
//! High-level flow (one artifact):
//! 1) Fetch each reference and the target (`file://` or HTTP(S)),
//!    decoding bytes to characters per the declared charset.
//! 2) Apply the filter patterns (whole-line suppression), then the
//!    normalizer patterns (in-place substring removal), batched across
//!    a worker pool.
//! 3) Insert every reference line's content hash into a shared bucket.
//! 4) Emit, in order, each target line whose hash is not in the bucket.
//!
//! References are processed by pool jobs while the calling thread
//! prepares the target; the final diff runs single-threaded after all
//! reference jobs have been joined.
//!
//! The editable line model is the heart of the crate: each [`File`]
//! owns two parallel byte stores (an edited working copy and a frozen
//! original), and each [`Line`] is a shrink-only view into the working
//! copy, so normalization never allocates and display text is always
//! available.

pub mod config;
pub mod denoiser;
pub mod encoding;
pub mod error;
pub mod fetch;
pub mod file;
pub mod line;
pub mod log;
pub mod pattern;
pub mod pool;

pub use config::{ArtifactConfig, Config};
pub use denoiser::Denoiser;
pub use error::{Error, Result};
pub use file::File;
pub use line::Line;
pub use pattern::{Pattern, Rules};
pub use pool::WorkerPool;
