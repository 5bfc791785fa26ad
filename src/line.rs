//! A single line of an artifact: an editable view into its file's
//! mutable store plus the frozen original extent used for display.
//!
//! # Memory layout
//!
//! A line never owns bytes. It carries a pointer/length pair into the
//! owning file's mutable store and the parallel pair into the immutable
//! store. Edits shrink the mutable extent in place (`remove` shifts the
//! suffix left, `suppress` zeroes the length); nothing ever grows, so
//! `ptr + size` stays inside the original extent for the life of the
//! line.
//!
//! # Hashing
//!
//! The 64-bit content hash is computed lazily over the current mutable
//! extent and cached; `0` means "not computed yet". Every mutating
//! operation resets the cache. The digest is stable within one process
//! run (the hasher state is seeded once per process), which is all the
//! diff needs.

use crate::pattern::Pattern;
use memchr::memmem;
use regex::bytes::Regex;
use std::cell::Cell;
use std::ptr::NonNull;
use std::slice;
use std::sync::OnceLock;

static DIGEST_STATE: OnceLock<ahash::RandomState> = OnceLock::new();

/// 64-bit content digest, stable within one process run.
pub(crate) fn digest(bytes: &[u8]) -> u64 {
    DIGEST_STATE
        .get_or_init(ahash::RandomState::new)
        .hash_one(bytes)
}

/// An editable view over one line of a [`File`](crate::file::File).
///
/// Movable but not copyable; two lines never alias the same extent.
pub struct Line {
    /// Start of the edited extent in the mutable store.
    ptr: NonNull<u8>,
    /// Current edited length; `0` means suppressed.
    size: usize,
    /// Start of the frozen extent in the immutable store.
    original_ptr: NonNull<u8>,
    original_size: usize,
    /// 1-based position in the owning file's line index.
    number: usize,
    /// Owning file's alias; the file outlives its lines.
    source: NonNull<str>,
    /// Cached content hash; `0` = not computed / invalidated.
    hash: Cell<u64>,
}

// SAFETY: a line's pointers target heap allocations owned by its file,
// which are never reallocated and outlive the line. Mutation requires
// `&mut Line`, and distinct lines cover disjoint extents, so moving
// lines between threads (e.g. batched normalization) cannot race.
unsafe impl Send for Line {}

impl Line {
    /// Builds a line over parallel extents of the two stores.
    ///
    /// # Safety
    ///
    /// `mut_ptr` and `imm_ptr` must point to `size` valid bytes that stay
    /// allocated, unaliased by other lines, and un-moved for the lifetime
    /// of the line; the immutable extent must be valid UTF-8. `source`
    /// must outlive the line.
    pub(crate) unsafe fn new(
        number: usize,
        mut_ptr: *mut u8,
        imm_ptr: *const u8,
        size: usize,
        source: NonNull<str>,
    ) -> Line {
        Line {
            ptr: NonNull::new_unchecked(mut_ptr),
            size,
            original_ptr: NonNull::new_unchecked(imm_ptr as *mut u8),
            original_size: size,
            number,
            source,
            hash: Cell::new(0),
        }
    }

    /// 1-based line number within the owning file.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Alias of the owning file.
    pub fn source(&self) -> &str {
        // SAFETY: the owning file outlives its lines and never mutates
        // its alias.
        unsafe { self.source.as_ref() }
    }

    /// Current edited length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The original, user-visible text.
    pub fn text(&self) -> &str {
        // SAFETY: the immutable store is never written after decode and
        // the extent lies on code-point boundaries.
        unsafe {
            let bytes = slice::from_raw_parts(self.original_ptr.as_ptr(), self.original_size);
            debug_assert!(std::str::from_utf8(bytes).is_ok());
            std::str::from_utf8_unchecked(bytes)
        }
    }

    /// The current edited extent: what gets hashed and diffed.
    pub fn edited(&self) -> &[u8] {
        // SAFETY: `ptr..ptr + size` stays within the original extent.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Suppresses the whole line if `pattern` matches anywhere in the
    /// edited extent. No-op on an already empty extent.
    pub fn suppress(&mut self, pattern: &Pattern) {
        if self.size == 0 {
            return;
        }
        if pattern.matches(self.edited()) {
            self.size = 0;
            self.hash.set(0);
        }
    }

    /// Deletes every match of `pattern` from the edited extent, in
    /// place, non-overlapping and left to right. After any edit the
    /// extent is trimmed of ASCII whitespace at both ends and the cached
    /// hash is invalidated. No-op on an empty extent.
    pub fn remove(&mut self, pattern: &Pattern) {
        if self.size == 0 {
            return;
        }
        let edited = match pattern {
            Pattern::Literal(text) => self.remove_literal(text.as_bytes()),
            Pattern::Regex(re) => self.remove_regex(re),
        };
        if edited {
            self.trim();
            self.hash.set(0);
        }
    }

    /// Content hash of the edited extent, computed on first use.
    ///
    /// A suppressed line hashes the empty sequence.
    pub fn hash(&self) -> u64 {
        let cached = self.hash.get();
        if cached != 0 {
            return cached;
        }
        let value = digest(self.edited());
        self.hash.set(value);
        value
    }

    fn remove_literal(&mut self, needle: &[u8]) -> bool {
        if needle.is_empty() {
            return false;
        }
        let mut edited = false;
        let mut cursor = 0;
        loop {
            let found = memmem::find(&self.edited()[cursor..], needle);
            let Some(pos) = found else { break };
            let start = cursor + pos;
            self.shift_left(start, start + needle.len());
            // Back off so an occurrence formed across the cut point is
            // not missed; matches still never overlap.
            cursor = start.saturating_sub(needle.len() - 1);
            edited = true;
        }
        edited
    }

    fn remove_regex(&mut self, re: &Regex) -> bool {
        let mut edited = false;
        let mut cursor = 0;
        while cursor <= self.size {
            let found = re.find_at(self.edited(), cursor).map(|m| (m.start(), m.end()));
            let Some((start, end)) = found else { break };
            if start == end {
                // Zero-width match: nothing to delete, step past it.
                cursor = start + 1;
                continue;
            }
            self.shift_left(start, end);
            // Rescan from the front: a deletion can expose a new match
            // anywhere to the left of the cut point.
            cursor = 0;
            edited = true;
        }
        edited
    }

    /// Shifts the suffix left over `[start, end)` and shrinks the extent.
    fn shift_left(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end && end <= self.size);
        // SAFETY: the extent is exclusively ours (`&mut self`) and the
        // range is in bounds.
        let data = unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) };
        data.copy_within(end.., start);
        self.size -= end - start;
    }

    /// Drops ASCII whitespace from both ends of the edited extent.
    fn trim(&mut self) {
        let data = self.edited();
        let lead = data.iter().take_while(|b| b.is_ascii_whitespace()).count();
        let trail = data[lead..]
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        // SAFETY: `lead <= size`, so the advanced pointer stays within
        // (or one past) the original extent.
        self.ptr = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(lead)) };
        self.size -= lead + trail;
    }
}

impl std::fmt::Debug for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Line")
            .field("number", &self.number)
            .field("text", &self.text())
            .field("edited", &String::from_utf8_lossy(self.edited()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Owns the backing stores a test line points into. Field order
    /// keeps the buffers alive for as long as the line.
    struct Fixture {
        line: Line,
        _mut_data: Box<[u8]>,
        _imm_data: Box<[u8]>,
        _alias: Box<str>,
    }

    fn fixture(text: &str) -> Fixture {
        let mut mut_data: Box<[u8]> = text.as_bytes().into();
        let imm_data: Box<[u8]> = text.as_bytes().into();
        let alias: Box<str> = "fixture".into();
        let line = unsafe {
            Line::new(
                1,
                mut_data.as_mut_ptr(),
                imm_data.as_ptr(),
                text.len(),
                NonNull::from(alias.as_ref()),
            )
        };
        Fixture {
            line,
            _mut_data: mut_data,
            _imm_data: imm_data,
            _alias: alias,
        }
    }

    #[test]
    fn remove_regex_single() {
        let mut fx = fixture("test 1234 rofl");
        fx.line.remove(&Pattern::compile(r"\d+").unwrap());
        assert_eq!(fx.line.text(), "test 1234 rofl");
        assert_eq!(fx.line.edited(), b"test  rofl");
    }

    #[test]
    fn remove_regex_multi() {
        let mut fx = fixture("test 1234 1234 rofl");
        fx.line.remove(&Pattern::compile(r"\d+").unwrap());
        assert_eq!(fx.line.text(), "test 1234 1234 rofl");
        assert_eq!(fx.line.edited(), b"test   rofl");
    }

    #[test]
    fn remove_literal_single() {
        let mut fx = fixture("test 1234 rofl");
        fx.line.remove(&Pattern::literal("1234"));
        assert_eq!(fx.line.edited(), b"test  rofl");
    }

    #[test]
    fn remove_literal_multi_is_left_to_right() {
        let mut fx = fixture("test 1234 1234 rofl");
        fx.line.remove(&Pattern::literal("1234"));
        assert_eq!(fx.line.edited(), b"test   rofl");
    }

    #[test]
    fn remove_trims_both_ends() {
        let mut fx = fixture("  1234 payload 1234  ");
        fx.line.remove(&Pattern::literal("1234"));
        assert_eq!(fx.line.edited(), b"payload");
        assert_eq!(fx.line.text(), "  1234 payload 1234  ");
    }

    #[test]
    fn remove_everything_leaves_empty_extent() {
        let mut fx = fixture("12345");
        fx.line.remove(&Pattern::compile(r"\d+").unwrap());
        assert_eq!(fx.line.size(), 0);
        assert_eq!(fx.line.edited(), b"");
    }

    #[test]
    fn remove_without_match_keeps_extent_and_hash() {
        let mut fx = fixture("  spaced  ");
        let before = fx.line.hash();
        fx.line.remove(&Pattern::literal("zzz"));
        // No edit happened: no trim, cache untouched.
        assert_eq!(fx.line.edited(), b"  spaced  ");
        assert_eq!(fx.line.hash(), before);
    }

    #[test]
    fn suppress_regex() {
        let mut fx = fixture("test 1234 rofl");
        fx.line.suppress(&Pattern::compile(r"\d+").unwrap());
        assert_eq!(fx.line.size(), 0);
        assert_eq!(fx.line.text(), "test 1234 rofl");
    }

    #[test]
    fn suppress_literal() {
        let mut fx = fixture("test 1234 rofl");
        fx.line.suppress(&Pattern::literal("123"));
        assert_eq!(fx.line.size(), 0);
    }

    #[test]
    fn suppress_without_match_is_noop() {
        let mut fx = fixture("keep me");
        fx.line.suppress(&Pattern::literal("gone"));
        assert_eq!(fx.line.edited(), b"keep me");
    }

    #[test]
    fn suppress_is_idempotent() {
        let mut fx = fixture("test 1234 rofl");
        let p = Pattern::literal("1234");
        fx.line.suppress(&p);
        fx.line.suppress(&p);
        assert_eq!(fx.line.size(), 0);
        assert_eq!(fx.line.hash(), digest(b""));
    }

    #[test]
    fn hash_is_cached_until_edit() {
        let mut fx = fixture("stable content");
        let first = fx.line.hash();
        assert_eq!(fx.line.hash(), first);
        fx.line.remove(&Pattern::literal("content"));
        let second = fx.line.hash();
        assert_ne!(first, second);
        assert_eq!(second, digest(b"stable"));
    }

    #[test]
    fn equal_edits_hash_equal() {
        let fx_a = fixture("INFO started");
        let fx_b = fixture("INFO started");
        assert_eq!(fx_a.line.hash(), fx_b.line.hash());
    }

    #[test]
    fn zero_width_regex_match_terminates() {
        let mut fx = fixture("abc");
        // `a*` matches empty at every position; must not loop or edit
        // the non-matching bytes away.
        fx.line.remove(&Pattern::compile("z*").unwrap());
        assert_eq!(fx.line.edited(), b"abc");
    }

    #[test]
    fn number_and_source() {
        let fx = fixture("x");
        assert_eq!(fx.line.number(), 1);
        assert_eq!(fx.line.source(), "fixture");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Removing a non-empty literal twice equals removing it once.
            #[test]
            fn remove_is_idempotent(
                text in "[ -~]{0,60}",
                needle in "[a-z0-9]{1,4}",
            ) {
                let p = Pattern::literal(needle);
                let mut once = fixture(&text);
                once.line.remove(&p);
                let mut twice = fixture(&text);
                twice.line.remove(&p);
                twice.line.remove(&p);
                prop_assert_eq!(once.line.edited(), twice.line.edited());
            }

            /// The extent never grows and the cache is either reset or
            /// consistent with the edited bytes.
            #[test]
            fn edits_shrink_and_hash_agrees(
                text in "[ -~]{0,60}",
                needle in "[a-z0-9]{1,4}",
            ) {
                let mut fx = fixture(&text);
                let original = fx.line.size();
                fx.line.remove(&Pattern::literal(needle.clone()));
                fx.line.suppress(&Pattern::literal(needle));
                prop_assert!(fx.line.size() <= original);
                prop_assert_eq!(fx.line.hash(), digest(fx.line.edited()));
            }

            /// After a regex removal no match remains in the extent.
            #[test]
            fn regex_removal_is_exhaustive(text in "[a-z 0-9]{0,60}") {
                let p = Pattern::compile(r"\d+").unwrap();
                let mut fx = fixture(&text);
                fx.line.remove(&p);
                prop_assert!(!p.matches(fx.line.edited()));
            }
        }
    }
}
