//! The artifact buffer: decoded character storage plus the line index.
//!
//! # Storage
//!
//! Decoded code points are re-encoded as UTF-8 into two parallel byte
//! stores: `mut_data`, edited in place by the normalization passes, and
//! `imm_data`, frozen at construction for display. Both are identical at
//! construction and the immutable copy never changes, so converting an
//! edited extent back to its original text is an O(1) offset translation.
//!
//! The stores are boxed slices built only after every byte has been
//! appended: they never reallocate, so the raw extents held by each
//! [`Line`] stay valid for the life of the file — including across moves
//! of the `File` value itself, which relocate the boxes but not the heap
//! allocations they own.
//!
//! # Line index
//!
//! Lines are maximal runs of non-separator bytes (`\n` and `\r` are
//! separators), indexed in one scan. Runs of separators produce no empty
//! lines; trailing unterminated text forms a final line.

use crate::error::Result;
use crate::fetch::{self, DataConsumer, Uri};
use crate::line::Line;
use std::path::Path;
use std::ptr::NonNull;

/// Accumulates decoded content during a fetch.
#[derive(Default)]
struct Contents {
    mut_data: Vec<u8>,
    imm_data: Vec<u8>,
}

impl DataConsumer for Contents {
    fn size_hint(&mut self, bytes: usize) {
        self.mut_data.reserve(bytes);
        self.imm_data.reserve(bytes);
    }

    fn on_data(&mut self, points: &[char]) {
        let mut buf = [0u8; 4];
        for &c in points {
            let encoded = c.encode_utf8(&mut buf).as_bytes();
            self.mut_data.extend_from_slice(encoded);
            self.imm_data.extend_from_slice(encoded);
        }
    }
}

/// A fully fetched, line-indexed artifact. Move-only: the storage is
/// exclusively owned and never shared between files.
pub struct File {
    alias: Box<str>,
    mut_data: Box<[u8]>,
    // Read through raw pointers held by the lines.
    #[allow(dead_code)]
    imm_data: Box<[u8]>,
    lines: Vec<Line>,
}

impl File {
    /// Fetches `uri` (any supported scheme) into a new file.
    ///
    /// `alias` defaults to the URI itself.
    pub fn fetch(uri: &str, alias: Option<&str>) -> Result<File> {
        let parsed = Uri::parse(uri);
        let mut contents = Contents::default();
        fetch::fetch(&parsed, &mut contents)?;
        Ok(File::assemble(alias.unwrap_or(uri), contents))
    }

    /// Downloads an HTTP(S) artifact, bypassing scheme sniffing.
    pub fn download(url: &str, alias: Option<&str>) -> Result<File> {
        let mut contents = Contents::default();
        fetch::download(url, &mut contents)?;
        Ok(File::assemble(alias.unwrap_or(url), contents))
    }

    /// Loads a local artifact, bypassing scheme sniffing.
    pub fn load(path: impl AsRef<Path>, alias: Option<&str>) -> Result<File> {
        let path = path.as_ref();
        let mut contents = Contents::default();
        fetch::load(path, &mut contents)?;
        let display;
        let alias = match alias {
            Some(a) => a,
            None => {
                display = path.display().to_string();
                &display
            }
        };
        Ok(File::assemble(alias, contents))
    }

    /// Builds a file directly from already decoded text.
    #[cfg(test)]
    pub(crate) fn from_text(alias: &str, text: &str) -> File {
        let contents = Contents {
            mut_data: text.as_bytes().to_vec(),
            imm_data: text.as_bytes().to_vec(),
        };
        File::assemble(alias, contents)
    }

    /// Freezes the storage and builds the line index.
    fn assemble(alias: &str, contents: Contents) -> File {
        debug_assert_eq!(contents.mut_data.len(), contents.imm_data.len());
        let mut mut_data = contents.mut_data.into_boxed_slice();
        let imm_data = contents.imm_data.into_boxed_slice();
        let alias: Box<str> = alias.into();
        let source = NonNull::from(alias.as_ref());

        let mut extents = Vec::new();
        let mut start: Option<usize> = None;
        for (i, &b) in mut_data.iter().enumerate() {
            let separator = b == b'\n' || b == b'\r';
            match start {
                Some(s) if separator => {
                    extents.push((s, i));
                    start = None;
                }
                None if !separator => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            extents.push((s, mut_data.len()));
        }

        let mut lines = Vec::with_capacity(extents.len());
        for (index, &(s, e)) in extents.iter().enumerate() {
            lines.push(Self::line_at(&mut mut_data, &imm_data, source, index, s, e));
        }

        File {
            alias,
            mut_data,
            imm_data,
            lines,
        }
    }

    fn line_at(
        mut_data: &mut [u8],
        imm_data: &[u8],
        source: NonNull<str>,
        index: usize,
        start: usize,
        end: usize,
    ) -> Line {
        debug_assert!(start < end && end <= mut_data.len());
        // SAFETY: both stores are boxed and never touched again except
        // through the lines; extents are disjoint per line, parallel
        // between the stores, and lie on code-point boundaries (the
        // separators are ASCII). The alias outlives the lines.
        unsafe {
            Line::new(
                index + 1,
                mut_data.as_mut_ptr().add(start),
                imm_data.as_ptr().add(start),
                end - start,
                source,
            )
        }
    }

    /// The artifact's alias.
    pub fn name(&self) -> &str {
        &self.alias
    }

    /// Number of indexed lines.
    pub fn size(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The line at `index` (0-based).
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of bounds.
    pub fn at(&self, index: usize) -> &Line {
        &self.lines[index]
    }

    pub fn lines(&self) -> std::slice::Iter<'_, Line> {
        self.lines.iter()
    }

    pub fn lines_mut(&mut self) -> std::slice::IterMut<'_, Line> {
        self.lines.iter_mut()
    }

    /// Mutable line slice for batched parallel passes.
    pub fn lines_mut_slice(&mut self) -> &mut [Line] {
        &mut self.lines
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("alias", &self.alias)
            .field("bytes", &self.mut_data.len())
            .field("lines", &self.lines.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    #[test]
    fn splits_on_newline() {
        let f = File::from_text("t", "a\nb\nc\n");
        assert_eq!(f.size(), 3);
        assert_eq!(f.at(0).text(), "a");
        assert_eq!(f.at(1).text(), "b");
        assert_eq!(f.at(2).text(), "c");
    }

    #[test]
    fn numbers_are_one_based() {
        let f = File::from_text("t", "a\nb\n");
        assert_eq!(f.at(0).number(), 1);
        assert_eq!(f.at(1).number(), 2);
    }

    #[test]
    fn separator_runs_produce_no_empty_lines() {
        let f = File::from_text("t", "a\r\n\r\n\nb");
        assert_eq!(f.size(), 2);
        assert_eq!(f.at(0).text(), "a");
        assert_eq!(f.at(1).text(), "b");
    }

    #[test]
    fn only_separators_is_zero_lines() {
        let f = File::from_text("t", "\n\r\n\r");
        assert_eq!(f.size(), 0);
        assert!(f.is_empty());
    }

    #[test]
    fn trailing_text_forms_final_line() {
        let f = File::from_text("t", "a\nfinal");
        assert_eq!(f.size(), 2);
        assert_eq!(f.at(1).text(), "final");
    }

    #[test]
    fn empty_input_is_empty_file() {
        let f = File::from_text("t", "");
        assert_eq!(f.size(), 0);
    }

    #[test]
    fn multi_byte_text_survives() {
        let f = File::from_text("t", "A\n\u{00A9}\n\u{2764}\n");
        assert_eq!(f.size(), 3);
        assert_eq!(f.at(0).text(), "A");
        assert_eq!(f.at(1).text(), "\u{00A9}");
        assert_eq!(f.at(2).text(), "\u{2764}");
    }

    #[test]
    fn lines_report_their_source() {
        let f = File::from_text("build-log", "x\n");
        assert_eq!(f.at(0).source(), "build-log");
        assert_eq!(f.name(), "build-log");
    }

    #[test]
    fn edits_do_not_touch_display_text() {
        let mut f = File::from_text("t", "error 17 here\nclean\n");
        for line in f.lines_mut() {
            line.remove(&Pattern::compile(r"\d+").unwrap());
        }
        assert_eq!(f.at(0).text(), "error 17 here");
        assert_eq!(f.at(0).edited(), b"error  here");
        assert_eq!(f.at(1).edited(), b"clean");
    }

    #[test]
    fn moving_the_file_keeps_lines_valid() {
        let f = File::from_text("t", "alpha\nbeta\n");
        let boxed = Box::new(f);
        assert_eq!(boxed.at(0).text(), "alpha");
        let back = *boxed;
        assert_eq!(back.at(1).text(), "beta");
        assert_eq!(back.at(1).source(), "t");
    }

    #[test]
    fn load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let f = File::load(&path, Some("run")).unwrap();
        assert_eq!(f.name(), "run");
        assert_eq!(f.size(), 2);
        assert_eq!(f.at(1).text(), "two");
    }

    #[test]
    fn load_missing_path_is_not_found() {
        let err = File::load("/definitely/not/here.log", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn fetch_dispatches_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "x\n").unwrap();

        let uri = format!("file://{}", path.display());
        let f = File::fetch(&uri, None).unwrap();
        assert_eq!(f.size(), 1);
        assert_eq!(f.name(), uri);
    }
}
