//! Artifact fetching: URI dispatch, byte production, and progressive
//! decoding into a [`DataConsumer`].
//!
//! # Design
//!
//! The consumer sees decoded code points, never transport bytes, so the
//! file buffer does not care whether its content arrived from disk or
//! over HTTP:
//!
//! ```text
//! file://…  -> open + StreamFeeder (pull)  -> decoder -> on_data(chars)
//! http(s):// -> curl child process (push)  -> decoder -> on_data(chars)
//! ```
//!
//! HTTP transport is delegated to a `curl` subprocess (`-sS -i`): the
//! status line and headers are parsed off the pipe to pick the decoder
//! and pre-size the consumer, then the body is streamed through a
//! [`BufferedFeeder`]. This keeps TLS, proxies, and redirects out of the
//! crate entirely.
//!
//! A missing resource (HTTP 404, unresolvable host, absent local path)
//! is reported as [`Error::NotFound`], distinct from transport failures.

use crate::encoding::{BufferedFeeder, Decode, Encoding, StreamFeeder};
use crate::error::{Error, Result};
use crate::log::{self, Level};
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// Decoded characters are delivered in batches of at most this many.
const BATCH_POINTS: usize = 4096;

/// Bytes read from the HTTP body pipe per syscall.
const BODY_CHUNK: usize = 8192;

// ============================================================================
// Consumer contract
// ============================================================================

/// Receiver of progressively decoded artifact content.
pub trait DataConsumer {
    /// Expected total size in bytes, when the transport knows it.
    /// Called at most once, before any `on_data`.
    fn size_hint(&mut self, bytes: usize);

    /// A batch of decoded code points, in stream order.
    fn on_data(&mut self, points: &[char]);
}

// ============================================================================
// URIs
// ============================================================================

/// A resolved artifact location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Uri {
    Local(PathBuf),
    Remote(String),
}

impl Uri {
    /// Classifies a URI string.
    ///
    /// `file://` strips the scheme; `http://` and `https://` stay
    /// verbatim; anything else is treated as a local path with a
    /// warning, since a scheme was probably intended.
    pub fn parse(uri: &str) -> Uri {
        if let Some(path) = uri.strip_prefix("file://") {
            return Uri::Local(PathBuf::from(path));
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Uri::Remote(uri.to_owned());
        }
        if log::enabled(Level::Warning) {
            log::emit(
                Level::Warning,
                &format!("no scheme in '{uri}', treating it as a local path"),
            );
        }
        Uri::Local(PathBuf::from(uri))
    }
}

/// Fetches `uri` into `consumer`, dispatching on the scheme.
pub fn fetch(uri: &Uri, consumer: &mut dyn DataConsumer) -> Result<()> {
    match uri {
        Uri::Local(path) => load(path, consumer),
        Uri::Remote(url) => download(url, consumer),
    }
}

// ============================================================================
// Local files
// ============================================================================

/// Loads a local file, decoding as UTF-8.
pub fn load(path: &Path, consumer: &mut dyn DataConsumer) -> Result<()> {
    let file = fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;
    let size = file.metadata()?.len();
    consumer.size_hint(size as usize);

    let mut feeder = StreamFeeder::new(BufReader::new(file));
    let mut batch = Vec::with_capacity(BATCH_POINTS);
    loop {
        match Encoding::Utf8.decode(&mut feeder)? {
            Decode::Point(c) => {
                batch.push(c);
                if batch.len() == BATCH_POINTS {
                    consumer.on_data(&batch);
                    batch.clear();
                }
            }
            Decode::End => break,
            Decode::Incomplete => {
                return Err(Error::Encoding(format!(
                    "{}: input ends inside a multi-byte sequence",
                    path.display()
                )));
            }
        }
    }
    if !batch.is_empty() {
        consumer.on_data(&batch);
    }
    Ok(())
}

// ============================================================================
// HTTP via curl
// ============================================================================

/// Response metadata scraped from a `curl -i` header block.
#[derive(Debug, Default, PartialEq, Eq)]
struct HeaderInfo {
    status: u16,
    content_type: Option<String>,
    content_length: Option<usize>,
}

/// Downloads `url` with a `curl` child process and streams the decoded
/// body into `consumer`.
pub fn download(url: &str, consumer: &mut dyn DataConsumer) -> Result<()> {
    let mut child = Command::new("curl")
        .args(["-sS", "-i", "--", url])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Io(std::io::Error::other("curl stdout unavailable")))?;
    let mut reader = BufReader::new(stdout);

    let result = stream_response(url, &mut reader, consumer);
    if result.is_err() {
        // Stop a still-running transfer before surfacing the error. An
        // unresolvable host produces no response at all; curl's exit
        // code 6 is the better diagnosis in that case.
        let _ = child.kill();
        if let Ok(status) = child.wait() {
            if status.code() == Some(6) {
                return Err(Error::NotFound(format!(
                    "{url}: {}",
                    stderr_of(&mut child)
                )));
            }
        }
        return result;
    }

    let status = child.wait()?;
    if !status.success() {
        let detail = stderr_of(&mut child);
        // curl exit code 6: could not resolve host.
        if status.code() == Some(6) {
            return Err(Error::NotFound(format!("{url}: {detail}")));
        }
        return Err(Error::Io(std::io::Error::other(format!(
            "curl failed for {url}: {detail}"
        ))));
    }
    Ok(())
}

/// Drains the child's stderr for error reporting.
fn stderr_of(child: &mut std::process::Child) -> String {
    let mut detail = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut detail);
    }
    detail.trim().to_owned()
}

/// Parses the header block(s) and decodes the body.
fn stream_response(
    url: &str,
    reader: &mut impl Read,
    consumer: &mut dyn DataConsumer,
) -> Result<()> {
    let info = read_headers(reader)?;
    if info.status == 404 {
        return Err(Error::NotFound(url.to_owned()));
    }
    if !(200..300).contains(&info.status) {
        return Err(Error::Io(std::io::Error::other(format!(
            "HTTP status {} for {url}",
            info.status
        ))));
    }

    if let Some(length) = info.content_length {
        consumer.size_hint(length);
    }

    let encoding = match info.content_type.as_deref() {
        Some(ctype) => match charset_of(ctype) {
            Some(name) => match Encoding::from_charset(name) {
                Some(e) => {
                    if log::enabled(Level::Debug) {
                        log::emit(Level::Debug, &format!("using charset {name}"));
                    }
                    e
                }
                None => {
                    log::emit(Level::Warning, &format!("unknown charset '{name}'"));
                    Encoding::Utf8
                }
            },
            None => {
                log::emit(
                    Level::Debug,
                    "Content-Type without charset, defaulting to Latin-1",
                );
                Encoding::Latin1
            }
        },
        None => {
            log::emit(Level::Warning, "unknown encoding, defaulting to UTF-8");
            Encoding::Utf8
        }
    };

    decode_body(url, reader, encoding, consumer)
}

/// Reads `curl -i` header blocks until the final response's blank line,
/// skipping informational (1xx) blocks.
fn read_headers(reader: &mut impl Read) -> Result<HeaderInfo> {
    loop {
        let status_line = read_line(reader)?
            .ok_or_else(|| Error::Io(std::io::Error::other("empty HTTP response")))?;
        let mut info = HeaderInfo {
            status: parse_status(&status_line).ok_or_else(|| {
                Error::Io(std::io::Error::other(format!(
                    "malformed HTTP status line: '{status_line}'"
                )))
            })?,
            ..HeaderInfo::default()
        };

        while let Some(line) = read_line(reader)? {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim();
                if name.eq_ignore_ascii_case("content-type") {
                    info.content_type = Some(value.to_owned());
                } else if name.eq_ignore_ascii_case("content-length") {
                    info.content_length = value.parse().ok();
                }
            }
        }

        if info.status / 100 != 1 {
            return Ok(info);
        }
    }
}

/// Streams the body through the chosen decoder in read-sized chunks.
fn decode_body(
    url: &str,
    reader: &mut impl Read,
    encoding: Encoding,
    consumer: &mut dyn DataConsumer,
) -> Result<()> {
    let mut feeder = BufferedFeeder::new();
    let mut chunk = [0u8; BODY_CHUNK];
    let mut batch = Vec::with_capacity(BATCH_POINTS);

    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        feeder.push_chunk(&chunk[..read]);
        loop {
            match encoding.decode(&mut feeder)? {
                Decode::Point(c) => {
                    batch.push(c);
                    if batch.len() == BATCH_POINTS {
                        consumer.on_data(&batch);
                        batch.clear();
                    }
                }
                // More bytes needed, or the buffer is drained.
                Decode::Incomplete | Decode::End => break,
            }
        }
    }

    if !feeder.is_empty() {
        return Err(Error::Encoding(format!(
            "{url}: response ends inside a multi-byte sequence"
        )));
    }
    if !batch.is_empty() {
        consumer.on_data(&batch);
    }
    Ok(())
}

/// Reads one header line, tolerating `\r\n` endings. `None` at EOF.
fn read_line(reader: &mut impl Read) -> Result<Option<String>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte)? {
            0 => {
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }
            _ => {
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
            }
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| Error::Io(std::io::Error::other("non-UTF-8 HTTP header")))
}

/// Extracts the status code from an `HTTP/x.y CODE REASON` line.
fn parse_status(line: &str) -> Option<u16> {
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Pulls the `charset=` parameter out of a `Content-Type` value.
fn charset_of(content_type: &str) -> Option<&str> {
    static CHARSET_RX: OnceLock<regex::Regex> = OnceLock::new();
    let rx = CHARSET_RX.get_or_init(|| {
        regex::Regex::new(r"(?i)charset=([^ ;]+)").expect("charset regex is valid")
    });
    rx.captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
