use std::fmt;

use thiserror::Error;

const BYTES_UNIT: &str = "bytes=";

/// Inclusive byte window `[start, end]` inside a resource of known size.
///
/// Only constructed after validation against the resource size, so
/// `start <= end < size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow {
    start: u64,
    end: u64,
}

impl ByteWindow {
    /// Validates `[start, end]` against `size`.
    pub fn new(start: u64, end: u64, size: u64) -> Result<Self, RangeError> {
        if start >= size || end >= size || start > end {
            return Err(RangeError::Unsatisfiable { start, end, size });
        }
        Ok(ByteWindow { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte of the window, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered by the window, never zero.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for ByteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Why a `Range` header could not be honoured. Both variants end in 416.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed range header: {0:?}")]
    Malformed(String),
    #[error("range {start}-{end} not satisfiable for {size} bytes")]
    Unsatisfiable { start: u64, end: u64, size: u64 },
}

/// Result of interpreting an optional `Range` header against a resource size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No header was sent, serve the whole resource.
    NoRange,
    Window(ByteWindow),
    Unsatisfiable(RangeError),
}

impl RangeOutcome {
    /// Interprets a single `bytes=<start>?-<end>?` range against `size`.
    ///
    /// Forms accepted:
    ///
    /// - `bytes=A-B`: bytes `A` through `B` inclusive
    /// - `bytes=A-`: from `A` to the last byte
    /// - `bytes=-N`: the last `N` bytes, or the whole resource if shorter
    ///
    /// Anything else, including multiple comma separated ranges, is
    /// reported as [`RangeOutcome::Unsatisfiable`].
    pub fn parse(header: Option<&str>, size: u64) -> Self {
        match header {
            None => RangeOutcome::NoRange,
            Some(header) => match parse_window(header, size) {
                Ok(window) => RangeOutcome::Window(window),
                Err(e) => RangeOutcome::Unsatisfiable(e),
            },
        }
    }
}

fn parse_window(header: &str, size: u64) -> Result<ByteWindow, RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());

    let byte_range = header
        .trim()
        .strip_prefix(BYTES_UNIT)
        .ok_or_else(malformed)?;
    let (start, end) = byte_range.split_once('-').ok_or_else(malformed)?;
    let start = parse_bound(start).map_err(|()| malformed())?;
    let end = parse_bound(end).map_err(|()| malformed())?;

    let last = size.checked_sub(1);
    let (start, end) = match (start, end) {
        (None, None) => return Err(malformed()),
        (Some(start), Some(end)) => (start, end),
        // a zero sized resource has no last byte, so nothing from `start` on exists
        (Some(start), None) => (start, last.unwrap_or(start)),
        (None, Some(0)) => {
            return Err(RangeError::Unsatisfiable { start: size, end: size, size });
        }
        (None, Some(suffix)) => (size.saturating_sub(suffix), last.unwrap_or(0)),
    };

    ByteWindow::new(start, end, size)
}

/// An empty bound is absent; a present bound must be plain ASCII digits.
fn parse_bound(token: &str) -> Result<Option<u64>, ()> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(());
    }
    token.parse::<u64>().map(Some).map_err(|_| ())
}
