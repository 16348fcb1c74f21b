//! Buffer management for process output

mod ansi;

pub use ansi::{strip_ansi, AnsiFilter};

use bytes::BytesMut;

/// Child output not yet consumed by a match, plus an optional raw transcript.
///
/// Bytes up to the end of each match are drained; whatever follows stays
/// buffered for the next `expect`. Only the newest `window_size` bytes are
/// scanned, but everything since the last match is kept for `before`.
#[derive(Debug)]
pub struct BufferManager {
    buffer: BytesMut,
    window_size: usize,
    filter: Option<AnsiFilter>,
    transcript: Option<BytesMut>,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(window_size: usize, strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(window_size.min(64 * 1024)),
            window_size: window_size.max(1),
            filter: strip_ansi.then(AnsiFilter::new),
            transcript: None,
        }
    }

    /// Mirror every appended byte, unfiltered, into a transcript.
    pub fn with_transcript(mut self) -> Self {
        self.transcript = Some(BytesMut::new());
        self
    }

    /// Append data to the buffer (and transcript)
    pub fn append(&mut self, data: &[u8]) {
        if let Some(transcript) = &mut self.transcript {
            transcript.extend_from_slice(data);
        }

        let filtered;
        let data = match &mut self.filter {
            Some(filter) => {
                filtered = filter.feed(data);
                &filtered[..]
            }
            None => data,
        };

        self.buffer.extend_from_slice(data);
    }

    /// Bytes not yet consumed by a match
    pub fn unmatched(&self) -> &[u8] {
        &self.buffer
    }

    /// The newest unmatched bytes, at most `window_size` of them.
    pub fn window(&self) -> &[u8] {
        &self.buffer[self.window_offset()..]
    }

    /// Consume a match found at `start..end` of [`window`](Self::window),
    /// returning `(before, matched)`. `before` also holds the unmatched
    /// bytes older than the window.
    pub fn take_match(&mut self, start: usize, end: usize) -> (String, String) {
        let offset = self.window_offset();
        let (start, end) = (start + offset, end + offset);
        let end = end.min(self.buffer.len());
        let start = start.min(end);
        let before = self.buffer.split_to(start);
        let matched = self.buffer.split_to(end - start);
        (lossy(&before), lossy(&matched))
    }

    /// Consume everything buffered (used when EOF or a timeout is matched).
    pub fn take_all(&mut self) -> String {
        let rest = self.buffer.split();
        lossy(&rest)
    }

    /// Everything appended so far, if transcript capture is on
    pub fn transcript(&self) -> Option<String> {
        self.transcript.as_ref().map(|t| lossy(t))
    }

    /// Number of unmatched bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn window_offset(&self) -> usize {
        self.buffer.len().saturating_sub(self.window_size)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
