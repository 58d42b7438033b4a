//! Minimal incremental parser for `text/event-stream` bodies.
//!
//! Network chunks do not align with event boundaries, so the parser
//! buffers raw bytes and emits one string per complete event. Buffering
//! happens before UTF-8 decoding; a multi-byte character split across
//! two chunks is reassembled instead of being mangled at the seam. Only
//! the `data` field is surfaced; comment lines and other fields are
//! skipped. Multiple `data:` lines within one event are joined with a
//! newline, per the SSE specification.

/// Incremental SSE parser. Feed it raw chunks, collect `data` payloads.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of the response body and return the `data`
    /// payloads of any events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();

        // An event ends at a blank line. Handle both LF and CRLF.
        while let Some((boundary, sep_len)) = find_event_boundary(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..boundary + sep_len).collect();
            let text = String::from_utf8_lossy(&event[..boundary]);
            if let Some(payload) = parse_event(&text) {
                payloads.push(payload);
            }
        }

        payloads
    }
}

/// Locate the first blank-line event separator, returning its offset
/// and length.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buffer, b"\n\n").map(|i| (i, 2));
    let crlf = find_subslice(buffer, b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Extract the joined `data` payload from one raw event block.
fn parse_event(event: &str) -> Option<String> {
    let mut data_lines = Vec::new();

    for line in event.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // Comments (":keep-alive") and other fields (event:, id:,
        // retry:) are ignored.
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
