//! Streaming request parser.
//!
//! The parser is a [`SendableTask`] fed successive byte chunks read off the
//! socket. Whenever the current chunk is exhausted mid-message it suspends
//! ([`Feed::NeedMore`]); once a full request has been consumed it completes
//! with the parsed request plus the unconsumed tail of the final chunk.
//! Malformed input completes with [`Feed::Failed`] — the parser never
//! panics on wire data and has no error type.

use bytes::{Buf, Bytes, BytesMut};
use ringlet::{Inbox, SendableTask, Step};

use crate::grammar::{self, CR, HTAB, LF, SP};
use crate::request::{Headers, Method, Request, RequestTarget};

/// Outcome of one [`RequestParser::feed`] call.
#[derive(Debug)]
pub enum Feed {
    /// The chunk was consumed without completing the message.
    NeedMore,
    /// A full request was parsed. `leftover` is the unconsumed tail of the
    /// final chunk (the start of a pipelined follow-up request, if any).
    Complete { request: Request, leftover: Bytes },
    /// The input is not a valid request. The connection should be closed
    /// after responding 400.
    Failed,
}

/// A resumable HTTP/1.1 request parser.
pub struct RequestParser {
    task: SendableTask<Bytes, Option<(Request, Bytes)>>,
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser {
            task: SendableTask::new(parse_request),
        }
    }

    /// Feed the next chunk. Input may be fragmented arbitrarily: the parse
    /// result depends only on the concatenated bytes, never on chunk
    /// boundaries.
    ///
    /// # Panics
    ///
    /// Panics when called again after `Complete` or `Failed`.
    pub fn feed(&mut self, chunk: impl Into<Bytes>) -> Feed {
        match self.task.resume(chunk.into()) {
            Step::Yielded => Feed::NeedMore,
            Step::Complete(Some((request, leftover))) => Feed::Complete { request, leftover },
            Step::Complete(None) => Feed::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

// ── Parse body ──────────────────────────────────────────────────────────

/// Input cursor over the current chunk. The chunk is replaced wholesale on
/// every suspension.
struct Input {
    data: Bytes,
    inbox: Inbox<Bytes>,
}

impl Input {
    async fn refill(&mut self) {
        self.data = self.inbox.recv().await;
    }

    /// Acquire the next CRLF-terminated line, suspending for more data as
    /// needed. A `\r` ending one chunk followed by `\n` opening the next
    /// counts as a terminator. Returns None when the line content itself
    /// contains a stray CR or LF (bare line endings are not tolerated).
    async fn next_line(&mut self, acc: &mut BytesMut) -> Option<Bytes> {
        acc.clear();
        loop {
            if acc.last() == Some(&CR) && self.data.first() == Some(&LF) {
                self.data.advance(1);
                acc.truncate(acc.len() - 1);
                return check_line(acc.split().freeze());
            }
            if let Some(pos) = find_crlf(&self.data) {
                let line = if acc.is_empty() {
                    let line = self.data.split_to(pos);
                    self.data.advance(2);
                    line
                } else {
                    acc.extend_from_slice(&self.data[..pos]);
                    self.data.advance(pos + 2);
                    acc.split().freeze()
                };
                return check_line(line);
            }
            // No terminator yet; bank the whole chunk and wait.
            acc.extend_from_slice(&self.data);
            self.data = Bytes::new();
            self.refill().await;
        }
    }

    /// Consume exactly `n` body bytes, suspending as needed.
    async fn read_exact(&mut self, n: usize) -> Bytes {
        let mut body = BytesMut::with_capacity(n.min(8 * 1024));
        while body.len() < n {
            if self.data.is_empty() {
                self.refill().await;
                continue;
            }
            let take = (n - body.len()).min(self.data.len());
            body.extend_from_slice(&self.data[..take]);
            self.data.advance(take);
        }
        body.freeze()
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn check_line(line: Bytes) -> Option<Bytes> {
    if line.iter().any(|&b| b == CR || b == LF) {
        return None;
    }
    Some(line)
}

async fn parse_request(inbox: Inbox<Bytes>) -> Option<(Request, Bytes)> {
    let mut input = Input {
        data: Bytes::new(),
        inbox,
    };
    input.refill().await;

    let mut acc = BytesMut::new();

    // Request line: exactly three space-separated parts.
    let line = input.next_line(&mut acc).await?;
    let parts: Vec<&[u8]> = line.split(|&b| b == SP).collect();
    if parts.len() != 3 {
        return None;
    }
    let method = Method::from_bytes(parts[0])?;
    let target = RequestTarget::parse(parts[1])?;
    let version = std::str::from_utf8(parts[2]).ok()?.to_string();

    // Header fields, terminated by an empty line.
    let mut headers = Headers::default();
    loop {
        let line = input.next_line(&mut acc).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = parse_header_field(&line)?;
        headers.insert(name, value);
    }

    // Body, bounded by Content-Length.
    let mut body = None;
    if let Some(raw) = headers.get("Content-Length") {
        let n = raw.parse::<u64>().ok()?;
        if n > 0 {
            let n = usize::try_from(n).ok()?;
            body = Some(input.read_exact(n).await);
        }
    }

    let request = Request {
        method,
        target,
        version,
        headers,
        body,
    };
    Some((request, input.data))
}

/// `field-name ":" field-value`: a tchar+ name, then a value of tchars,
/// spaces and horizontal tabs, trimmed of leading and trailing whitespace.
/// Anything after the value token is ignored.
fn parse_header_field(line: &[u8]) -> Option<(String, String)> {
    let name_end = line
        .iter()
        .position(|&b| !grammar::is_tchar(b))
        .unwrap_or(line.len());
    if name_end == 0 {
        return None;
    }
    if line.get(name_end) != Some(&b':') {
        return None;
    }

    let rest = &line[name_end + 1..];
    let value_end = rest
        .iter()
        .position(|&b| !(grammar::is_tchar(b) || b == SP || b == HTAB))
        .unwrap_or(rest.len());
    let value = &rest[..value_end];
    if value.is_empty() {
        return None;
    }
    let value = grammar::trim_ows(value);

    let name = std::str::from_utf8(&line[..name_end]).ok()?;
    let value = std::str::from_utf8(value).ok()?;
    Some((name.to_string(), value.to_string()))
}
