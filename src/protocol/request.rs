//! Request validation and tokenizing

use crate::error::ProtocolError;
use crate::protocol::LineAssembler;
use bytes::BytesMut;
use tracing::error;

/// Literal request that closes the session without a reply
pub const QUIT: &str = "quit";

/// Number of characters of offending input kept in error logs
const PREVIEW_CHARS: usize = 128;

/// Size limits applied to every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    /// Fixed receive buffer capacity; reaching it without a terminator is fatal
    pub recv_buffer_size: usize,
    /// Longest accepted request after trimming
    pub max_request_size: usize,
}

impl RequestLimits {
    /// Buffered bytes without a terminator must stay below capacity
    pub fn check_capacity(&self, buffered: usize) -> Result<(), ProtocolError> {
        if buffered >= self.recv_buffer_size {
            return Err(ProtocolError::BufferOverflow { length: buffered });
        }
        Ok(())
    }

    pub fn check_length(&self, request: &str) -> Result<(), ProtocolError> {
        if request.len() > self.max_request_size {
            return Err(ProtocolError::RequestTooLarge {
                length: request.len(),
                max: self.max_request_size,
            });
        }
        Ok(())
    }
}

/// A trimmed, whitespace-tokenized request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    text: String,
    args: Vec<String>,
}

impl Request {
    /// Validate a decoded line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str, limits: &RequestLimits) -> Result<Option<Self>, ProtocolError> {
        let text = line.trim();
        let args: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
        if args.is_empty() {
            return Ok(None);
        }

        if let Err(e) = limits.check_length(text) {
            error!(
                "Rejecting large request. length: {}, request: {}",
                text.len(),
                preview(text)
            );
            return Err(e);
        }

        Ok(Some(Self {
            text: text.to_owned(),
            args,
        }))
    }

    /// Full request text as sent to the command engine
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Command name followed by its arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// First token
    pub fn command(&self) -> &str {
        &self.args[0]
    }

    pub fn is_quit(&self) -> bool {
        self.text == QUIT
    }
}

/// Pulls validated requests out of a receive buffer.
///
/// Combines line framing with the size checks and skips blank lines.
#[derive(Debug)]
pub struct RequestReader {
    assembler: LineAssembler,
    limits: RequestLimits,
}

impl RequestReader {
    pub fn new(assembler: LineAssembler, limits: RequestLimits) -> Self {
        Self { assembler, limits }
    }

    pub fn limits(&self) -> &RequestLimits {
        &self.limits
    }

    /// Next non-blank request, or `Ok(None)` once the buffer holds no
    /// complete line. Fails when the buffer is full of unterminated input.
    pub fn next_request(&mut self, buf: &mut BytesMut) -> Result<Option<Request>, ProtocolError> {
        while let Some(line) = self.assembler.read_line(buf)? {
            if let Some(request) = Request::parse(&line, &self.limits)? {
                return Ok(Some(request));
            }
        }

        if let Err(e) = self.limits.check_capacity(buf.len()) {
            error!(
                "Receive buffer limit reached. length: {}, request: {}",
                buf.len(),
                preview(&String::from_utf8_lossy(buf))
            );
            return Err(e);
        }
        Ok(None)
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
