//! Incremental line framing over a session's receive buffer

use crate::error::ProtocolError;
use crate::protocol::Charset;
use bytes::BytesMut;

/// Extracts `\n`-terminated lines from a receive buffer.
///
/// Remembers how far the previous call scanned so bytes that arrive across
/// several reads are searched once. Complete lines are split off the front
/// of the buffer; unterminated bytes are left in place.
#[derive(Debug, Default)]
pub struct LineAssembler {
    charset: Charset,
    scanned: usize,
}

impl LineAssembler {
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            scanned: 0,
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Take the next complete line out of `buf`.
    ///
    /// Returns `Ok(None)` until a terminator is buffered. The terminator and
    /// an optional preceding `\r` are stripped before decoding.
    pub fn read_line(&mut self, buf: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        let from = self.scanned.min(buf.len());
        let Some(offset) = memchr::memchr(b'\n', &buf[from..]) else {
            self.scanned = buf.len();
            return Ok(None);
        };

        let end = from + offset;
        self.scanned = 0;

        let line = buf.split_to(end + 1);
        let body = &line[..end];
        let body = body.strip_suffix(b"\r").unwrap_or(body);
        self.charset.decode(body).map(Some)
    }

    /// Forget scan progress, e.g. after the buffer was cleared externally
    pub fn reset(&mut self) {
        self.scanned = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut LineAssembler, buf: &mut BytesMut, chunk: &[u8]) -> Vec<String> {
        buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(line) = assembler.read_line(buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_single_read() {
        let mut assembler = LineAssembler::default();
        let mut buf = BytesMut::new();
        assert_eq!(
            feed(&mut assembler, &mut buf, b"cluster_ls\r\n"),
            vec!["cluster_ls"]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_every_split_point_reassembles_identically() {
        let input = "pg_add  c1 0\r\nping\n".as_bytes();

        for split in 0..=input.len() {
            for second in split..=input.len() {
                let mut assembler = LineAssembler::default();
                let mut buf = BytesMut::new();
                let mut lines = feed(&mut assembler, &mut buf, &input[..split]);
                lines.extend(feed(&mut assembler, &mut buf, &input[split..second]));
                lines.extend(feed(&mut assembler, &mut buf, &input[second..]));
                assert_eq!(lines, vec!["pg_add  c1 0", "ping"], "split at {split}/{second}");
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let input = "set é\n".as_bytes();
        let cut = input.len() - 2; // inside the two-byte 'é'

        let mut assembler = LineAssembler::default();
        let mut buf = BytesMut::new();
        assert!(feed(&mut assembler, &mut buf, &input[..cut]).is_empty());
        assert_eq!(feed(&mut assembler, &mut buf, &input[cut..]), vec!["set é"]);
    }

    #[test]
    fn test_partial_tail_kept() {
        let mut assembler = LineAssembler::default();
        let mut buf = BytesMut::new();
        assert_eq!(feed(&mut assembler, &mut buf, b"one\ntw"), vec!["one"]);
        assert_eq!(&buf[..], b"tw");
        assert_eq!(feed(&mut assembler, &mut buf, b"o\n"), vec!["two"]);
    }

    #[test]
    fn test_malformed_line_is_error() {
        let mut assembler = LineAssembler::default();
        let mut buf = BytesMut::from(&b"\xc3\x28\n"[..]);
        assert!(matches!(
            assembler.read_line(&mut buf),
            Err(ProtocolError::Decode { .. })
        ));
    }

    #[test]
    fn test_reset_after_external_clear() {
        let mut assembler = LineAssembler::default();
        let mut buf = BytesMut::from(&b"abcdef"[..]);
        assert_eq!(assembler.read_line(&mut buf).unwrap(), None);
        buf.clear();
        assembler.reset();
        buf.extend_from_slice(b"x\n");
        assert_eq!(assembler.read_line(&mut buf).unwrap().as_deref(), Some("x"));
    }
}
