//! Configured text charset for requests and replies

use crate::error::{EncodeError, ProtocolError};
use bytes::Bytes;
use encoding_rs::Encoding;
use std::borrow::Cow;
use std::fmt;

/// An ASCII-compatible text encoding resolved from a WHATWG label.
///
/// Line framing scans raw bytes for `\n`, so encodings where that byte can
/// appear inside a multi-byte character (UTF-16, ISO-2022-JP) are refused.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    encoding: &'static Encoding,
}

impl Charset {
    /// Resolve a charset label such as `utf-8` or `iso-8859-1`
    pub fn for_label(label: &str) -> crate::Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| crate::ConfGateError::Config(format!("Unknown charset: {label}")))?;

        if !encoding.is_ascii_compatible() {
            return Err(crate::ConfGateError::Config(format!(
                "Charset {} is not ASCII-compatible",
                encoding.name()
            )));
        }

        Ok(Self { encoding })
    }

    /// Canonical name of the encoding
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Decode bytes, failing on any malformed sequence
    pub fn decode(&self, bytes: &[u8]) -> Result<String, ProtocolError> {
        self.encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned)
            .ok_or(ProtocolError::Decode {
                charset: self.name(),
            })
    }

    /// Encode text, failing if any character is unrepresentable
    pub fn encode(&self, text: &str) -> Result<Bytes, EncodeError> {
        let (bytes, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(EncodeError {
                charset: self.name(),
            });
        }
        Ok(match bytes {
            Cow::Borrowed(b) => Bytes::copy_from_slice(b),
            Cow::Owned(v) => Bytes::from(v),
        })
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
        }
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}
