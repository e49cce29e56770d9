//! Structural GIF decoder.
//!
//! [`parse`] walks a GIF87a/GIF89a byte stream and returns every block it
//! holds, with image data run through the LZW decompressor in [`lzw`].
//! Fatal problems end the parse with a [`ParseError`]; recoverable ones are
//! collected by [`Gif::anomalies`]. [`report::Report`] renders the result as
//! text.

pub mod config;
pub mod error;
pub mod extension;
pub mod gif;
pub mod lzw;
pub mod report;

pub use error::{Anomaly, ErrorCategory, ParseError};
pub use gif::{Gif, Parse};

/// Parse a complete GIF held in memory.
pub fn parse(bytes: &[u8]) -> Result<Gif, ParseError> {
    match Gif::parse(bytes) {
        Ok((_, gif)) => Ok(gif),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(e),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Nom(nom::error::ErrorKind::Complete)),
    }
}
