//! Parse errors and recoverable decode anomalies

use std::fmt;
use std::str::Utf8Error;

use nom::error::{ErrorKind, ParseError as NomParseError};
use nom::Parser;
use thiserror::Error;

use crate::lzw;

pub(crate) type IResult<'a, O> = nom::IResult<&'a [u8], O, ParseError>;

/// Structure that ran out of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ScreenDescriptor,
    ColorTable,
    ImageDescriptor,
    MinCodeSize,
    ImageData,
    ExtensionLabel,
    ExtensionData,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ScreenDescriptor => "logical screen descriptor",
            Self::ColorTable => "color table",
            Self::ImageDescriptor => "image descriptor",
            Self::MinCodeSize => "LZW minimum code size",
            Self::ImageData => "image data",
            Self::ExtensionLabel => "extension label",
            Self::ExtensionData => "extension data",
        })
    }
}

/// Fatal errors, parsing stops at the first one
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Not a GIF file")]
    InvalidSignature,

    #[error("Unknown GIF version {}", String::from_utf8_lossy(.0))]
    UnknownVersion([u8; 3]),

    #[error("Not enough space for {0}")]
    Truncated(Field),

    #[error("Unknown block 0x{0:02x}")]
    UnknownBlockTag(u8),

    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error("Unexpected parser error: {0:?}")]
    Nom(ErrorKind),
}

/// Violations of the fixed layout of a known extension
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("Graphic Control Extension has {0} blocks, expected 1")]
    GraphicControlBlockCount(usize),

    #[error("Length mismatch in Graphic Control Extension: {0} bytes, expected 4")]
    GraphicControlLength(usize),

    #[error("Not enough blocks in Application Extension")]
    MissingApplicationHeader,

    #[error("Application Extension invalid block size {0}, expected 11")]
    ApplicationHeaderLength(usize),

    #[error("Application Extension invalid identifier")]
    InvalidIdentifier,

    #[error("Application Extension invalid authentication code")]
    InvalidAuthenticationCode,

    #[error("NETSCAPE loop sub-block invalid length {0}, expected 3")]
    LoopCountLength(usize),

    #[error("Comment is not valid UTF-8: {0}")]
    InvalidComment(Utf8Error),
}

/// Coarse classification of a [`ParseError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad signature, version or block tag
    Structural,
    /// A declared or fixed length runs past the end of the input
    Truncation,
    /// A known extension breaks its own layout rules
    Semantic,
}

impl ParseError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Truncated(_) => ErrorCategory::Truncation,
            Self::Extension(_) => ErrorCategory::Semantic,
            Self::InvalidSignature
            | Self::UnknownVersion(_)
            | Self::UnknownBlockTag(_)
            | Self::Nom(_) => ErrorCategory::Structural,
        }
    }
}

impl<'a> NomParseError<&'a [u8]> for ParseError {
    fn from_error_kind(_input: &'a [u8], kind: ErrorKind) -> Self {
        Self::Nom(kind)
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Abort the whole parse with `error`.
pub(crate) fn fail<O>(error: impl Into<ParseError>) -> Result<O, nom::Err<ParseError>> {
    Err(nom::Err::Failure(error.into()))
}

/// Run `parser`, turning a recoverable error (out of input) into a fatal
/// truncation of `field`. Failures raised inside `parser` pass through.
pub(crate) fn truncated<'a, O, P>(
    field: Field,
    mut parser: P,
) -> impl FnMut(&'a [u8]) -> IResult<'a, O>
where
    P: Parser<&'a [u8], O, ParseError>,
{
    move |input| {
        parser.parse(input).map_err(|err| match err {
            nom::Err::Error(_) | nom::Err::Incomplete(_) => {
                nom::Err::Failure(ParseError::Truncated(field))
            }
            failure => failure,
        })
    }
}

/// Problems that are reported but do not stop the parse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("Block {block}: {anomaly}")]
    Lzw { block: usize, anomaly: lzw::Anomaly },

    /// Transparent color byte set while the transparency flag is clear
    #[error("Block {block}: transparent color {index} given without transparency flag")]
    SuspiciousTransparentIndex { block: usize, index: u8 },

    #[error("No trailer")]
    MissingTrailer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::number::complete::le_u16;

    #[test]
    fn truncated_maps_eof_to_field() {
        let mut parser = truncated(Field::ImageDescriptor, le_u16);
        assert_eq!(
            parser(b"\x01".as_slice()),
            Err(nom::Err::Failure(ParseError::Truncated(Field::ImageDescriptor)))
        );
        assert_eq!(parser(b"\x01\x02".as_slice()), Ok((b"".as_slice(), 0x0201)));
    }

    #[test]
    fn truncated_keeps_inner_failures() {
        fn reject(_input: &[u8]) -> IResult<'_, ()> {
            fail(ExtensionError::MissingApplicationHeader)
        }

        let mut parser = truncated(Field::ExtensionData, reject);
        assert_eq!(
            parser(b"".as_slice()),
            Err(nom::Err::Failure(ParseError::Extension(
                ExtensionError::MissingApplicationHeader
            )))
        );
    }

    #[test]
    fn categories() {
        assert_eq!(ParseError::InvalidSignature.category(), ErrorCategory::Structural);
        assert_eq!(ParseError::UnknownBlockTag(0x00).category(), ErrorCategory::Structural);
        assert_eq!(
            ParseError::Truncated(Field::ColorTable).category(),
            ErrorCategory::Truncation
        );
        assert_eq!(
            ParseError::from(ExtensionError::GraphicControlBlockCount(2)).category(),
            ErrorCategory::Semantic
        );
    }

    #[test]
    fn messages() {
        assert_eq!(
            ParseError::UnknownVersion(*b"90a").to_string(),
            "Unknown GIF version 90a"
        );
        assert_eq!(
            ParseError::Truncated(Field::ImageDescriptor).to_string(),
            "Not enough space for image descriptor"
        );
        assert_eq!(ParseError::UnknownBlockTag(0x2a).to_string(), "Unknown block 0x2a");
    }
}
