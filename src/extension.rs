//! Interpretation of extension blocks
//!
//! Graphic Control (`0xF9`), Comment (`0xFE`) and Application (`0xFF`)
//! extensions have a fixed layout that is checked here. Anything else is
//! kept as opaque data under its label.

use std::fmt;

use crate::error::ExtensionError;
use crate::gif::SubBlock;

pub const GRAPHIC_CONTROL_LABEL: u8 = 0xf9;
pub const COMMENT_LABEL: u8 = 0xfe;
pub const APPLICATION_LABEL: u8 = 0xff;

const NETSCAPE_IDENTIFIER: &str = "NETSCAPE";
const NETSCAPE_LOOP_ID: u8 = 0x01;

/// Interpreted extension payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionType {
    GraphicControl(GraphicControl),
    Comment(String),
    Application(Application),
    Unknown(u8),
}

impl ExtensionType {
    /// Interpret the sub-blocks of an extension with `label`.
    pub fn interpret(label: u8, blocks: &[SubBlock]) -> Result<Self, ExtensionError> {
        match label {
            GRAPHIC_CONTROL_LABEL => GraphicControl::from_blocks(blocks).map(Self::GraphicControl),
            COMMENT_LABEL => comment(blocks).map(Self::Comment),
            APPLICATION_LABEL => Application::from_blocks(blocks).map(Self::Application),
            other => Ok(Self::Unknown(other)),
        }
    }
}

/// How a viewer treats a frame once its delay is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalMethod {
    None,
    Keep,
    RestoreBackground,
    RestorePrevious,
    Other(u8),
}

impl From<u8> for DisposalMethod {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Keep,
            2 => Self::RestoreBackground,
            3 => Self::RestorePrevious,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for DisposalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Keep => f.write_str("keep"),
            Self::RestoreBackground => f.write_str("restore background"),
            Self::RestorePrevious => f.write_str("restore previous"),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicControl {
    pub disposal_method: DisposalMethod,
    pub user_input: bool,
    pub has_transparent: bool,
    pub transparent_color: u8,
    /// Hundredths of a second
    pub delay_time: u16,
}

impl GraphicControl {
    fn from_blocks(blocks: &[SubBlock]) -> Result<Self, ExtensionError> {
        let [block] = blocks else {
            return Err(ExtensionError::GraphicControlBlockCount(blocks.len()));
        };
        let &[flags, delay_lo, delay_hi, transparent_color] = block.data.as_slice() else {
            return Err(ExtensionError::GraphicControlLength(block.data.len()));
        };

        Ok(Self {
            disposal_method: ((flags >> 2) & 0b111).into(),
            user_input: flags & 0b10 != 0,
            has_transparent: flags & 0b1 != 0,
            transparent_color,
            delay_time: u16::from_le_bytes([delay_lo, delay_hi]),
        })
    }

    /// A transparent color index without the flag that enables it
    pub fn is_transparent_color_suspicious(&self) -> bool {
        !self.has_transparent && self.transparent_color != 0
    }
}

fn comment(blocks: &[SubBlock]) -> Result<String, ExtensionError> {
    let bytes: Vec<u8> = blocks.iter().flat_map(|b| b.data.iter().copied()).collect();
    String::from_utf8(bytes).map_err(|e| ExtensionError::InvalidComment(e.utf8_error()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub identifier: String,
    pub authentication_code: String,
    pub data: ApplicationData,
}

/// Sub-blocks following the application header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationData {
    Netscape(Vec<NetscapeBlock>),
    Opaque(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetscapeBlock {
    /// 0 loops forever
    LoopCount(u16),
    Other { id: u8, data: Vec<u8> },
}

impl Application {
    fn from_blocks(blocks: &[SubBlock]) -> Result<Self, ExtensionError> {
        let [header, rest @ ..] = blocks else {
            return Err(ExtensionError::MissingApplicationHeader);
        };
        if header.data.len() != 11 {
            return Err(ExtensionError::ApplicationHeaderLength(header.data.len()));
        }
        let (identifier, authentication_code) = header.data.split_at(8);
        let identifier = ascii(identifier).ok_or(ExtensionError::InvalidIdentifier)?;
        let authentication_code =
            ascii(authentication_code).ok_or(ExtensionError::InvalidAuthenticationCode)?;

        let data = if identifier == NETSCAPE_IDENTIFIER {
            ApplicationData::Netscape(
                rest.iter()
                    .map(|b| NetscapeBlock::parse(&b.data))
                    .collect::<Result<_, _>>()?,
            )
        } else {
            ApplicationData::Opaque(rest.iter().map(|b| b.data.clone()).collect())
        };

        Ok(Self {
            identifier,
            authentication_code,
            data,
        })
    }
}

impl NetscapeBlock {
    fn parse(data: &[u8]) -> Result<Self, ExtensionError> {
        match data {
            &[NETSCAPE_LOOP_ID, lo, hi] => Ok(Self::LoopCount(u16::from_le_bytes([lo, hi]))),
            [NETSCAPE_LOOP_ID, ..] => Err(ExtensionError::LoopCountLength(data.len())),
            [id, rest @ ..] => Ok(Self::Other {
                id: *id,
                data: rest.to_vec(),
            }),
            // Sub-blocks are never empty
            [] => Ok(Self::Other {
                id: 0,
                data: vec![],
            }),
        }
    }
}

fn ascii(bytes: &[u8]) -> Option<String> {
    bytes
        .is_ascii()
        .then(|| bytes.iter().map(|&b| char::from(b)).collect())
}
