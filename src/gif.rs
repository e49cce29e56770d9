//! GIF format
//! <https://en.wikipedia.org/wiki/GIF>

use std::fmt;

use nom::bytes::complete::{tag, take};
use nom::combinator::{flat_map, map, verify};
use nom::multi::{count, many0};
use nom::number::complete::{le_u16, le_u8};
use nom::sequence::{pair, terminated, tuple};
use tracing::{debug, trace, warn};

use crate::error::{fail, truncated, Anomaly, Field, IResult, ParseError};
use crate::extension::ExtensionType;
use crate::lzw;

pub trait Parse
where
    Self: Sized,
{
    fn parse(input: &[u8]) -> IResult<'_, Self>;
}

const SIGNATURE: &[u8] = b"GIF";
const IMAGE_SEPARATOR: u8 = 0x2c;
const EXTENSION_INTRODUCER: u8 = 0x21;
const TRAILER: u8 = 0x3b;
const BLOCK_TERMINATOR: &[u8] = &[0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Gif87a,
    Gif89a,
}

impl Parse for Version {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        let Ok((rest, (signature, version))) =
            tuple((take::<_, _, ParseError>(3usize), take(3usize)))(input)
        else {
            return fail(ParseError::InvalidSignature);
        };
        if signature != SIGNATURE {
            return fail(ParseError::InvalidSignature);
        }

        let version = match version {
            b"87a" => Self::Gif87a,
            b"89a" => Self::Gif89a,
            other => return fail(ParseError::UnknownVersion([other[0], other[1], other[2]])),
        };
        Ok((rest, version))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Parse for Rgb {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        map(tuple((le_u8, le_u8, le_u8)), |(red, green, blue)| Self {
            red,
            green,
            blue,
        })(input)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Color table fields of a packed flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTableSpec {
    pub present: bool,
    /// Metadata only, lookups ignore it
    pub sorted: bool,
    pub size_exponent: u8,
}

impl ColorTableSpec {
    /// Number of colors in the table
    pub fn color_count(&self) -> usize {
        2 << self.size_exponent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    pub colors: Box<[Rgb]>,
    pub sorted: bool,
}

impl ColorTable {
    fn parse(input: &[u8], spec: ColorTableSpec) -> IResult<'_, Self> {
        let (rest, colors) =
            truncated(Field::ColorTable, count(Rgb::parse, spec.color_count()))(input)?;
        let table = Self {
            colors: colors.into_boxed_slice(),
            sorted: spec.sorted,
        };
        Ok((rest, table))
    }

    /// Parse a table only when `spec` declares one
    fn parse_optional(input: &[u8], spec: ColorTableSpec) -> IResult<'_, Option<Self>> {
        if spec.present {
            Self::parse(input, spec).map(|(rest, table)| (rest, Some(table)))
        } else {
            Ok((input, None))
        }
    }

    pub fn get(&self, index: u16) -> Option<Rgb> {
        self.colors.get(usize::from(index)).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalScreenDescriptor {
    pub width: u16,
    pub height: u16,
    /// Bits per primary color of the source image
    pub depth: u8,
    pub global_color_table_spec: ColorTableSpec,
    pub global_color_table: Option<ColorTable>,
    pub bg_color: u8,
    pub pixel_aspect_ratio: u8,
}

impl Parse for LogicalScreenDescriptor {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        let (rest, (width, height, flags, bg_color, pixel_aspect_ratio)) = truncated(
            Field::ScreenDescriptor,
            tuple((le_u16, le_u16, le_u8, le_u8, le_u8)),
        )(input)?;

        let spec = ColorTableSpec {
            present: flags & 0x80 != 0,
            sorted: flags & 0x08 != 0,
            size_exponent: flags & 0x07,
        };
        let (rest, global_color_table) = ColorTable::parse_optional(rest, spec)?;

        let lsd = Self {
            width,
            height,
            depth: ((flags >> 4) & 0x07) + 1,
            global_color_table_spec: spec,
            global_color_table,
            bg_color,
            pixel_aspect_ratio,
        };
        Ok((rest, lsd))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    pub screen_descriptor: LogicalScreenDescriptor,
}

impl Parse for Header {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        map(
            pair(Version::parse, LogicalScreenDescriptor::parse),
            |(version, screen_descriptor)| Self {
                version,
                screen_descriptor,
            },
        )(input)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBlock {
    pub data: Vec<u8>,
}

impl Parse for SubBlock {
    /// One length prefixed chunk, the zero length terminator is rejected
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        map(
            verify(flat_map(le_u8, take), |data: &[u8]| !data.is_empty()),
            |data: &[u8]| Self {
                data: data.to_vec(),
            },
        )(input)
    }
}

pub type SubBlocks = Vec<SubBlock>;

/// Sub-blocks up to and including the zero length terminator
fn sub_blocks(input: &[u8]) -> IResult<'_, SubBlocks> {
    terminated(many0(SubBlock::parse), tag(BLOCK_TERMINATOR))(input)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub position: (u16, u16),
    pub width: u16,
    pub height: u16,
    pub interlace: bool,
    pub local_color_table_spec: ColorTableSpec,
    pub local_color_table: Option<ColorTable>,
}

impl Parse for ImageDescriptor {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        let (rest, (x, y, width, height, flags)) = truncated(
            Field::ImageDescriptor,
            tuple((le_u16, le_u16, le_u16, le_u16, le_u8)),
        )(input)?;

        let spec = ColorTableSpec {
            present: flags & 0x80 != 0,
            sorted: flags & 0x20 != 0,
            size_exponent: flags & 0x07,
        };
        let (rest, local_color_table) = ColorTable::parse_optional(rest, spec)?;

        let id = Self {
            position: (x, y),
            width,
            height,
            interlace: flags & 0x40 != 0,
            local_color_table_spec: spec,
            local_color_table,
        };
        Ok((rest, id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// LZW minimum code size, codes start one bit wider
    pub min_code_size: u8,
    /// Decoded color table indices
    pub indices: Box<[u16]>,
    pub anomalies: Vec<lzw::Anomaly>,
}

impl Parse for ImageData {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        let (rest, min_code_size) = truncated(Field::MinCodeSize, le_u8)(input)?;
        let (rest, blocks) = truncated(Field::ImageData, sub_blocks)(rest)?;

        let data: Vec<u8> = blocks.iter().flat_map(|b| b.data.iter().copied()).collect();
        trace!(
            "{} bytes of LZW data in {} sub-blocks",
            data.len(),
            blocks.len()
        );
        let decoded = lzw::decode(&data, min_code_size.saturating_add(1));

        let image_data = Self {
            min_code_size,
            indices: decoded.indices.into_boxed_slice(),
            anomalies: decoded.anomalies,
        };
        Ok((rest, image_data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub image_descriptor: ImageDescriptor,
    pub image_data: ImageData,
}

impl Parse for Image {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        map(
            pair(ImageDescriptor::parse, ImageData::parse),
            |(image_descriptor, image_data)| Self {
                image_descriptor,
                image_data,
            },
        )(input)
    }
}

impl Image {
    /// Table the indices refer to: the local table if it has colors, else `global`
    pub fn color_table<'a>(&'a self, global: Option<&'a ColorTable>) -> Option<&'a ColorTable> {
        match &self.image_descriptor.local_color_table {
            Some(local) if !local.is_empty() => Some(local),
            _ => global,
        }
    }

    /// Look up every decoded index, `None` where it falls outside the table
    pub fn colors(&self, global: Option<&ColorTable>) -> Vec<Option<Rgb>> {
        let table = self.color_table(global);
        self.image_data
            .indices
            .iter()
            .map(|&index| table.and_then(|t| t.get(index)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub label: u8,
    pub data: SubBlocks,
    pub ext_type: ExtensionType,
}

impl Parse for Extension {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        let (rest, (label, data)) = pair(
            truncated(Field::ExtensionLabel, le_u8),
            truncated(Field::ExtensionData, sub_blocks),
        )(input)?;

        let ext_type = match ExtensionType::interpret(label, &data) {
            Ok(ext_type) => ext_type,
            Err(e) => return fail(e),
        };
        if let ExtensionType::GraphicControl(gce) = &ext_type {
            if gce.is_transparent_color_suspicious() {
                warn!(
                    "Transparent color {} given without transparency flag",
                    gce.transparent_color
                );
            }
        }

        Ok((
            rest,
            Self {
                label,
                data,
                ext_type,
            },
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Image(Image),
    Extension(Extension),
}

impl Parse for Block {
    fn parse(input: &[u8]) -> IResult<'_, Self> {
        let (rest, sentinel) = le_u8::<_, ParseError>(input)?;
        match sentinel {
            IMAGE_SEPARATOR => map(Image::parse, Self::Image)(rest),
            EXTENSION_INTRODUCER => map(Extension::parse, Self::Extension)(rest),
            other => fail(ParseError::UnknownBlockTag(other)),
        }
    }
}

/// End of the block stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trailer {
    /// Bytes after the trailer, ignored
    pub extra_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gif {
    pub header: Header,
    pub blocks: Vec<Block>,
    /// `None` when the input ran out before a trailer
    pub trailer: Option<Trailer>,
}

impl Parse for Gif {
    fn parse(bytes: &[u8]) -> IResult<'_, Self> {
        let (mut input, header) = Header::parse(bytes)?;
        let mut blocks = Vec::new();

        let trailer = loop {
            match input.split_first() {
                None => {
                    warn!("No trailer");
                    break None;
                }
                Some((&TRAILER, rest)) => {
                    if !rest.is_empty() {
                        debug!("{} bytes after trailer", rest.len());
                    }
                    input = &rest[rest.len()..];
                    break Some(Trailer {
                        extra_data: rest.to_vec(),
                    });
                }
                Some(_) => {
                    let (rest, block) = Block::parse(input)?;
                    debug!(
                        "Block {} at offset {}: {}",
                        blocks.len(),
                        bytes.len() - input.len(),
                        block.name()
                    );
                    blocks.push(block);
                    input = rest;
                }
            }
        };

        Ok((
            input,
            Self {
                header,
                blocks,
                trailer,
            },
        ))
    }
}

impl Block {
    fn name(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Extension(_) => "extension",
        }
    }
}

impl Gif {
    pub fn width(&self) -> u16 {
        self.header.screen_descriptor.width
    }

    pub fn height(&self) -> u16 {
        self.header.screen_descriptor.height
    }

    pub fn global_color_table(&self) -> Option<&ColorTable> {
        self.header.screen_descriptor.global_color_table.as_ref()
    }

    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Image(image) => Some(image),
            Block::Extension(_) => None,
        })
    }

    /// Parsing reached the trailer
    pub fn is_complete(&self) -> bool {
        self.trailer.is_some()
    }

    /// Recoverable problems, in stream order
    pub fn anomalies(&self) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for (block, entry) in self.blocks.iter().enumerate() {
            match entry {
                Block::Image(image) => {
                    anomalies.extend(
                        image
                            .image_data
                            .anomalies
                            .iter()
                            .cloned()
                            .map(|anomaly| Anomaly::Lzw { block, anomaly }),
                    );
                }
                Block::Extension(Extension {
                    ext_type: ExtensionType::GraphicControl(gce),
                    ..
                }) if gce.is_transparent_color_suspicious() => {
                    anomalies.push(Anomaly::SuspiciousTransparentIndex {
                        block,
                        index: gce.transparent_color,
                    });
                }
                Block::Extension(_) => {}
            }
        }
        if self.trailer.is_none() {
            anomalies.push(Anomaly::MissingTrailer);
        }
        anomalies
    }
}
