//! Human readable rendering of a parsed [`Gif`]

use std::fmt::{self, Display, Formatter};

use crate::extension::{
    Application, ApplicationData, ExtensionType, GraphicControl, NetscapeBlock,
};
use crate::gif::{Block, ColorTable, ColorTableSpec, Extension, Gif, Image};

/// Text report of every block, in stream order
pub struct Report<'a> {
    gif: &'a Gif,
    show_data: bool,
}

impl<'a> Report<'a> {
    pub fn new(gif: &'a Gif) -> Self {
        Self {
            gif,
            show_data: true,
        }
    }

    /// Include decoded color indices of each image
    pub fn show_data(mut self, show_data: bool) -> Self {
        self.show_data = show_data;
        self
    }

    fn image(&self, f: &mut Formatter<'_>, image: &Image) -> fmt::Result {
        let id = &image.image_descriptor;
        writeln!(f, "Image:")?;
        writeln!(f, "  Position: {}x{}", id.position.0, id.position.1)?;
        writeln!(f, "  Size: {}x{}", id.width, id.height)?;
        writeln!(f, "  Interlace: {}", id.interlace)?;
        color_table(
            f,
            "  ",
            id.local_color_table_spec,
            id.local_color_table.as_ref(),
        )?;

        let data = &image.image_data;
        if self.show_data {
            writeln!(f, "  Data ({}): {:?}", data.indices.len(), data.indices)?;
        } else {
            writeln!(f, "  Data ({})", data.indices.len())?;
        }
        for anomaly in &data.anomalies {
            writeln!(f, "  Warning: {anomaly}")?;
        }
        Ok(())
    }
}

impl Display for Report<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let lsd = &self.gif.header.screen_descriptor;
        writeln!(f, "Size: {}x{}", lsd.width, lsd.height)?;
        writeln!(f, "Original Depth: {}", lsd.depth)?;
        writeln!(f, "Background Color: {}", lsd.bg_color)?;
        writeln!(f, "Pixel Aspect Ratio: {}", lsd.pixel_aspect_ratio)?;
        color_table(
            f,
            "",
            lsd.global_color_table_spec,
            lsd.global_color_table.as_ref(),
        )?;

        for block in &self.gif.blocks {
            match block {
                Block::Image(image) => self.image(f, image)?,
                Block::Extension(extension) => self::extension(f, extension)?,
            }
        }

        match &self.gif.trailer {
            Some(trailer) if !trailer.extra_data.is_empty() => {
                writeln!(f, "Extra Data: {}", ByteString(&trailer.extra_data))
            }
            Some(_) => Ok(()),
            None => writeln!(f, "No trailer"),
        }
    }
}

fn color_table(
    f: &mut Formatter<'_>,
    indent: &str,
    spec: ColorTableSpec,
    table: Option<&ColorTable>,
) -> fmt::Result {
    match table {
        Some(table) => {
            let colors: Vec<String> = table.colors.iter().map(|c| c.to_string()).collect();
            writeln!(f, "{indent}Colors ({}): {}", table.len(), colors.join(", "))?;
        }
        None if spec.size_exponent != 0 => {
            writeln!(f, "{indent}Color Table Size: {}", spec.size_exponent)?;
        }
        None => {}
    }
    if spec.sorted {
        writeln!(f, "{indent}Color Table Sorted: true")?;
    }
    Ok(())
}

fn extension(f: &mut Formatter<'_>, extension: &Extension) -> fmt::Result {
    match &extension.ext_type {
        ExtensionType::GraphicControl(gce) => graphic_control(f, gce),
        ExtensionType::Comment(comment) => {
            writeln!(f, "Comment Extension:")?;
            writeln!(f, "  Comment: {comment:?}")
        }
        ExtensionType::Application(app) => application(f, app),
        ExtensionType::Unknown(label) => {
            writeln!(f, "Extension: 0x{label:02x}")?;
            for block in &extension.data {
                writeln!(f, "  Data: {}", ByteString(&block.data))?;
            }
            Ok(())
        }
    }
}

fn graphic_control(f: &mut Formatter<'_>, gce: &GraphicControl) -> fmt::Result {
    writeln!(f, "Graphic Control Extension:")?;
    writeln!(f, "  Delay Time: {}/100 s", gce.delay_time)?;
    if gce.has_transparent {
        writeln!(f, "  Transparent Color: {}", gce.transparent_color)?;
    } else if gce.is_transparent_color_suspicious() {
        writeln!(f, "  Transparent Color: {} (!)", gce.transparent_color)?;
    }
    writeln!(f, "  Disposal Method: {}", gce.disposal_method)?;
    writeln!(f, "  User Input: {}", gce.user_input)
}

fn application(f: &mut Formatter<'_>, app: &Application) -> fmt::Result {
    match &app.data {
        ApplicationData::Netscape(blocks) => {
            writeln!(f, "NETSCAPE Extension:")?;
            writeln!(f, "  Version: {}", app.authentication_code)?;
            for block in blocks {
                match block {
                    NetscapeBlock::LoopCount(count) => writeln!(f, "  Loop Count: {count}")?,
                    NetscapeBlock::Other { id, data } => {
                        writeln!(f, "  Sub-Block {id}: {}", ByteString(data))?
                    }
                }
            }
        }
        ApplicationData::Opaque(blocks) => {
            writeln!(f, "Application Extension:")?;
            writeln!(f, "  Application Identifier: {}", app.identifier)?;
            writeln!(
                f,
                "  Application Authentication Code: {}",
                app.authentication_code
            )?;
            for block in blocks {
                writeln!(f, "  Data: {}", ByteString(block))?;
            }
        }
    }
    Ok(())
}

/// Raw bytes as an escaped byte string literal
struct ByteString<'a>(&'a [u8]);

impl Display for ByteString<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("b\"")?;
        for &byte in self.0 {
            write!(f, "{}", std::ascii::escape_default(byte))?;
        }
        f.write_str("\"")
    }
}
