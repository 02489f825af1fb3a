//! PNG export of a captured frame

use anyhow::{bail, Context, Result};
use capture_engine::FrameInfo;
use image::ExtendedColorType;
use std::path::Path;
use tracing::info;

/// Pixels copied out of the last delivered frame
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub info: Option<FrameInfo>,
    /// MSB-aligned, native-endian for 16-bit samples
    pub pixels: Vec<u8>,
}

fn color_type(layers: u32, wide: bool) -> Result<ExtendedColorType> {
    Ok(match (layers, wide) {
        (1, false) => ExtendedColorType::L8,
        (2, false) => ExtendedColorType::La8,
        (3, false) => ExtendedColorType::Rgb8,
        (4, false) => ExtendedColorType::Rgba8,
        (1, true) => ExtendedColorType::L16,
        (2, true) => ExtendedColorType::La16,
        (3, true) => ExtendedColorType::Rgb16,
        (4, true) => ExtendedColorType::Rgba16,
        (layers, _) => bail!("frames with {} layers can't be saved as PNG", layers),
    })
}

impl Snapshot {
    /// Write the snapshot as a PNG image
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let Some(info) = self.info else {
            bail!("no frame was captured");
        };
        let color = color_type(info.layers, info.bytes_per_sample() == 2)?;
        image::save_buffer_with_format(
            path,
            &self.pixels,
            info.width,
            info.height,
            color,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(
            "Saved {}x{} snapshot to {}",
            info.width,
            info.height,
            path.display()
        );
        Ok(())
    }
}
