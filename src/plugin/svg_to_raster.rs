//! Rasterizes svg markup to png through the shared renderer pool.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use serde_json::Value;

use crate::renderer::{RenderFlags, RendererPool};

use super::{Params, Plugin, PluginError, PluginInput, RESOLUTIONS, RTL_FLIP, SIZES, SVG_TO_RASTER};

/// Renders each input at `sizes` x `resolutions` pixels.
///
/// Parameters:
/// - `sizes`: a side length or `{ "width", "height" }` in points (default 24)
/// - `resolutions`: scale factor applied to the size (default 1)
/// - `rtlFlip`: mirror horizontally and suffix the name with `-rtl`
pub struct SvgToRaster {
    renderer: Arc<RendererPool>,
}

impl SvgToRaster {
    pub fn new(renderer: Arc<RendererPool>) -> Self {
        Self { renderer }
    }
}

fn size_param(params: &Params) -> Result<(u32, u32), PluginError> {
    let Some(value) = params.get(SIZES) else {
        return Ok((24, 24));
    };
    let dimension = |v: Option<&Value>| {
        v.and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| PluginError::invalid_param(SIZES, format!("expected a positive integer or {{width, height}}, got {value}")))
    };
    match value {
        Value::Object(rect) => Ok((dimension(rect.get("width"))?, dimension(rect.get("height"))?)),
        side => {
            let side = dimension(Some(side))?;
            Ok((side, side))
        }
    }
}

fn resolution_param(params: &Params) -> Result<f64, PluginError> {
    match params.get(RESOLUTIONS) {
        None => Ok(1.0),
        Some(value) => value
            .as_f64()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| PluginError::invalid_param(RESOLUTIONS, format!("expected a positive number, got {value}"))),
    }
}

/// Pixel length of `points` at `resolution`, rounded. Must land in `1..=u32::MAX`.
fn scaled(points: u32, resolution: f64) -> Result<u32, PluginError> {
    let pixels = (f64::from(points) * resolution).round();
    if pixels.is_finite() && pixels >= 1.0 && pixels <= f64::from(u32::MAX) {
        Ok(pixels as u32)
    } else {
        Err(PluginError::invalid_param(
            RESOLUTIONS,
            format!("{points}pt at {resolution}x gives {pixels} pixels"),
        ))
    }
}

fn rtl_param(params: &Params) -> bool {
    params.get(RTL_FLIP).and_then(Value::as_bool).unwrap_or(false)
}

/// Formats a scale factor without a trailing `.0` (`2`, `1.5`).
pub(crate) fn format_resolution(resolution: f64) -> String {
    if resolution.fract() == 0.0 {
        format!("{}", resolution as i64)
    } else {
        format!("{resolution}")
    }
}

impl Plugin for SvgToRaster {
    fn name(&self) -> &str {
        SVG_TO_RASTER
    }

    fn output_extension(&self, _input_extension: &str) -> String {
        "png".to_string()
    }

    /// `filled` becomes `filled-24x24@2`, and `filled-24x24@2-rtl` when flipped.
    fn output_name(&self, input_name: &str, iterant: &[(String, Value)], params: &Params) -> String {
        let mut name = input_name.to_string();
        if !iterant.is_empty() {
            if let (Ok((width, height)), Ok(resolution)) = (size_param(params), resolution_param(params)) {
                name = format!("{name}-{width}x{height}@{}", format_resolution(resolution));
            }
        }
        if rtl_param(params) {
            name.push_str("-rtl");
        }
        name
    }

    fn transform(&self, input: &PluginInput<'_>, params: &Params) -> Result<Vec<u8>, PluginError> {
        let markup = input.text()?;
        let (width, height) = size_param(params)?;
        let resolution = resolution_param(params)?;
        let pixel_width = scaled(width, resolution)?;
        let pixel_height = scaled(height, resolution)?;

        let flags = RenderFlags {
            rtl_flip: rtl_param(params),
        };
        let image = self.renderer.render(markup, pixel_width, pixel_height, flags)?;

        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}
