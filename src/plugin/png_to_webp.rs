//! Re-encodes png assets as lossless webp.

use std::io::Cursor;

use image::ImageFormat;

use super::{Params, Plugin, PluginError, PluginInput, PNG_TO_WEBP};

pub struct PngToWebp;

impl Plugin for PngToWebp {
    fn name(&self) -> &str {
        PNG_TO_WEBP
    }

    fn output_extension(&self, _input_extension: &str) -> String {
        "webp".to_string()
    }

    fn transform(&self, input: &PluginInput<'_>, _params: &Params) -> Result<Vec<u8>, PluginError> {
        let image = image::load_from_memory(input.bytes)?;
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)?;
        Ok(buffer)
    }
}
