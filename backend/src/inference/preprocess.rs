use image::imageops::FilterType;
use ndarray::Array4;

use super::InferenceError;
use crate::config::{ClassifierConfig, ConfigError};

/// Turns encoded image bytes into the normalized batch the model was trained
/// on: fixed square size, RGB, intensities in [0, 1], batch dimension of 1.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    filter: FilterType,
    channels_first: bool,
}

impl Preprocessor {
    pub fn new(width: u32, height: u32, filter: FilterType, channels_first: bool) -> Self {
        Self {
            width,
            height,
            filter,
            channels_first,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (width, height) = config.input_size()?;
        Ok(Self::new(
            width,
            height,
            config.resize_filter()?,
            config.image.preprocessing.channels_first,
        ))
    }

    /// NHWC `[1, H, W, 3]`, or NCHW `[1, 3, H, W]` when configured.
    pub fn preprocess(&self, image: &[u8]) -> Result<Array4<f32>, InferenceError> {
        let decoded =
            image::load_from_memory(image).map_err(|e| InferenceError::Decode(e.to_string()))?;
        let rgb = decoded
            .resize_exact(self.width, self.height, self.filter)
            .to_rgb8();

        let (w, h) = (self.width as usize, self.height as usize);
        if rgb.width() as usize != w || rgb.height() as usize != h {
            return Err(InferenceError::Preprocessing(format!(
                "resized to {}x{}, expected {}x{}",
                rgb.width(),
                rgb.height(),
                w,
                h
            )));
        }

        let scale = |x: usize, y: usize, c: usize| {
            f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0
        };

        let tensor = if self.channels_first {
            Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| scale(x, y, c))
        } else {
            Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| scale(x, y, c))
        };
        Ok(tensor)
    }
}
