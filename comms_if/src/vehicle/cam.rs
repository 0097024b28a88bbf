//! # Camera frames

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageResult};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A decoded camera frame.
#[derive(Clone)]
pub struct CamImage {
    /// UTC timestamp at which the frame was received
    pub timestamp: DateTime<Utc>,

    /// The image itself
    pub image: DynamicImage,
}

/// A camera frame encoded as base64 JPEG.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: String,
    pub width: u32,
    pub height: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CamDecodeError {
    #[error("The camera payload contains no image")]
    NoImage,

    #[error("The camera image is not valid base64: {0}")]
    Base64Error(base64::DecodeError),

    #[error("The camera image could not be decoded: {0}")]
    ImageError(image::ImageError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamImage {
    /// Decode a base64 encoded image in any format the `image` crate can guess.
    pub fn from_base64(data: &str) -> Result<Self, CamDecodeError> {
        if data.is_empty() {
            return Err(CamDecodeError::NoImage);
        }

        let bytes = base64::decode(data).map_err(CamDecodeError::Base64Error)?;
        let image = image::load_from_memory(&bytes).map_err(CamDecodeError::ImageError)?;

        Ok(Self {
            timestamp: Utc::now(),
            image,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode this image as base64 JPEG, shrinking it so neither side exceeds `max_dim` while
    /// keeping the aspect ratio.
    pub fn to_jpeg_base64(&self, max_dim: u32, quality: u8) -> ImageResult<EncodedFrame> {
        let resized;
        let image = if self.width() > max_dim || self.height() > max_dim {
            resized = self.image.resize(max_dim, max_dim, FilterType::Lanczos3);
            &resized
        } else {
            &self.image
        };

        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());

        let mut data = Vec::<u8>::new();
        rgb.write_to(&mut data, image::ImageOutputFormat::Jpeg(quality))?;

        Ok(EncodedFrame {
            data: base64::encode(&data),
            width: rgb.width(),
            height: rgb.height(),
        })
    }
}

impl std::fmt::Debug for CamImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CamImage")
            .field("timestamp", &self.timestamp)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
