//! QR artifact rendering
//!
//! A claim code is rendered as a PNG QR image. Boxes with a display receive
//! it as a C header holding the PNG bytes in a `PROGMEM` array, phones can
//! ask for the plain PNG.

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use serde::Deserialize;
use std::fmt::Write as _;
use std::io::Cursor;
use thiserror::Error;

/// Edge length of the rendered image in pixels
pub const DEFAULT_QR_SIZE: u32 = 240;

const HEADER_BYTES_PER_LINE: usize = 16;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

/// Turns a claim code into an image
pub trait QrEncoder: Send + Sync {
    fn encode(&self, data: &str) -> Result<QrArtifact, EncodeError>;
}

/// A rendered QR image
#[derive(Debug, Clone, PartialEq)]
pub struct QrArtifact {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Wire format of the artifact handed to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// C header for box firmware
    #[default]
    Header,
    Png,
}

impl ArtifactFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactFormat::Header => "qr.h",
            ArtifactFormat::Png => "qr.png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Header => "application/octet-stream",
            ArtifactFormat::Png => "image/png",
        }
    }
}

impl QrArtifact {
    /// Serialize in the requested wire format
    pub fn render(&self, format: ArtifactFormat) -> Vec<u8> {
        match format {
            ArtifactFormat::Header => self.to_header().into_bytes(),
            ArtifactFormat::Png => self.png.clone(),
        }
    }

    /// C header embedding the PNG bytes
    pub fn to_header(&self) -> String {
        let mut out = String::with_capacity(self.png.len() * 6 + 128);
        let _ = writeln!(out, "#define QRCODE_HEIGHT {}", self.height);
        let _ = writeln!(out, "#define QRCODE_WIDTH {}", self.width);
        out.push_str("static const unsigned char qr[] PROGMEM = {\n");

        let lines: Vec<String> = self
            .png
            .chunks(HEADER_BYTES_PER_LINE)
            .map(|chunk| {
                let bytes: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
                format!("  {}", bytes.join(", "))
            })
            .collect();
        out.push_str(&lines.join(",\n"));

        out.push_str("\n};\n");
        out
    }
}

/// Renders QR codes as square grayscale PNGs
#[derive(Debug, Clone)]
pub struct PngQrEncoder {
    size: u32,
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QR_SIZE)
    }
}

impl PngQrEncoder {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, data: &str) -> Result<QrArtifact, EncodeError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)?;
        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(self.size, self.size)
            .build();
        let (width, height) = image.dimensions();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        Ok(QrArtifact { png, width, height })
    }
}
