use std::path::Path;

use tracing::warn;

/// Decodes a raster frame into QR text, or reports that no code is present.
pub trait BarcodeDecoder: Send + Sync {
    /// `Ok(None)` means the frame decoded cleanly but held no readable code.
    fn decode_frame(&self, frame: &Path) -> Result<Option<String>, DecodeError>;
}

/// QR decoder over `image` + `rqrr`.
pub struct RqrrDecoder;

impl BarcodeDecoder for RqrrDecoder {
    fn decode_frame(&self, frame: &Path) -> Result<Option<String>, DecodeError> {
        let gray = image::open(frame).map_err(DecodeError::Image)?.to_luma8();

        let mut prepared = rqrr::PreparedImage::prepare(gray);
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => return Ok(Some(content)),
                Err(e) => {
                    // A grid was located but its payload would not read;
                    // try any remaining grids.
                    warn!(frame = %frame.display(), error = %e, "undecodable QR grid");
                }
            }
        }

        Ok(None)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to load frame image: {0}")]
    Image(#[from] image::ImageError),
}
