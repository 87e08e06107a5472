use crate::codec::{self, CodecError, CompressedChunks};
use crate::types::{Buffers, PixelViewport};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("{buffer:?} payload is {actual} bytes, viewport implies {expected}")]
    FormatMismatch {
        buffer: Buffers,
        expected: usize,
        actual: usize,
    },
    #[error("image has no {0:?} buffer")]
    MissingBuffer(Buffers),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Where an image's pixels live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    /// Pixels in host memory, transportable over the network.
    #[default]
    Memory,
    /// Pixels retained by the drawable surface, referenced by handle.
    Texture { handle: u64 },
}

/// Raw pixels for one buffer attachment.
#[derive(Debug, Clone, Default)]
struct PixelData {
    bytes_per_pixel: u32,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct BufferSlot {
    pixels: PixelData,
    compressed: Option<CompressedChunks>,
}

/// A rectangular pixel region holding color and/or depth data.
///
/// Invariant: a buffer marked present always holds exactly
/// `pixel_viewport.area() * bytes_per_pixel` bytes; [`Image::set_pixel_data`]
/// and [`Image::set_compressed`] enforce it.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pvp: PixelViewport,
    quality: f32,
    storage: Storage,
    color: Option<BufferSlot>,
    depth: Option<BufferSlot>,
}

impl Image {
    pub fn new(pvp: PixelViewport) -> Self {
        Self {
            pvp,
            quality: 1.0,
            storage: Storage::Memory,
            color: None,
            depth: None,
        }
    }

    pub fn pixel_viewport(&self) -> PixelViewport {
        self.pvp
    }

    /// Re-declares the covered region, invalidating any stored pixels.
    pub fn set_pixel_viewport(&mut self, pvp: PixelViewport) {
        if pvp != self.pvp {
            self.clear();
        }
        self.pvp = pvp;
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Sets the compression quality for the color buffer; depth always
    /// compresses lossless.
    pub fn set_quality(&mut self, quality: f32) {
        if (quality - self.quality).abs() > f32::EPSILON {
            if let Some(slot) = &mut self.color {
                slot.compressed = None;
            }
        }
        self.quality = quality.clamp(0.0, 1.0);
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn set_storage(&mut self, storage: Storage) {
        self.storage = storage;
    }

    /// True when the buffer holds pixels.
    pub fn has_buffer(&self, buffer: Buffers) -> bool {
        self.slot(buffer)
            .map(|slot| !slot.pixels.data.is_empty())
            .unwrap_or(false)
    }

    /// Stores raw pixels for a buffer, validating against the viewport.
    ///
    /// Reuses the slot's existing allocation when present, so recycled
    /// images do not reallocate every frame.
    pub fn set_pixel_data(
        &mut self,
        buffer: Buffers,
        bytes_per_pixel: u32,
        data: &[u8],
    ) -> Result<(), ImageError> {
        let expected = self.pvp.area() * bytes_per_pixel as usize;
        if data.len() != expected {
            return Err(ImageError::FormatMismatch {
                buffer,
                expected,
                actual: data.len(),
            });
        }
        let slot = self.slot_entry(buffer);
        slot.pixels.bytes_per_pixel = bytes_per_pixel;
        slot.pixels.data.clear();
        slot.pixels.data.extend_from_slice(data);
        slot.compressed = None;
        Ok(())
    }

    pub fn pixel_data(&self, buffer: Buffers) -> Option<&[u8]> {
        self.slot(buffer)
            .filter(|slot| !slot.pixels.data.is_empty())
            .map(|slot| slot.pixels.data.as_slice())
    }

    pub fn bytes_per_pixel(&self, buffer: Buffers) -> Option<u32> {
        self.slot(buffer)
            .filter(|slot| !slot.pixels.data.is_empty())
            .map(|slot| slot.pixels.bytes_per_pixel)
    }

    /// Compresses a buffer, caching the result.
    ///
    /// The cache is invalidated by [`Image::set_pixel_data`], so unchanged
    /// pixels are never re-compressed (transmit to N nodes compresses once).
    pub fn compress(&mut self, buffer: Buffers) -> Result<&CompressedChunks, ImageError> {
        let quality = if buffer == Buffers::DEPTH {
            1.0
        } else {
            self.quality
        };
        let slot = match self.slot_mut(buffer) {
            Some(slot) if !slot.pixels.data.is_empty() => slot,
            _ => return Err(ImageError::MissingBuffer(buffer)),
        };
        if slot.compressed.is_none() {
            slot.compressed = Some(codec::compress(&slot.pixels.data, quality));
        }
        Ok(slot.compressed.as_ref().expect("compressed cache filled"))
    }

    /// Installs pixels from compressed chunks, validating the decoded size.
    pub fn set_compressed(
        &mut self,
        buffer: Buffers,
        bytes_per_pixel: u32,
        compressed: CompressedChunks,
    ) -> Result<(), ImageError> {
        let expected = self.pvp.area() * bytes_per_pixel as usize;
        let data = codec::decompress(&compressed, expected)?;
        let slot = self.slot_entry(buffer);
        slot.pixels.bytes_per_pixel = bytes_per_pixel;
        slot.pixels.data = data;
        slot.compressed = Some(compressed);
        Ok(())
    }

    /// Drops pixel contents while keeping allocations for reuse.
    pub fn clear(&mut self) {
        for slot in [&mut self.color, &mut self.depth].into_iter().flatten() {
            slot.pixels.data.clear();
            slot.compressed = None;
        }
        self.storage = Storage::Memory;
    }

    fn slot(&self, buffer: Buffers) -> Option<&BufferSlot> {
        if buffer == Buffers::COLOR {
            self.color.as_ref()
        } else if buffer == Buffers::DEPTH {
            self.depth.as_ref()
        } else {
            None
        }
    }

    fn slot_mut(&mut self, buffer: Buffers) -> Option<&mut BufferSlot> {
        if buffer == Buffers::COLOR {
            self.color.as_mut()
        } else if buffer == Buffers::DEPTH {
            self.depth.as_mut()
        } else {
            None
        }
    }

    fn slot_entry(&mut self, buffer: Buffers) -> &mut BufferSlot {
        debug_assert!(buffer == Buffers::COLOR || buffer == Buffers::DEPTH);
        let slot = if buffer == Buffers::COLOR {
            &mut self.color
        } else {
            &mut self.depth
        };
        slot.get_or_insert_with(BufferSlot::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image() -> Image {
        Image::new(PixelViewport::new(0, 0, 4, 2))
    }

    #[test]
    fn pixel_data_must_match_viewport() {
        let mut image = test_image();
        let err = image
            .set_pixel_data(Buffers::COLOR, 4, &[0u8; 16])
            .unwrap_err();
        assert_eq!(
            err,
            ImageError::FormatMismatch {
                buffer: Buffers::COLOR,
                expected: 32,
                actual: 16
            }
        );
        image.set_pixel_data(Buffers::COLOR, 4, &[7u8; 32]).unwrap();
        assert!(image.has_buffer(Buffers::COLOR));
        assert!(!image.has_buffer(Buffers::DEPTH));
    }

    #[test]
    fn compress_round_trips_through_set_compressed() {
        let mut image = test_image();
        let pixels: Vec<u8> = (0u8..32).collect();
        image.set_pixel_data(Buffers::COLOR, 4, &pixels).unwrap();
        let compressed = image.compress(Buffers::COLOR).unwrap().clone();

        let mut received = test_image();
        received
            .set_compressed(Buffers::COLOR, 4, compressed)
            .unwrap();
        assert_eq!(received.pixel_data(Buffers::COLOR).unwrap(), &pixels[..]);
    }

    #[test]
    fn compress_is_cached_until_pixels_change() {
        let mut image = test_image();
        image.set_pixel_data(Buffers::COLOR, 4, &[3u8; 32]).unwrap();
        let first = image.compress(Buffers::COLOR).unwrap().clone();
        let second = image.compress(Buffers::COLOR).unwrap().clone();
        assert_eq!(first, second);

        image.set_pixel_data(Buffers::COLOR, 4, &[4u8; 32]).unwrap();
        let third = image.compress(Buffers::COLOR).unwrap().clone();
        assert_ne!(first, third);
    }

    #[test]
    fn depth_compression_ignores_quality() {
        let mut image = test_image();
        image.set_quality(0.25);
        let depth: Vec<u8> = (0u8..32).collect();
        image.set_pixel_data(Buffers::DEPTH, 4, &depth).unwrap();
        let compressed = image.compress(Buffers::DEPTH).unwrap().clone();

        let mut received = test_image();
        received
            .set_compressed(Buffers::DEPTH, 4, compressed)
            .unwrap();
        assert_eq!(received.pixel_data(Buffers::DEPTH).unwrap(), &depth[..]);
    }

    #[test]
    fn clear_recycles_without_dropping_capacity() {
        let mut image = test_image();
        image.set_pixel_data(Buffers::COLOR, 4, &[9u8; 32]).unwrap();
        image.clear();
        assert!(!image.has_buffer(Buffers::COLOR));
        image.set_pixel_data(Buffers::COLOR, 4, &[1u8; 32]).unwrap();
        assert_eq!(image.pixel_data(Buffers::COLOR).unwrap(), &[1u8; 32][..]);
    }

    #[test]
    fn compressing_a_missing_buffer_fails() {
        let mut image = test_image();
        assert_eq!(
            image.compress(Buffers::DEPTH).unwrap_err(),
            ImageError::MissingBuffer(Buffers::DEPTH)
        );
    }
}
