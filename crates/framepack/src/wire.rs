//! Length-prefixed wire format for frame transmission.
//!
//! A transmitted frame serializes its name, placement metadata and, per
//! image, the compressed chunk list of every enabled buffer in bit order
//! (COLOR before DEPTH). Compression happens once per source image; the
//! encoded payload is shared between all target nodes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use glam::IVec2;

use crate::codec::CompressedChunks;
use crate::frame::Frame;
use crate::image::{Image, ImageError, Storage};
use crate::types::{Buffers, PixelViewport, Range, Zoom};

/// Upper bound on decode-side preallocation from wire-supplied counts.
const PREALLOC_CAP: usize = 64;

/// Identifies a node of the cluster, the target of a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// An encoded frame, cheaply cloneable for fan-out to several nodes.
#[derive(Debug, Clone)]
pub struct FramePayload(pub Arc<Vec<u8>>);

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame payload truncated at byte {0}")]
    Truncated(usize),
    #[error("frame name is not valid UTF-8")]
    BadName,
    #[error("unknown buffer bits {0:#x} in frame payload")]
    UnknownBuffers(u32),
    #[error("payload is for frame '{payload}', receiver expected '{expected}'")]
    FrameMismatch { payload: String, expected: String },
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// A decoded frame transmission, ready to install into a pending frame.
#[derive(Debug)]
pub struct DecodedFrame {
    pub name: String,
    pub offset: IVec2,
    pub zoom: Zoom,
    pub range: Range,
    pub buffers: Buffers,
    pub images: Vec<Image>,
}

/// Compresses and serializes a frame for transmission.
///
/// Returns the payload plus the time spent compressing. Texture-resident
/// images cannot leave their surface and are skipped with a warning.
pub fn encode_frame(frame: &Frame) -> Result<(FramePayload, Duration), ImageError> {
    let offset = frame.offset();
    let zoom = frame.zoom();
    let range = frame.range();
    let buffers = frame.buffers();

    let clock = Instant::now();
    frame.data().with_images_mut(|images| {
        for image in images.iter_mut() {
            if matches!(image.storage(), Storage::Texture { .. }) {
                continue;
            }
            for buffer in Buffers::ORDERED {
                if buffers.contains(buffer) && image.has_buffer(buffer) {
                    image.compress(buffer)?;
                }
            }
        }
        Ok::<(), ImageError>(())
    })?;
    let compress_time = clock.elapsed();

    let mut out = Vec::new();
    put_str(&mut out, frame.name());
    put_i32(&mut out, offset.x);
    put_i32(&mut out, offset.y);
    put_f32(&mut out, zoom.x);
    put_f32(&mut out, zoom.y);
    put_f32(&mut out, range.start);
    put_f32(&mut out, range.end);
    put_u32(&mut out, buffers.bits());

    frame.data().with_images_mut(|images| {
        let transportable = images
            .iter()
            .filter(|image| matches!(image.storage(), Storage::Memory))
            .count();
        put_u32(&mut out, transportable as u32);
        for image in images.iter_mut() {
            if matches!(image.storage(), Storage::Texture { .. }) {
                tracing::warn!(
                    frame = frame.name(),
                    "texture-resident image skipped during transmit"
                );
                continue;
            }
            encode_image(&mut out, image, buffers)?;
        }
        Ok::<(), ImageError>(())
    })?;

    let raw: usize = frame.data().with_images(|images| {
        images
            .iter()
            .flat_map(|image| {
                Buffers::ORDERED
                    .into_iter()
                    .filter_map(|buffer| image.pixel_data(buffer).map(<[u8]>::len))
            })
            .sum()
    });
    tracing::debug!(
        frame = frame.name(),
        raw_bytes = raw,
        payload_bytes = out.len(),
        compress_ms = compress_time.as_secs_f64() * 1000.0,
        "frame encoded"
    );

    Ok((FramePayload(Arc::new(out)), compress_time))
}

/// Transmits a frame to every target link.
///
/// The frame is compressed and encoded once; each link receives a clone of
/// the same shared payload. A disconnected link is logged and skipped so one
/// dead node cannot stall the producing channel. Returns the time spent
/// compressing, for instrumentation.
pub fn transmit<T: From<FramePayload>>(
    frame: &Frame,
    links: &[Sender<T>],
) -> Result<Duration, ImageError> {
    let (payload, compress_time) = encode_frame(frame)?;
    for link in links {
        if link.send(T::from(payload.clone())).is_err() {
            tracing::warn!(frame = frame.name(), "frame link disconnected, skipping");
        }
    }
    Ok(compress_time)
}

/// Deserializes a frame payload.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, WireError> {
    let mut reader = Reader::new(bytes);
    let name = reader.str()?;
    let offset = IVec2::new(reader.i32()?, reader.i32()?);
    let zoom = Zoom::new(reader.f32()?, reader.f32()?);
    let range = Range::new(reader.f32()?, reader.f32()?);
    let bits = reader.u32()?;
    let buffers = Buffers::from_bits(bits).ok_or(WireError::UnknownBuffers(bits))?;

    let image_count = reader.u32()? as usize;
    // Count prefixes come off the wire; never let one drive a huge
    // reservation, push grows past the cap as elements actually decode.
    let mut images = Vec::with_capacity(image_count.min(PREALLOC_CAP));
    for _ in 0..image_count {
        images.push(decode_image(&mut reader)?);
    }
    Ok(DecodedFrame {
        name,
        offset,
        zoom,
        range,
        buffers,
        images,
    })
}

/// Installs a decoded transmission into the matching pending frame and
/// marks it ready. Called from the network receive thread.
pub fn apply_received(frame: &Frame, decoded: DecodedFrame) -> Result<(), WireError> {
    if decoded.name != frame.name() {
        return Err(WireError::FrameMismatch {
            payload: decoded.name,
            expected: frame.name().to_string(),
        });
    }
    let data = frame.data();
    data.set_offset(decoded.offset);
    data.set_zoom(decoded.zoom);
    data.set_range(decoded.range);
    data.set_buffers(decoded.buffers);
    data.with_images_mut(|images| images.extend(decoded.images));
    data.set_ready();
    Ok(())
}

fn encode_image(out: &mut Vec<u8>, image: &mut Image, buffers: Buffers) -> Result<(), ImageError> {
    let pvp = image.pixel_viewport();
    put_i32(out, pvp.x);
    put_i32(out, pvp.y);
    put_u32(out, pvp.w);
    put_u32(out, pvp.h);
    put_f32(out, image.quality());

    let mut present = Buffers::empty();
    for buffer in Buffers::ORDERED {
        if buffers.contains(buffer) && image.has_buffer(buffer) {
            present |= buffer;
        }
    }
    put_u32(out, present.bits());

    for buffer in Buffers::ORDERED {
        if !present.contains(buffer) {
            continue;
        }
        let bpp = image.bytes_per_pixel(buffer).expect("buffer present");
        let compressed = image.compress(buffer)?;
        put_u32(out, bpp);
        put_u64(out, compressed.raw_len as u64);
        put_u32(out, compressed.chunks.len() as u32);
        for chunk in &compressed.chunks {
            put_u32(out, chunk.len() as u32);
            out.extend_from_slice(chunk);
        }
    }
    Ok(())
}

fn decode_image(reader: &mut Reader<'_>) -> Result<Image, WireError> {
    let pvp = PixelViewport::new(reader.i32()?, reader.i32()?, reader.u32()?, reader.u32()?);
    let quality = reader.f32()?;
    let bits = reader.u32()?;
    let present = Buffers::from_bits(bits).ok_or(WireError::UnknownBuffers(bits))?;

    let mut image = Image::new(pvp);
    image.set_quality(quality);
    for buffer in Buffers::ORDERED {
        if !present.contains(buffer) {
            continue;
        }
        let bpp = reader.u32()?;
        let raw_len = reader.u64()? as usize;
        let chunk_count = reader.u32()? as usize;
        let mut chunks = Vec::with_capacity(chunk_count.min(PREALLOC_CAP));
        for _ in 0..chunk_count {
            let len = reader.u32()? as usize;
            chunks.push(reader.bytes(len)?.to_vec());
        }
        image.set_compressed(buffer, bpp, CompressedChunks { chunks, raw_len })?;
    }
    Ok(image)
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let slice = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or(WireError::Truncated(self.pos))?;
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.bytes(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.bytes(8)?.try_into().expect("8 bytes")))
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.bytes(4)?.try_into().expect("4 bytes")))
    }

    fn f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_le_bytes(self.bytes(4)?.try_into().expect("4 bytes")))
    }

    fn str(&mut self) -> Result<String, WireError> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::BadName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn produced_frame() -> Frame {
        let frame = Frame::new("left-half", Buffers::COLOR | Buffers::DEPTH);
        frame.data().set_offset(IVec2::new(32, 0));
        frame.data().set_range(Range::new(0.0, 0.5));
        let mut image = Image::new(PixelViewport::new(0, 0, 4, 4));
        image
            .set_pixel_data(Buffers::COLOR, 4, &[128u8; 64])
            .unwrap();
        image
            .set_pixel_data(Buffers::DEPTH, 4, &(0u8..64).collect::<Vec<_>>())
            .unwrap();
        frame.data().push_image(image);
        frame
    }

    #[test]
    fn encode_decode_round_trip() {
        let frame = produced_frame();
        let (payload, _) = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&payload.0).unwrap();

        assert_eq!(decoded.name, "left-half");
        assert_eq!(decoded.offset, IVec2::new(32, 0));
        assert_eq!(decoded.range, Range::new(0.0, 0.5));
        assert_eq!(decoded.buffers, Buffers::COLOR | Buffers::DEPTH);
        assert_eq!(decoded.images.len(), 1);
        assert_eq!(
            decoded.images[0].pixel_data(Buffers::COLOR).unwrap(),
            &[128u8; 64][..]
        );
        assert_eq!(
            decoded.images[0].pixel_data(Buffers::DEPTH).unwrap(),
            &(0u8..64).collect::<Vec<_>>()[..]
        );
    }

    #[test]
    fn transmit_shares_one_payload_across_nodes() {
        let frame = produced_frame();
        let (tx_a, rx_a) = unbounded::<FramePayload>();
        let (tx_b, rx_b) = unbounded::<FramePayload>();

        transmit(&frame, &[tx_a, tx_b]).unwrap();

        let a = rx_a.recv().unwrap();
        let b = rx_b.recv().unwrap();
        // compress once, send N: both nodes see the same allocation
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn received_payload_marks_the_pending_frame_ready() {
        let source = produced_frame();
        let (payload, _) = encode_frame(&source).unwrap();

        let pending = Frame::new("left-half", Buffers::COLOR | Buffers::DEPTH);
        assert!(!pending.is_ready());
        apply_received(&pending, decode_frame(&payload.0).unwrap()).unwrap();
        assert!(pending.is_ready());
        assert_eq!(pending.offset(), IVec2::new(32, 0));
        assert_eq!(pending.data().with_images(|images| images.len()), 1);
    }

    #[test]
    fn mismatched_frame_name_is_rejected() {
        let source = produced_frame();
        let (payload, _) = encode_frame(&source).unwrap();
        let wrong = Frame::new("right-half", Buffers::COLOR);
        let err = apply_received(&wrong, decode_frame(&payload.0).unwrap()).unwrap_err();
        assert!(matches!(err, WireError::FrameMismatch { .. }));
        assert!(!wrong.is_ready());
    }

    #[test]
    fn huge_image_count_fails_fast_on_truncation() {
        // Valid header followed by an absurd image count and no image data.
        let mut bytes = Vec::new();
        put_str(&mut bytes, "bogus");
        put_i32(&mut bytes, 0);
        put_i32(&mut bytes, 0);
        put_f32(&mut bytes, 1.0);
        put_f32(&mut bytes, 1.0);
        put_f32(&mut bytes, 0.0);
        put_f32(&mut bytes, 1.0);
        put_u32(&mut bytes, Buffers::COLOR.bits());
        put_u32(&mut bytes, u32::MAX);
        assert!(matches!(decode_frame(&bytes), Err(WireError::Truncated(_))));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let frame = produced_frame();
        let (payload, _) = encode_frame(&frame).unwrap();
        let cut = &payload.0[..payload.0.len() - 3];
        assert!(matches!(
            decode_frame(cut),
            Err(WireError::Truncated(_)) | Err(WireError::Image(_))
        ));
    }
}
