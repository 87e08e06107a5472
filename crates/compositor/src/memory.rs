//! Host-memory reference implementation of [`DrawableSurface`].
//!
//! Used by headless compositing nodes and the test suite: an RGBA8 color
//! buffer plus an f32 depth buffer, with the same assembly semantics a GL
//! backend implements in hardware (premultiplied ONE/ONE_MINUS_SRC_ALPHA
//! blending, nearer-wins depth test, nearest-neighbor zoom).

use framepack::{Buffers, Image, PixelViewport, Storage, Zoom};
use glam::IVec2;

use crate::arena::{Handle, ObjectArena};
use crate::surface::{AssembleError, AssembleOp, DrawableSurface, ReadbackError, StorageKind};

const COLOR_BPP: u32 = 4;
const DEPTH_BPP: u32 = 4;

/// Pixels retained on the surface for a [`StorageKind::Texture`] capture.
#[derive(Debug)]
struct TexturePixels {
    pvp: PixelViewport,
    color: Option<Vec<u8>>,
    depth: Option<Vec<u8>>,
}

/// A software draw target: RGBA8 color, f32 depth, scissored writes.
#[derive(Debug)]
pub struct MemorySurface {
    pvp: PixelViewport,
    color: Vec<u8>,
    depth: Vec<f32>,
    max_capture: (u32, u32),
    scissor: Option<PixelViewport>,
    saved_scissor: Vec<Option<PixelViewport>>,
    textures: ObjectArena<TexturePixels>,
}

impl MemorySurface {
    /// Creates a surface cleared to transparent black and far depth.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pvp: PixelViewport::new(0, 0, width, height),
            color: vec![0; (width * height * COLOR_BPP) as usize],
            depth: vec![1.0; (width * height) as usize],
            max_capture: (width.max(1), height.max(1)),
            scissor: None,
            saved_scissor: Vec::new(),
            textures: ObjectArena::new(),
        }
    }

    /// Caps the region a single capture call may grab, forcing readback
    /// tiling for anything larger.
    pub fn set_max_capture_size(&mut self, width: u32, height: u32) {
        self.max_capture = (width.max(1), height.max(1));
    }

    /// The raw RGBA8 contents, row-major from the bottom row.
    pub fn color_bytes(&self) -> &[u8] {
        &self.color
    }

    /// The raw depth contents.
    pub fn depth_values(&self) -> &[f32] {
        &self.depth
    }

    /// One pixel, for assertions.
    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        let index = self.index(x, y).expect("pixel inside surface") * COLOR_BPP as usize;
        self.color[index..index + 4].try_into().expect("4 bytes")
    }

    /// Stand-in for the application draw callback: fills a region with a
    /// constant color and depth, honoring the scissor.
    pub fn fill_region(&mut self, region: PixelViewport, rgba: [u8; 4], depth: f32) {
        let mut clipped = region;
        clipped.intersect(&self.pvp);
        for y in clipped.y..clipped.y + clipped.h as i32 {
            for x in clipped.x..clipped.x + clipped.w as i32 {
                if !self.in_scissor(x, y) {
                    continue;
                }
                let index = self.index(x, y).expect("clipped to surface");
                self.color[index * 4..index * 4 + 4].copy_from_slice(&rgba);
                self.depth[index] = depth;
            }
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let dx = x - self.pvp.x;
        let dy = y - self.pvp.y;
        if dx < 0 || dy < 0 || dx >= self.pvp.w as i32 || dy >= self.pvp.h as i32 {
            return None;
        }
        Some(dy as usize * self.pvp.w as usize + dx as usize)
    }

    fn in_scissor(&self, x: i32, y: i32) -> bool {
        match &self.scissor {
            None => true,
            Some(rect) => {
                x >= rect.x
                    && y >= rect.y
                    && x < rect.x + rect.w as i32
                    && y < rect.y + rect.h as i32
            }
        }
    }

    fn contains_region(&self, region: &PixelViewport) -> bool {
        region.x >= self.pvp.x
            && region.y >= self.pvp.y
            && region.x + region.w as i32 <= self.pvp.x + self.pvp.w as i32
            && region.y + region.h as i32 <= self.pvp.y + self.pvp.h as i32
    }

    fn capture_color(&self, region: &PixelViewport) -> Vec<u8> {
        let mut out = Vec::with_capacity(region.area() * COLOR_BPP as usize);
        for row in 0..region.h as i32 {
            let start = self
                .index(region.x, region.y + row)
                .expect("region inside surface")
                * COLOR_BPP as usize;
            out.extend_from_slice(&self.color[start..start + (region.w * COLOR_BPP) as usize]);
        }
        out
    }

    fn capture_depth(&self, region: &PixelViewport) -> Vec<u8> {
        let mut out = Vec::with_capacity(region.area() * DEPTH_BPP as usize);
        for row in 0..region.h as i32 {
            let start = self
                .index(region.x, region.y + row)
                .expect("region inside surface");
            for value in &self.depth[start..start + region.w as usize] {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }

    fn resolve_pixels<'a>(
        &'a self,
        image: &'a Image,
    ) -> Result<(Option<&'a [u8]>, Option<&'a [u8]>), AssembleError> {
        match image.storage() {
            Storage::Memory => {
                if let Some(bpp) = image.bytes_per_pixel(Buffers::COLOR) {
                    if bpp != COLOR_BPP {
                        return Err(AssembleError::UnsupportedFormat {
                            buffer: Buffers::COLOR,
                            bytes_per_pixel: bpp,
                        });
                    }
                }
                if let Some(bpp) = image.bytes_per_pixel(Buffers::DEPTH) {
                    if bpp != DEPTH_BPP {
                        return Err(AssembleError::UnsupportedFormat {
                            buffer: Buffers::DEPTH,
                            bytes_per_pixel: bpp,
                        });
                    }
                }
                Ok((
                    image.pixel_data(Buffers::COLOR),
                    image.pixel_data(Buffers::DEPTH),
                ))
            }
            Storage::Texture { handle } => {
                let texture = self
                    .textures
                    .get(Handle::from_raw(handle))
                    .ok_or(AssembleError::TextureGone(handle))?;
                // The resident pixels were sized at capture time; an image
                // whose viewport drifted since would index past them.
                if texture.pvp != image.pixel_viewport() {
                    return Err(AssembleError::TextureMismatch {
                        handle,
                        resident: texture.pvp,
                        declared: image.pixel_viewport(),
                    });
                }
                Ok((texture.color.as_deref(), texture.depth.as_deref()))
            }
        }
    }
}

impl DrawableSurface for MemorySurface {
    fn pixel_viewport(&self) -> PixelViewport {
        self.pvp
    }

    fn max_capture_size(&self) -> (u32, u32) {
        self.max_capture
    }

    fn capture(
        &mut self,
        region: PixelViewport,
        buffers: Buffers,
        quality: f32,
        kind: StorageKind,
    ) -> Result<Image, ReadbackError> {
        if !region.has_area() {
            return Err(ReadbackError::EmptyRegion);
        }
        if region.w > self.max_capture.0 || region.h > self.max_capture.1 {
            return Err(ReadbackError::TooLarge {
                requested: (region.w, region.h),
                max: self.max_capture,
            });
        }
        if !self.contains_region(&region) {
            return Err(ReadbackError::OutOfBounds {
                requested: region,
                surface: self.pvp,
            });
        }

        let color = buffers
            .contains(Buffers::COLOR)
            .then(|| self.capture_color(&region));
        let depth = buffers
            .contains(Buffers::DEPTH)
            .then(|| self.capture_depth(&region));

        let mut image = Image::new(region);
        image.set_quality(quality);
        match kind {
            StorageKind::Memory => {
                if let Some(color) = color {
                    image
                        .set_pixel_data(Buffers::COLOR, COLOR_BPP, &color)
                        .expect("capture matches region");
                }
                if let Some(depth) = depth {
                    image
                        .set_pixel_data(Buffers::DEPTH, DEPTH_BPP, &depth)
                        .expect("capture matches region");
                }
            }
            StorageKind::Texture => {
                let handle = self.textures.insert(TexturePixels {
                    pvp: region,
                    color,
                    depth,
                });
                image.set_storage(Storage::Texture {
                    handle: handle.to_raw(),
                });
            }
        }
        Ok(image)
    }

    fn assemble_image(
        &mut self,
        image: &Image,
        offset: IVec2,
        zoom: Zoom,
        op: AssembleOp,
    ) -> Result<(), AssembleError> {
        let src_pvp = image.pixel_viewport();
        if !src_pvp.has_area() {
            return Ok(());
        }
        let (color, depth) = self.resolve_pixels(image)?;
        let color = color.ok_or(AssembleError::MissingBuffer(Buffers::COLOR))?;
        if op == AssembleOp::DepthTest && depth.is_none() {
            return Err(AssembleError::MissingBuffer(Buffers::DEPTH));
        }

        let zoom_x = if zoom.x > 0.0 { zoom.x } else { 1.0 };
        let zoom_y = if zoom.y > 0.0 { zoom.y } else { 1.0 };
        let (dst_w, dst_h) = zoom.apply(src_pvp.w, src_pvp.h);
        let dst_x0 = offset.x + src_pvp.x;
        let dst_y0 = offset.y + src_pvp.y;

        // Writes are buffered: the source pixels may alias self through the
        // texture arena, so the buffers stay untouched until the loop ends.
        let src_w = src_pvp.w as usize;
        let src_h = src_pvp.h as usize;
        let mut writes: Vec<(usize, [u8; 4], Option<f32>)> = Vec::new();
        for dy in 0..dst_h as i32 {
            let y = dst_y0 + dy;
            for dx in 0..dst_w as i32 {
                let x = dst_x0 + dx;
                if !self.in_scissor(x, y) {
                    continue;
                }
                let Some(dst_index) = self.index(x, y) else {
                    continue;
                };
                let sx = ((dx as f32 / zoom_x) as usize).min(src_w - 1);
                let sy = ((dy as f32 / zoom_y) as usize).min(src_h - 1);
                let src_index = sy * src_w + sx;

                let src_rgba: [u8; 4] = color[src_index * 4..src_index * 4 + 4]
                    .try_into()
                    .expect("4 bytes per pixel");
                let src_depth = depth.map(|bytes| {
                    f32::from_le_bytes(
                        bytes[src_index * 4..src_index * 4 + 4]
                            .try_into()
                            .expect("4 bytes per depth value"),
                    )
                });

                match op {
                    AssembleOp::Copy => {
                        writes.push((dst_index, src_rgba, src_depth));
                    }
                    AssembleOp::BlendAlpha => {
                        let dst_rgba: [u8; 4] = self.color
                            [dst_index * 4..dst_index * 4 + 4]
                            .try_into()
                            .expect("4 bytes per pixel");
                        writes.push((dst_index, blend_premultiplied(src_rgba, dst_rgba), None));
                    }
                    AssembleOp::DepthTest => {
                        let src_depth = src_depth.expect("depth checked above");
                        if src_depth < self.depth[dst_index] {
                            writes.push((dst_index, src_rgba, Some(src_depth)));
                        }
                    }
                }
            }
        }
        for (dst_index, rgba, depth) in writes {
            self.color[dst_index * 4..dst_index * 4 + 4].copy_from_slice(&rgba);
            if let Some(depth) = depth {
                self.depth[dst_index] = depth;
            }
        }
        Ok(())
    }

    fn clear_region(&mut self, region: PixelViewport) {
        let mut clipped = region;
        clipped.intersect(&self.pvp);
        for y in clipped.y..clipped.y + clipped.h as i32 {
            for x in clipped.x..clipped.x + clipped.w as i32 {
                if !self.in_scissor(x, y) {
                    continue;
                }
                let index = self.index(x, y).expect("clipped to surface");
                self.color[index * 4..index * 4 + 4].copy_from_slice(&[0, 0, 0, 0]);
                self.depth[index] = 1.0;
            }
        }
    }

    fn set_scissor(&mut self, scissor: Option<PixelViewport>) {
        self.scissor = scissor;
    }

    fn save_assembly_state(&mut self) {
        self.saved_scissor.push(self.scissor);
    }

    fn restore_assembly_state(&mut self) {
        if let Some(scissor) = self.saved_scissor.pop() {
            self.scissor = scissor;
        }
    }

    fn discard_texture(&mut self, handle: u64) {
        self.textures.release(Handle::from_raw(handle));
    }
}

/// ONE / ONE_MINUS_SRC_ALPHA with premultiplied source, 8-bit arithmetic.
fn blend_premultiplied(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let inv = 255 - src[3] as u16;
    let mut out = [0u8; 4];
    for channel in 0..4 {
        let value = src[channel] as u16 + (dst[channel] as u16 * inv + 127) / 255;
        out[channel] = value.min(255) as u8;
    }
    out
}
