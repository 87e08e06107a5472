//! Readback of rendered pixels into an output frame.

use framepack::{Frame, PixelViewport};
use tracing::warn;

use crate::surface::{DrawableSurface, StorageKind};

/// Captures `region` from the surface into `frame`, one image per tile.
///
/// Regions larger than the surface's single-capture limit are split into a
/// grid of tiles. A failed tile is logged and skipped, so the frame still
/// carries every capturable pixel; the caller decides whether a partial
/// frame is acceptable.
///
/// Returns the number of images appended.
pub fn read_back(
    frame: &Frame,
    surface: &mut dyn DrawableSurface,
    region: PixelViewport,
    kind: StorageKind,
    quality: f32,
) -> usize {
    let mut clipped = region;
    clipped.intersect(&surface.pixel_viewport());
    if !clipped.has_area() {
        return 0;
    }

    let buffers = frame.buffers();
    let (max_w, max_h) = surface.max_capture_size();
    let mut appended = 0;

    let mut y = clipped.y;
    while y < clipped.y + clipped.h as i32 {
        let tile_h = max_h.min((clipped.y + clipped.h as i32 - y) as u32);
        let mut x = clipped.x;
        while x < clipped.x + clipped.w as i32 {
            let tile_w = max_w.min((clipped.x + clipped.w as i32 - x) as u32);
            let tile = PixelViewport::new(x, y, tile_w, tile_h);
            match surface.capture(tile, buffers, quality, kind) {
                Ok(image) => {
                    frame.data().push_image(image);
                    appended += 1;
                }
                Err(err) => {
                    warn!(
                        frame = frame.name(),
                        tile = ?tile,
                        error = %err,
                        "tile capture failed, frame will be partial"
                    );
                }
            }
            x += tile_w as i32;
        }
        y += tile_h as i32;
    }
    appended
}
