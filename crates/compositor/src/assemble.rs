//! Frame assembly entry points for consuming channels.

use framepack::{Buffers, Frame};
use tracing::debug;

use crate::surface::{AssembleError, AssembleOp, DrawableSurface};

/// Assembles one ready frame into the surface.
///
/// This is the direct path for 2D (sort-first) contributions and for
/// database frames covering the whole range: images land at the frame
/// offset, depth-tested when the frame carries a depth buffer, plain
/// copies otherwise.
pub fn assemble_frame(
    frame: &Frame,
    surface: &mut dyn DrawableSurface,
) -> Result<(), AssembleError> {
    debug_assert!(frame.is_ready(), "assembling a frame that is not ready");
    let op = if frame.buffers().contains(Buffers::DEPTH) {
        AssembleOp::DepthTest
    } else {
        AssembleOp::Copy
    };
    assemble_images(frame, surface, op)
}

/// Assembles database-range frames in their current (far-to-near) order.
///
/// Callers sort with [`crate::order_frames`] first. `blend_alpha` selects
/// premultiplied alpha blending for translucent data; opaque data falls
/// back to depth testing. An empty slice is a no-op. Assembly state is
/// bracketed so scissor changes do not leak into the caller.
pub fn assemble_frames_sorted(
    frames: &[Frame],
    surface: &mut dyn DrawableSurface,
    blend_alpha: bool,
) -> Result<(), AssembleError> {
    if frames.is_empty() {
        return Ok(());
    }
    let op = if blend_alpha {
        AssembleOp::BlendAlpha
    } else {
        AssembleOp::DepthTest
    };
    debug!(frames = frames.len(), ?op, "assembling sorted frames");

    surface.save_assembly_state();
    let mut result = Ok(());
    for frame in frames {
        debug_assert!(frame.is_ready(), "assembling a frame that is not ready");
        if let Err(err) = assemble_images(frame, surface, op) {
            result = Err(err);
            break;
        }
    }
    surface.restore_assembly_state();
    result
}

fn assemble_images(
    frame: &Frame,
    surface: &mut dyn DrawableSurface,
    op: AssembleOp,
) -> Result<(), AssembleError> {
    if !frame.buffers().contains(Buffers::COLOR) {
        return Ok(());
    }
    let offset = frame.offset();
    let zoom = frame.zoom();
    frame.data().with_images(|images| {
        for image in images {
            surface.assemble_image(image, offset, zoom, op)?;
        }
        Ok(())
    })
}
