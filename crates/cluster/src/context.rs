//! Per-task render contexts and wall frustum computation.

use framepack::{Buffers, PixelViewport, Range, Zoom};
use glam::Vec3;

use crate::compound::{Eye, Wall};

/// View volume boundaries on the near plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
    pub ortho: bool,
}

/// Everything a channel needs to execute one task.
///
/// Produced fresh by the update visitor for every frame and never
/// persisted.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub frame_id: u32,
    pub frame_number: u32,
    pub pvp: PixelViewport,
    pub range: Range,
    pub zoom: Zoom,
    pub eye: Eye,
    pub buffers: Buffers,
    pub frustum: Option<Frustum>,
}

/// Computes the view frustum of a wall as seen from `eye`.
///
/// The wall spans `u` from bottom-left to bottom-right and `v` from
/// bottom-left to top-left; `w = u x v` faces the viewer. The eye position
/// is projected onto the wall basis, giving the frustum boundaries in wall
/// coordinates; a perspective frustum scales them onto the near plane by
/// `near / distance`.
pub fn wall_frustum(wall: &Wall, eye: Vec3, near: f32, far: f32, ortho: bool) -> Frustum {
    let width = wall.width();
    let height = wall.height();
    let u = (wall.bottom_right - wall.bottom_left) / width;
    let v = (wall.top_left - wall.bottom_left) / height;
    let w = u.cross(v);

    // The eye sits on the +w side of the wall, so the plane distance is the
    // negated projection onto w.
    let to_wall = wall.bottom_left - eye;
    let distance = -w.dot(to_wall);
    let left = u.dot(to_wall);
    let bottom = v.dot(to_wall);

    if ortho {
        Frustum {
            left,
            right: left + width,
            bottom,
            top: bottom + height,
            near,
            far,
            ortho: true,
        }
    } else {
        let scale = near / distance;
        Frustum {
            left: left * scale,
            right: (left + width) * scale,
            bottom: bottom * scale,
            top: (bottom + height) * scale,
            near,
            far,
            ortho: false,
        }
    }
}
