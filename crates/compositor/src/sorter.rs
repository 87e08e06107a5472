//! Far-to-near ordering of database-range frames.
//!
//! Alpha blending is only correct when slabs arrive back to front. The data
//! occupies the model-space slab z in [-0.5, 0.5], with a frame's database
//! range mapped linearly onto it, so each frame gets an anchor point at the
//! middle of its slice and frames are ordered by that anchor's distance
//! along the viewing direction.

use std::cmp::Ordering;

use framepack::Frame;
use glam::{Mat3, Mat4, Vec3};

/// Reorders `frames` far-to-near for the given view.
///
/// `modelview_itm` is the inverse transpose of the modelview's upper 3x3,
/// which carries directions from view space back to model space. For
/// orthogonal projections only the sign of the view axis matters, so frames
/// sort directly by range; perspective projections project each range anchor
/// onto the viewing axis. Both paths sort stably, so equal keys keep their
/// declaration order and the result is deterministic for a given input.
pub fn order_frames(
    frames: &mut [Frame],
    modelview: Mat4,
    modelview_itm: Mat3,
    rotation: Mat4,
    ortho: bool,
) {
    if frames.len() < 2 {
        return;
    }

    if ortho {
        // The data z axis faces the viewer exactly when the rotated z axis
        // keeps a non-negative z component; then low ranges are farthest.
        let ascending = rotation.z_axis.z >= 0.0;
        frames.sort_by(|a, b| {
            let lhs = a.range().start;
            let rhs = b.range().start;
            let ord = lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        return;
    }

    let mut axis = (modelview_itm * Vec3::Z).normalize_or_zero();
    if axis == Vec3::ZERO {
        axis = Vec3::Z;
    }
    // Point the axis away from the viewer so larger keys mean farther.
    if axis.z > 0.0 {
        axis = -axis;
    }

    let mut keyed: Vec<(f32, Frame)> = frames
        .iter()
        .map(|frame| {
            let anchor = Vec3::new(0.0, 0.0, frame.range().middle() - 0.5);
            let key = modelview.transform_point3(anchor).dot(axis);
            (key, frame.clone())
        })
        .collect();
    keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    for (slot, (_, frame)) in frames.iter_mut().zip(keyed) {
        *slot = frame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framepack::{Buffers, Range};

    fn range_frame(name: &str, start: f32, end: f32) -> Frame {
        let frame = Frame::new(name, Buffers::COLOR);
        frame.data().set_range(Range::new(start, end));
        frame
    }

    fn names(frames: &[Frame]) -> Vec<&str> {
        frames.iter().map(Frame::name).collect()
    }

    #[test]
    fn ortho_identity_orders_low_ranges_first() {
        let mut frames = vec![range_frame("b", 0.5, 1.0), range_frame("a", 0.0, 0.5)];
        order_frames(
            &mut frames,
            Mat4::IDENTITY,
            Mat3::IDENTITY,
            Mat4::IDENTITY,
            true,
        );
        assert_eq!(names(&frames), ["a", "b"]);
    }

    #[test]
    fn ortho_flipped_view_reverses_the_order() {
        let mut frames = vec![range_frame("a", 0.0, 0.5), range_frame("b", 0.5, 1.0)];
        let rotation = Mat4::from_rotation_x(std::f32::consts::PI);
        order_frames(&mut frames, Mat4::IDENTITY, Mat3::IDENTITY, rotation, true);
        assert_eq!(names(&frames), ["b", "a"]);
    }

    #[test]
    fn perspective_matches_ortho_for_an_identity_view() {
        let mut frames = vec![
            range_frame("mid", 1.0 / 3.0, 2.0 / 3.0),
            range_frame("near", 2.0 / 3.0, 1.0),
            range_frame("far", 0.0, 1.0 / 3.0),
        ];
        order_frames(
            &mut frames,
            Mat4::IDENTITY,
            Mat3::IDENTITY,
            Mat4::IDENTITY,
            false,
        );
        assert_eq!(names(&frames), ["far", "mid", "near"]);
    }

    #[test]
    fn ordering_is_deterministic_for_equal_ranges() {
        let mut frames = vec![
            range_frame("first", 0.0, 0.5),
            range_frame("second", 0.0, 0.5),
            range_frame("third", 0.5, 1.0),
        ];
        order_frames(
            &mut frames,
            Mat4::IDENTITY,
            Mat3::IDENTITY,
            Mat4::IDENTITY,
            false,
        );
        assert_eq!(names(&frames), ["first", "second", "third"]);
    }

    #[test]
    fn single_frame_is_left_alone() {
        let mut frames = vec![range_frame("only", 0.0, 1.0)];
        order_frames(
            &mut frames,
            Mat4::IDENTITY,
            Mat3::IDENTITY,
            Mat4::IDENTITY,
            false,
        );
        assert_eq!(names(&frames), ["only"]);
    }
}
