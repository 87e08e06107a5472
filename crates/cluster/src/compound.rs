//! The per-config task tree.
//!
//! A compound describes one rendering contribution: which channel executes
//! it, which fraction of the data it owns, which eyes and buffers it serves,
//! and how its result connects to other compounds through named output and
//! input frames. The tree is consumed in declaration order; that order is
//! the compositing submission order and must not be disturbed.

use framepack::{Buffers, NodeId, PixelViewport, Range, Zoom};
use glam::Vec3;

/// Identifies a destination channel inside the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

bitflags::bitflags! {
    /// Stereo eye passes a compound participates in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Eyes: u32 {
        const CYCLOP = 1 << 0;
        const LEFT = 1 << 1;
        const RIGHT = 1 << 2;
    }
}

/// One eye pass of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Cyclop,
    Left,
    Right,
}

impl Eye {
    /// The mask bit selecting this eye.
    pub fn flag(self) -> Eyes {
        match self {
            Eye::Cyclop => Eyes::CYCLOP,
            Eye::Left => Eyes::LEFT,
            Eye::Right => Eyes::RIGHT,
        }
    }
}

bitflags::bitflags! {
    /// Per-frame work a compound performs on its channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tasks: u32 {
        const CLEAR = 1 << 0;
        const DRAW = 1 << 1;
        const READBACK = 1 << 2;
        const ASSEMBLE = 1 << 3;
    }
}

/// A physical projection surface, described by three of its corners in
/// world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wall {
    pub bottom_left: Vec3,
    pub bottom_right: Vec3,
    pub top_left: Vec3,
}

impl Wall {
    pub fn width(&self) -> f32 {
        (self.bottom_right - self.bottom_left).length()
    }

    pub fn height(&self) -> f32 {
        (self.top_left - self.bottom_left).length()
    }
}

/// An output frame: produced by this compound, consumed on other nodes.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    pub name: String,
    pub consumers: Vec<NodeId>,
}

/// A node in the task tree.
///
/// Unset attributes (`channel` of `None`, empty `eyes` or `buffers`) are
/// inherited from the parent during traversal. Leaves without an explicit
/// task mask clear, draw and read back; inner compounds only assemble.
#[derive(Debug, Clone)]
pub struct Compound {
    pub channel: Option<ChannelId>,
    pub viewport: PixelViewport,
    pub range: Range,
    pub eyes: Eyes,
    pub buffers: Buffers,
    pub zoom: Zoom,
    pub tasks: Option<Tasks>,
    pub wall: Option<Wall>,
    pub max_fps: Option<f32>,
    pub outputs: Vec<OutputFrame>,
    pub inputs: Vec<String>,
    pub children: Vec<Compound>,
}

impl Compound {
    pub fn new() -> Self {
        Self {
            channel: None,
            viewport: PixelViewport::default(),
            range: Range::ALL,
            eyes: Eyes::empty(),
            buffers: Buffers::empty(),
            zoom: Zoom::NONE,
            tasks: None,
            wall: None,
            max_fps: None,
            outputs: Vec::new(),
            inputs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The effective task mask: explicit when set, otherwise the full leaf
    /// pipeline for leaves and assembly only for inner compounds.
    pub fn effective_tasks(&self) -> Tasks {
        match self.tasks {
            Some(tasks) => tasks,
            None if self.is_leaf() => Tasks::CLEAR | Tasks::DRAW | Tasks::READBACK,
            None => Tasks::ASSEMBLE,
        }
    }
}

impl Default for Compound {
    fn default() -> Self {
        Self::new()
    }
}

/// Attributes resolved along the path from the root, applied to children
/// that leave them unset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Inherited {
    pub channel: Option<ChannelId>,
    pub eyes: Eyes,
    pub buffers: Buffers,
}

impl Inherited {
    pub fn root() -> Self {
        Self {
            channel: None,
            eyes: Eyes::CYCLOP,
            buffers: Buffers::COLOR,
        }
    }

    pub fn descend(&self, compound: &Compound) -> Self {
        Self {
            channel: compound.channel.or(self.channel),
            eyes: if compound.eyes.is_empty() {
                self.eyes
            } else {
                compound.eyes
            },
            buffers: if compound.buffers.is_empty() {
                self.buffers
            } else {
                compound.buffers
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_attributes_inherit_from_the_parent() {
        let mut parent = Compound::new();
        parent.channel = Some(ChannelId(3));
        parent.buffers = Buffers::COLOR | Buffers::DEPTH;
        let child = Compound::new();

        let scope = Inherited::root().descend(&parent).descend(&child);
        assert_eq!(scope.channel, Some(ChannelId(3)));
        assert_eq!(scope.buffers, Buffers::COLOR | Buffers::DEPTH);
        assert_eq!(scope.eyes, Eyes::CYCLOP);
    }

    #[test]
    fn explicit_attributes_override_inheritance() {
        let mut parent = Compound::new();
        parent.channel = Some(ChannelId(1));
        parent.eyes = Eyes::LEFT | Eyes::RIGHT;
        let mut child = Compound::new();
        child.channel = Some(ChannelId(2));
        child.eyes = Eyes::CYCLOP;

        let scope = Inherited::root().descend(&parent).descend(&child);
        assert_eq!(scope.channel, Some(ChannelId(2)));
        assert_eq!(scope.eyes, Eyes::CYCLOP);
    }

    #[test]
    fn default_task_mask_depends_on_tree_position() {
        let mut inner = Compound::new();
        inner.children.push(Compound::new());
        assert_eq!(inner.effective_tasks(), Tasks::ASSEMBLE);
        assert_eq!(
            inner.children[0].effective_tasks(),
            Tasks::CLEAR | Tasks::DRAW | Tasks::READBACK
        );
    }
}
