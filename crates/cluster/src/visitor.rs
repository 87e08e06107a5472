//! Compound traversal generating per-channel task lists.
//!
//! One walk covers one destination channel, one frame number and one eye.
//! Leaves emit clear/draw/readback/transmit tasks, compounds with input
//! frames emit assemble tasks; the post-order pass collects the frame-rate
//! cap and, when anything was drawn, the draw-finish notification.

use std::time::Duration;

use framepack::NodeId;
use glam::Vec3;
use tracing::trace;

use crate::compound::{ChannelId, Compound, Eye, Inherited, Tasks};
use crate::context::{wall_frustum, RenderContext};

/// One unit of per-frame work for a channel, in execution order.
#[derive(Debug, Clone)]
pub enum ChannelTask {
    Clear {
        context: RenderContext,
    },
    Draw {
        context: RenderContext,
    },
    /// Capture the listed output frames from the channel's surface.
    Readback {
        context: RenderContext,
        frames: Vec<String>,
    },
    /// Send one output frame to its consuming nodes.
    Transmit {
        frame: String,
        to: Vec<NodeId>,
    },
    /// Wait for and composite the listed input frames.
    Assemble {
        context: RenderContext,
        frames: Vec<String>,
    },
    /// All draw tasks of this frame were submitted.
    FinishDraw {
        frame_number: u32,
    },
}

/// The result of one channel update walk.
#[derive(Debug)]
pub struct ChannelUpdate {
    pub tasks: Vec<ChannelTask>,
    /// True when any leaf drew for this channel this frame.
    pub updated: bool,
    /// Smallest frame interval satisfying every `max_fps` cap on the path;
    /// the channel must not start its next frame earlier.
    pub min_frame_time: Option<Duration>,
}

/// Near and far plane distances for frustum computation.
#[derive(Debug, Clone, Copy)]
pub struct ViewParams {
    pub eye_position: Vec3,
    pub near: f32,
    pub far: f32,
    pub ortho: bool,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            eye_position: Vec3::ZERO,
            near: 0.1,
            far: 10.0,
            ortho: false,
        }
    }
}

/// Walks the compound tree and emits the channel's tasks for one frame.
///
/// Siblings are visited in declaration order; for sort-first tiling this
/// is the submission order and every tile is drawn exactly once.
pub fn update_channel(
    root: &Compound,
    channel: ChannelId,
    frame_id: u32,
    frame_number: u32,
    eye: Eye,
    view: &ViewParams,
) -> ChannelUpdate {
    let mut visitor = ChannelUpdateVisitor {
        channel,
        frame_id,
        frame_number,
        eye,
        view,
        tasks: Vec::new(),
        updated: false,
        min_frame_time: None,
    };
    visitor.visit(root, Inherited::root());
    if visitor.updated {
        visitor.tasks.push(ChannelTask::FinishDraw { frame_number });
    }
    ChannelUpdate {
        tasks: visitor.tasks,
        updated: visitor.updated,
        min_frame_time: visitor.min_frame_time,
    }
}

struct ChannelUpdateVisitor<'a> {
    channel: ChannelId,
    frame_id: u32,
    frame_number: u32,
    eye: Eye,
    view: &'a ViewParams,
    tasks: Vec<ChannelTask>,
    updated: bool,
    min_frame_time: Option<Duration>,
}

impl ChannelUpdateVisitor<'_> {
    fn visit(&mut self, compound: &Compound, inherited: Inherited) {
        let scope = inherited.descend(compound);
        if compound.is_leaf() {
            self.visit_leaf(compound, scope);
        } else {
            self.visit_pre(compound, scope);
            for child in &compound.children {
                self.visit(child, scope);
            }
            self.visit_post(compound, scope);
        }
    }

    fn applies(&self, compound: &Compound, scope: Inherited) -> bool {
        scope.channel == Some(self.channel) && scope.eyes.contains(self.eye.flag())
    }

    fn visit_pre(&mut self, compound: &Compound, scope: Inherited) {
        if !self.applies(compound, scope) {
            return;
        }
        let tasks = compound.effective_tasks();
        if tasks.contains(Tasks::CLEAR) {
            let context = self.render_context(compound, scope);
            self.tasks.push(ChannelTask::Clear { context });
        }
    }

    fn visit_leaf(&mut self, compound: &Compound, scope: Inherited) {
        if !self.applies(compound, scope) {
            return;
        }
        let tasks = compound.effective_tasks();
        let context = self.render_context(compound, scope);
        trace!(
            frame = self.frame_number,
            channel = self.channel.0,
            ?tasks,
            "leaf visited"
        );

        if tasks.contains(Tasks::CLEAR) {
            self.tasks.push(ChannelTask::Clear {
                context: context.clone(),
            });
        }
        if tasks.contains(Tasks::DRAW) {
            self.tasks.push(ChannelTask::Draw {
                context: context.clone(),
            });
            self.updated = true;
        }
        if tasks.contains(Tasks::READBACK) && !compound.outputs.is_empty() {
            self.tasks.push(ChannelTask::Readback {
                context: context.clone(),
                frames: compound
                    .outputs
                    .iter()
                    .map(|output| output.name.clone())
                    .collect(),
            });
            for output in &compound.outputs {
                self.tasks.push(ChannelTask::Transmit {
                    frame: output.name.clone(),
                    to: output.consumers.clone(),
                });
            }
        }
        self.visit_assemble(compound, &context);
        self.update_frame_rate(compound);
    }

    fn visit_post(&mut self, compound: &Compound, scope: Inherited) {
        if !self.applies(compound, scope) {
            return;
        }
        let context = self.render_context(compound, scope);
        self.visit_assemble(compound, &context);
        self.update_frame_rate(compound);
    }

    fn visit_assemble(&mut self, compound: &Compound, context: &RenderContext) {
        if !compound.effective_tasks().contains(Tasks::ASSEMBLE) || compound.inputs.is_empty() {
            return;
        }
        self.tasks.push(ChannelTask::Assemble {
            context: context.clone(),
            frames: compound.inputs.clone(),
        });
        self.updated = true;
    }

    fn update_frame_rate(&mut self, compound: &Compound) {
        let Some(max_fps) = compound.max_fps else {
            return;
        };
        if max_fps <= 0.0 {
            return;
        }
        let interval = Duration::from_secs_f32(1.0 / max_fps);
        self.min_frame_time = Some(match self.min_frame_time {
            Some(current) => current.max(interval),
            None => interval,
        });
    }

    fn render_context(&self, compound: &Compound, scope: Inherited) -> RenderContext {
        RenderContext {
            frame_id: self.frame_id,
            frame_number: self.frame_number,
            pvp: compound.viewport,
            range: compound.range,
            zoom: compound.zoom,
            eye: self.eye,
            buffers: scope.buffers,
            frustum: compound.wall.as_ref().map(|wall| {
                wall_frustum(
                    wall,
                    self.view.eye_position,
                    self.view.near,
                    self.view.far,
                    self.view.ortho,
                )
            }),
        }
    }
}
