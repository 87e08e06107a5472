//! Cluster frame distribution and control.
//!
//! The compound task tree describes how one logical frame splits across
//! channels and nodes; the update visitor turns it into per-channel task
//! lists each frame; the node registry carries encoded frames between
//! nodes; and the config protocol paces the whole cluster, keeping every
//! node within `latency` frames of the globally finished frame.

mod compound;
mod config;
mod context;
mod registry;
mod visitor;

pub use compound::{ChannelId, Compound, Eye, Eyes, OutputFrame, Tasks, Wall};
pub use config::{
    Config, ConfigError, ConfigState, FinishedFrameTracker, FrameRunner, LocalServer,
};
pub use context::{wall_frustum, Frustum, RenderContext};
pub use registry::{spawn_receiver, NodeRegistry};
pub use visitor::{update_channel, ChannelTask, ChannelUpdate, ViewParams};
