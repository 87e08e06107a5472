//! Node links and the per-process network receive thread.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use framepack::{apply_received, decode_frame, Frame, FramePayload, NodeId};
use tracing::{debug, warn};

/// Process-lifetime table of frame links to other nodes.
///
/// Owned by the process context and passed by reference; registering a node
/// creates the channel its receive thread will drain.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    links: HashMap<NodeId, Sender<FramePayload>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
        }
    }

    /// Registers a node and returns the receiving end of its frame link.
    pub fn register(&mut self, node: NodeId) -> Receiver<FramePayload> {
        let (tx, rx) = unbounded();
        self.links.insert(node, tx);
        rx
    }

    pub fn remove(&mut self, node: NodeId) {
        self.links.remove(&node);
    }

    /// Senders for a list of consumer nodes, for [`framepack::transmit`].
    ///
    /// Unknown nodes are logged and skipped so a partially connected
    /// cluster keeps producing.
    pub fn senders(&self, nodes: &[NodeId]) -> Vec<Sender<FramePayload>> {
        nodes
            .iter()
            .filter_map(|node| match self.links.get(node) {
                Some(sender) => Some(sender.clone()),
                None => {
                    warn!(node = node.0, "no link for consumer node");
                    None
                }
            })
            .collect()
    }
}

/// Starts the network receive thread for one node.
///
/// Incoming payloads are decoded and installed into the pending input frame
/// of the same name, which marks it ready and wakes its compositor. The
/// thread exits when every sender for the link is dropped. Decode failures
/// and payloads without a matching input frame are logged and dropped; the
/// pipeline keeps running.
pub fn spawn_receiver(
    node: NodeId,
    link: Receiver<FramePayload>,
    inputs: Vec<Frame>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for payload in link.iter() {
            let decoded = match decode_frame(&payload.0) {
                Ok(decoded) => decoded,
                Err(error) => {
                    warn!(node = node.0, error = %error, "dropping undecodable frame payload");
                    continue;
                }
            };
            let Some(pending) = inputs.iter().find(|frame| frame.name() == decoded.name) else {
                warn!(
                    node = node.0,
                    frame = decoded.name,
                    "payload for unknown input frame dropped"
                );
                continue;
            };
            debug!(node = node.0, frame = decoded.name, "frame received");
            if let Err(error) = apply_received(pending, decoded) {
                warn!(node = node.0, error = %error, "failed to install received frame");
            }
        }
        debug!(node = node.0, "receive thread done");
    })
}
