//! Frame data, image storage and network transport for the frameloom
//! cluster-rendering pipeline.
//!
//! A [`Frame`] carries one rendering contribution: placement metadata
//! (offset, zoom, database range, buffer mask) plus zero or more [`Image`]s
//! holding the actual color/depth pixels. Frames are produced by the channel
//! that rendered them, optionally compressed and transmitted to consuming
//! nodes, and consumed read-only after [`Frame::set_ready`].

mod codec;
mod frame;
mod image;
mod types;
mod wire;

pub use codec::{compress, decompress, CodecError, CompressedChunks, CHUNK_SIZE};
pub use frame::{Frame, FrameData};
pub use image::{Image, ImageError, Storage};
pub use types::{Buffers, PixelViewport, Range, Zoom};
pub use wire::{
    apply_received, decode_frame, encode_frame, transmit, DecodedFrame, FramePayload, NodeId,
    WireError,
};
