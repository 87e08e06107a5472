use framepack::{Buffers, Image, PixelViewport, Zoom};
use glam::IVec2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReadbackError {
    #[error("capture region {requested:?} lies outside surface {surface:?}")]
    OutOfBounds {
        requested: PixelViewport,
        surface: PixelViewport,
    },
    #[error("capture region has no area")]
    EmptyRegion,
    #[error("capture of {requested:?} exceeds single-capture limit {max:?}")]
    TooLarge {
        requested: (u32, u32),
        max: (u32, u32),
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error("image {buffer:?} buffer has unsupported {bytes_per_pixel} bytes/pixel")]
    UnsupportedFormat {
        buffer: Buffers,
        bytes_per_pixel: u32,
    },
    #[error("assembly op requires a {0:?} buffer the image does not carry")]
    MissingBuffer(Buffers),
    #[error("texture handle {0} no longer resident on this surface")]
    TextureGone(u64),
    #[error("texture handle {handle} is resident as {resident:?} but the image declares {declared:?}")]
    TextureMismatch {
        handle: u64,
        resident: PixelViewport,
        declared: PixelViewport,
    },
}

/// How an image is written into the destination draw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssembleOp {
    /// Overwrite destination pixels (sort-first tiles, no blending).
    Copy,
    /// Premultiplied alpha blending, ONE / ONE_MINUS_SRC_ALPHA.
    BlendAlpha,
    /// Opaque compositing, nearer depth wins.
    DepthTest,
}

/// Where a capture should place its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Host memory, transportable over the network.
    #[default]
    Memory,
    /// Surface-resident texture, referenced by handle; cheapest for frames
    /// composited on the node that produced them.
    Texture,
}

/// Capability interface of a destination rendering surface.
///
/// The core never talks to a window system; backends implement this trait
/// over whatever drawable they own. All coordinates are window coordinates,
/// origin bottom-left.
pub trait DrawableSurface {
    /// The surface's full pixel viewport.
    fn pixel_viewport(&self) -> PixelViewport;

    /// Largest region a single [`DrawableSurface::capture`] call can grab;
    /// larger readbacks are tiled by the caller.
    fn max_capture_size(&self) -> (u32, u32);

    /// Captures the requested buffers of `region` into a new image.
    fn capture(
        &mut self,
        region: PixelViewport,
        buffers: Buffers,
        quality: f32,
        kind: StorageKind,
    ) -> Result<Image, ReadbackError>;

    /// Writes an image into the current draw buffer at `offset`, scaled by
    /// `zoom`, honoring the current scissor.
    fn assemble_image(
        &mut self,
        image: &Image,
        offset: IVec2,
        zoom: Zoom,
        op: AssembleOp,
    ) -> Result<(), AssembleError>;

    /// Clears a region of the draw and depth buffers.
    fn clear_region(&mut self, region: PixelViewport);

    /// Restricts subsequent writes to `scissor`; `None` lifts the restriction.
    fn set_scissor(&mut self, scissor: Option<PixelViewport>);

    /// Snapshots mutable assembly state (scissor). Callers bracket a whole
    /// assembly phase with save/restore.
    fn save_assembly_state(&mut self);

    /// Restores the state captured by the last
    /// [`DrawableSurface::save_assembly_state`].
    fn restore_assembly_state(&mut self);

    /// Drops a surface-resident texture produced by a
    /// [`StorageKind::Texture`] capture.
    fn discard_texture(&mut self, handle: u64);
}
