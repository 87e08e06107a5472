use std::sync::{Arc, Mutex, RwLock};

use glam::IVec2;
use syncbase::Monitor;

use crate::image::Image;
use crate::types::{Buffers, PixelViewport, Range, Zoom};

/// Placement metadata for one rendering contribution.
#[derive(Debug, Clone, Copy)]
struct Meta {
    offset: IVec2,
    zoom: Zoom,
    range: Range,
    buffers: Buffers,
}

/// The shared payload of a [`Frame`].
///
/// Images are exclusively mutated by the producing channel until
/// [`FrameData::set_ready`]; consumers treat them as read-only afterwards,
/// until the next [`FrameData::clear`].
#[derive(Debug)]
pub struct FrameData {
    meta: Mutex<Meta>,
    images: RwLock<Vec<Image>>,
    spare: Mutex<Vec<Image>>,
    ready: Monitor<bool>,
    listeners: Mutex<Vec<Arc<Monitor<u32>>>>,
}

impl FrameData {
    pub fn new(buffers: Buffers) -> Self {
        Self {
            meta: Mutex::new(Meta {
                offset: IVec2::ZERO,
                zoom: Zoom::NONE,
                range: Range::ALL,
                buffers,
            }),
            images: RwLock::new(Vec::new()),
            spare: Mutex::new(Vec::new()),
            ready: Monitor::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn offset(&self) -> IVec2 {
        self.meta.lock().expect("frame meta poisoned").offset
    }

    pub fn set_offset(&self, offset: IVec2) {
        self.meta.lock().expect("frame meta poisoned").offset = offset;
    }

    pub fn zoom(&self) -> Zoom {
        self.meta.lock().expect("frame meta poisoned").zoom
    }

    pub fn set_zoom(&self, zoom: Zoom) {
        self.meta.lock().expect("frame meta poisoned").zoom = zoom;
    }

    pub fn range(&self) -> Range {
        self.meta.lock().expect("frame meta poisoned").range
    }

    pub fn set_range(&self, range: Range) {
        self.meta.lock().expect("frame meta poisoned").range = range;
    }

    /// The enabled frame buffer attachments.
    pub fn buffers(&self) -> Buffers {
        self.meta.lock().expect("frame meta poisoned").buffers
    }

    pub fn set_buffers(&self, buffers: Buffers) {
        self.meta.lock().expect("frame meta poisoned").buffers = buffers;
    }

    /// Disables a buffer attachment for all compositing of this frame.
    pub fn disable_buffer(&self, buffer: Buffers) {
        self.meta
            .lock()
            .expect("frame meta poisoned")
            .buffers
            .remove(buffer);
    }

    /// Appends a produced image.
    pub fn push_image(&self, image: Image) {
        self.images.write().expect("frame images poisoned").push(image);
    }

    /// Reads the image list.
    pub fn with_images<R>(&self, f: impl FnOnce(&[Image]) -> R) -> R {
        f(&self.images.read().expect("frame images poisoned"))
    }

    /// Mutates the image list; producer-side only, before `set_ready`.
    pub fn with_images_mut<R>(&self, f: impl FnOnce(&mut Vec<Image>) -> R) -> R {
        f(&mut self.images.write().expect("frame images poisoned"))
    }

    /// Hands out a recycled image for the given viewport, avoiding a fresh
    /// allocation when a previous frame left one behind.
    pub fn recycled_image(&self, pvp: PixelViewport) -> Image {
        match self.spare.lock().expect("frame spare poisoned").pop() {
            Some(mut image) => {
                image.set_pixel_viewport(pvp);
                image
            }
            None => Image::new(pvp),
        }
    }

    /// Marks the frame complete.
    ///
    /// Increments every registered listener counter exactly once, then
    /// releases all [`FrameData::wait_ready`] waiters. Idempotent, and safe
    /// to call from the network receive thread.
    pub fn set_ready(&self) {
        let listeners = self.listeners.lock().expect("frame listeners poisoned");
        if self.ready.get() {
            return;
        }
        for listener in listeners.iter() {
            listener.increment();
        }
        self.ready.set(true);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Blocks the calling thread until the frame is ready.
    pub fn wait_ready(&self) {
        self.ready.wait_eq(true);
    }

    /// Registers a counter incremented when the frame becomes ready.
    ///
    /// A listener added after the frame is already ready is incremented
    /// immediately, so readiness notifications are at-least-once.
    pub fn add_listener(&self, listener: Arc<Monitor<u32>>) {
        let mut listeners = self.listeners.lock().expect("frame listeners poisoned");
        if self.ready.get() {
            listener.increment();
        }
        listeners.push(listener);
    }

    /// Removes a listener; only valid once the frame has become ready
    /// (leaving a listener dangling for fire-and-forget wakeups is fine).
    pub fn remove_listener(&self, listener: &Arc<Monitor<u32>>) {
        debug_assert!(self.ready.get(), "listener removed before frame was ready");
        let mut listeners = self.listeners.lock().expect("frame listeners poisoned");
        listeners.retain(|entry| !Arc::ptr_eq(entry, listener));
    }

    /// Resets ready state and recycles attached images for the next frame.
    pub fn clear(&self) {
        let mut images = self.images.write().expect("frame images poisoned");
        let mut spare = self.spare.lock().expect("frame spare poisoned");
        for mut image in images.drain(..) {
            image.clear();
            spare.push(image);
        }
        self.ready.set(false);
    }

    /// Clears the frame and frees all image storage; teardown only.
    pub fn flush(&self) {
        self.images.write().expect("frame images poisoned").clear();
        self.spare.lock().expect("frame spare poisoned").clear();
        self.ready.set(false);
    }
}

/// A named holder for frame data and parameters.
///
/// Compounds connect output frames to input frames by name; the receiving
/// node matches an incoming payload to its pending input frame of the same
/// name.
#[derive(Debug, Clone)]
pub struct Frame {
    name: String,
    data: Arc<FrameData>,
}

impl Frame {
    pub fn new(name: impl Into<String>, buffers: Buffers) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(FrameData::new(buffers)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Arc<FrameData> {
        &self.data
    }

    pub fn offset(&self) -> IVec2 {
        self.data.offset()
    }

    pub fn zoom(&self) -> Zoom {
        self.data.zoom()
    }

    pub fn range(&self) -> Range {
        self.data.range()
    }

    pub fn buffers(&self) -> Buffers {
        self.data.buffers()
    }

    pub fn is_ready(&self) -> bool {
        self.data.is_ready()
    }

    pub fn wait_ready(&self) {
        self.data.wait_ready();
    }

    pub fn set_ready(&self) {
        self.data.set_ready();
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    pub fn flush(&self) {
        self.data.flush();
    }

    /// Bounding box of all images, shifted by the frame offset.
    pub fn covered_viewport(&self) -> PixelViewport {
        let offset = self.data.offset();
        self.data.with_images(|images| {
            let mut pvp = PixelViewport::default();
            for image in images {
                pvp.merge(&image.pixel_viewport().translated(offset));
            }
            pvp
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_ready_increments_each_listener_exactly_once() {
        let frame = Frame::new("test", Buffers::COLOR);
        let first = Arc::new(Monitor::new(0u32));
        let second = Arc::new(Monitor::new(0u32));
        frame.data().add_listener(Arc::clone(&first));
        frame.data().add_listener(Arc::clone(&second));

        frame.set_ready();
        frame.set_ready(); // idempotent

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 1);
        assert!(frame.is_ready());
    }

    #[test]
    fn late_listener_is_woken_immediately() {
        let frame = Frame::new("late", Buffers::COLOR);
        frame.set_ready();
        let listener = Arc::new(Monitor::new(0u32));
        frame.data().add_listener(Arc::clone(&listener));
        assert_eq!(listener.get(), 1);
    }

    #[test]
    fn wait_ready_blocks_until_network_thread_signals() {
        let frame = Frame::new("net", Buffers::COLOR);
        let waiter = {
            let frame = frame.clone();
            thread::spawn(move || {
                frame.wait_ready();
                frame.is_ready()
            })
        };
        let producer = {
            let frame = frame.clone();
            thread::spawn(move || frame.set_ready())
        };
        assert!(waiter.join().unwrap());
        producer.join().unwrap();
    }

    #[test]
    fn clear_recycles_images_and_resets_readiness() {
        let frame = Frame::new("recycle", Buffers::COLOR);
        let pvp = PixelViewport::new(0, 0, 2, 2);
        let mut image = frame.data().recycled_image(pvp);
        image.set_pixel_data(Buffers::COLOR, 4, &[5u8; 16]).unwrap();
        frame.data().push_image(image);
        frame.set_ready();

        frame.clear();
        assert!(!frame.is_ready());
        assert_eq!(frame.data().with_images(|images| images.len()), 0);

        // the cleared image comes back from the spare pool
        let recycled = frame.data().recycled_image(pvp);
        assert!(!recycled.has_buffer(Buffers::COLOR));
    }

    #[test]
    fn covered_viewport_merges_image_rects_with_offset() {
        let frame = Frame::new("cover", Buffers::COLOR);
        frame.data().set_offset(IVec2::new(10, 0));
        frame
            .data()
            .push_image(Image::new(PixelViewport::new(0, 0, 4, 4)));
        frame
            .data()
            .push_image(Image::new(PixelViewport::new(4, 0, 4, 4)));
        assert_eq!(frame.covered_viewport(), PixelViewport::new(10, 0, 8, 4));
    }
}
