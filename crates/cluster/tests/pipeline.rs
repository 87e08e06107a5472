//! End-to-end pipeline: compound traversal, producer draw and readback,
//! network transmission, depth-ordered assembly on the consuming channel.

use cluster::{
    spawn_receiver, update_channel, ChannelId, ChannelTask, Compound, Eye, NodeRegistry,
    OutputFrame, ViewParams,
};
use compositor::{
    assemble_frame, assemble_frames_sorted, order_frames, read_back, DrawableSurface,
    MemorySurface, StorageKind,
};
use framepack::{transmit, Buffers, Frame, NodeId, PixelViewport, Range};
use glam::{Mat3, Mat4};

const SIZE: u32 = 8;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn full_viewport() -> PixelViewport {
    PixelViewport::new(0, 0, SIZE, SIZE)
}

/// Two database slabs rendered on channels 1 and 2, composited on channel 0.
fn sort_last_tree() -> Compound {
    let mut root = Compound::new();
    root.channel = Some(ChannelId(0));
    root.viewport = full_viewport();
    root.inputs = vec!["slab.far".into(), "slab.near".into()];

    let mut far = Compound::new();
    far.channel = Some(ChannelId(1));
    far.viewport = full_viewport();
    far.range = Range::new(0.0, 0.5);
    far.outputs.push(OutputFrame {
        name: "slab.far".into(),
        consumers: vec![NodeId(0)],
    });

    let mut near = Compound::new();
    near.channel = Some(ChannelId(2));
    near.viewport = full_viewport();
    near.range = Range::new(0.5, 1.0);
    near.outputs.push(OutputFrame {
        name: "slab.near".into(),
        consumers: vec![NodeId(0)],
    });

    root.children.push(far);
    root.children.push(near);
    root
}

/// Executes a producer channel's tasks against its own surface, sending
/// output frames through the registry.
fn run_producer(
    tree: &Compound,
    channel: ChannelId,
    registry: &NodeRegistry,
    rgba: [u8; 4],
    depth: f32,
) {
    let update = update_channel(tree, channel, 0, 1, Eye::Cyclop, &ViewParams::default());
    assert!(update.updated);

    let mut surface = MemorySurface::new(SIZE, SIZE);
    let mut outputs: Vec<Frame> = Vec::new();
    for task in &update.tasks {
        match task {
            ChannelTask::Clear { context } => surface.clear_region(context.pvp),
            ChannelTask::Draw { context } => {
                surface.fill_region(context.pvp, rgba, depth);
            }
            ChannelTask::Readback { context, frames } => {
                for name in frames {
                    let frame = Frame::new(name.clone(), context.buffers);
                    frame.data().set_range(context.range);
                    read_back(&frame, &mut surface, context.pvp, StorageKind::Memory, 1.0);
                    frame.set_ready();
                    outputs.push(frame);
                }
            }
            ChannelTask::Transmit { frame, to } => {
                let frame = outputs
                    .iter()
                    .find(|output| output.name() == frame.as_str())
                    .expect("readback produced the output frame");
                transmit(frame, &registry.senders(to)).unwrap();
            }
            ChannelTask::Assemble { .. } | ChannelTask::FinishDraw { .. } => {}
        }
    }
}

#[test]
fn sort_last_frames_travel_and_blend_in_depth_order() {
    init_tracing();
    let tree = sort_last_tree();
    let mut registry = NodeRegistry::new();
    let link = registry.register(NodeId(0));

    let pending: Vec<Frame> = ["slab.far", "slab.near"]
        .into_iter()
        .map(|name| Frame::new(name, Buffers::COLOR))
        .collect();
    let receiver = spawn_receiver(NodeId(0), link, pending.clone());

    // Premultiplied translucent slabs.
    run_producer(&tree, ChannelId(1), &registry, [120, 0, 0, 120], 0.7);
    run_producer(&tree, ChannelId(2), &registry, [0, 0, 90, 90], 0.3);

    // Consumer walk yields the assemble task naming both inputs.
    let update = update_channel(
        &tree,
        ChannelId(0),
        0,
        1,
        Eye::Cyclop,
        &ViewParams::default(),
    );
    let ChannelTask::Assemble { frames, .. } = update
        .tasks
        .iter()
        .find(|task| matches!(task, ChannelTask::Assemble { .. }))
        .expect("assemble task")
    else {
        unreachable!()
    };

    let mut inputs: Vec<Frame> = frames
        .iter()
        .map(|name| {
            let frame = pending
                .iter()
                .find(|frame| frame.name() == name.as_str())
                .expect("pending input frame")
                .clone();
            frame.wait_ready();
            frame
        })
        .collect();

    // Ranges arrived over the wire; swap to prove the sorter restores order.
    assert_eq!(inputs[0].range(), Range::new(0.0, 0.5));
    inputs.swap(0, 1);
    order_frames(
        &mut inputs,
        Mat4::IDENTITY,
        Mat3::IDENTITY,
        Mat4::IDENTITY,
        false,
    );
    assert_eq!(inputs[0].name(), "slab.far");

    let mut destination = MemorySurface::new(SIZE, SIZE);
    assemble_frames_sorted(&inputs, &mut destination, true).unwrap();

    // Far slab first, near slab blended over it.
    let far = [120u8, 0, 0, 120];
    let near = [0u8, 0, 90, 90];
    let mut expected = [0u8; 4];
    for channel in 0..4 {
        let under = far[channel] as u16 * (255 - near[3] as u16);
        expected[channel] = (near[channel] as u16 + (under + 127) / 255) as u8;
    }
    assert_eq!(destination.pixel(4, 4), expected);

    drop(registry);
    receiver.join().unwrap();
}

#[test]
fn sort_first_tiles_cover_the_destination_exactly_once() {
    init_tracing();
    // Two half-width tiles drawn locally and copied into place.
    let mut left_surface = MemorySurface::new(SIZE / 2, SIZE);
    left_surface.fill_region(PixelViewport::new(0, 0, SIZE / 2, SIZE), [10, 0, 0, 255], 0.5);
    let left = Frame::new("tile.left", Buffers::COLOR);
    read_back(
        &left,
        &mut left_surface,
        PixelViewport::new(0, 0, SIZE / 2, SIZE),
        StorageKind::Memory,
        1.0,
    );
    left.set_ready();

    let mut right_surface = MemorySurface::new(SIZE / 2, SIZE);
    right_surface.fill_region(
        PixelViewport::new(0, 0, SIZE / 2, SIZE),
        [0, 10, 0, 255],
        0.5,
    );
    let right = Frame::new("tile.right", Buffers::COLOR);
    right.data().set_offset(glam::IVec2::new(SIZE as i32 / 2, 0));
    read_back(
        &right,
        &mut right_surface,
        PixelViewport::new(0, 0, SIZE / 2, SIZE),
        StorageKind::Memory,
        1.0,
    );
    right.set_ready();

    let mut destination = MemorySurface::new(SIZE, SIZE);
    assemble_frame(&left, &mut destination).unwrap();
    assemble_frame(&right, &mut destination).unwrap();

    for y in 0..SIZE as i32 {
        for x in 0..SIZE as i32 {
            let expected = if x < SIZE as i32 / 2 {
                [10, 0, 0, 255]
            } else {
                [0, 10, 0, 255]
            };
            assert_eq!(destination.pixel(x, y), expected);
        }
    }
}
