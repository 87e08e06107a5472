//! The config frame-control protocol.
//!
//! A [`Config`] is the application handle driving a cluster configuration
//! through its lifecycle and frame loop. Control requests travel to the
//! server thread over a channel and are answered through the request/reply
//! correlation table; frame completion flows back through a monitored
//! finished-frame counter, which is also the sole backpressure mechanism:
//! `current_frame - finished_frame <= latency` holds at every observation
//! point.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use framepack::NodeId;
use syncbase::{Monitor, MtQueue, RequestError, RequestHandler, RequestId};
use tracing::{debug, info, warn};

/// Lifecycle states of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    Idle,
    Initializing,
    Running,
    Exiting,
    /// Terminal: a failed init or exit; the config cannot be reused.
    ErrorStopped,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("'{operation}' not allowed in state {state:?}")]
    BadState {
        operation: &'static str,
        state: ConfigState,
    },
    #[error("config initialization failed")]
    InitFailed,
    #[error("config exit failed")]
    ExitFailed,
    #[error("server thread is gone")]
    ServerGone,
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Application-supplied per-node frame execution.
///
/// Called on the node's worker thread, once per started frame, in frame
/// order. A returned error is logged and the frame still counts as done;
/// aborting mid-cluster-frame is worse than a wrong frame.
pub trait FrameRunner: Send {
    fn run_frame(&mut self, node: NodeId, frame_number: u32, frame_id: u32) -> anyhow::Result<()>;
}

impl<F> FrameRunner for F
where
    F: FnMut(NodeId, u32, u32) -> anyhow::Result<()> + Send,
{
    fn run_frame(&mut self, node: NodeId, frame_number: u32, frame_id: u32) -> anyhow::Result<()> {
        self(node, frame_number, frame_id)
    }
}

/// Orders node completions into a strictly in-order finished counter.
///
/// Frame N+1 cannot finish before frame N: a completion arriving early is
/// held back until every predecessor has been counted.
#[derive(Debug)]
pub struct FinishedFrameTracker {
    finished: Arc<Monitor<u32>>,
    pending: Mutex<BinaryHeap<Reverse<u32>>>,
}

impl FinishedFrameTracker {
    pub fn new() -> Self {
        Self {
            finished: Arc::new(Monitor::new(0)),
            pending: Mutex::new(BinaryHeap::new()),
        }
    }

    /// The monitored finished-frame counter.
    pub fn counter(&self) -> Arc<Monitor<u32>> {
        Arc::clone(&self.finished)
    }

    /// Records that all work for `frame_number` is done.
    pub fn notify_done(&self, frame_number: u32) {
        let mut pending = self.pending.lock().expect("tracker mutex poisoned");
        debug_assert!(
            frame_number > self.finished.get(),
            "frame finished more than once"
        );
        pending.push(Reverse(frame_number));
        while pending.peek() == Some(&Reverse(self.finished.get() + 1)) {
            pending.pop();
            self.finished.increment();
        }
    }
}

impl Default for FinishedFrameTracker {
    fn default() -> Self {
        Self::new()
    }
}

enum ServerCommand {
    Init { request: RequestId, init_id: u32 },
    Exit { request: RequestId },
    StartFrame { request: RequestId, frame_id: u32 },
    FinishFrame { request: RequestId },
    FinishAllFrames { request: RequestId },
}

enum NodeTask {
    Frame { frame_number: u32, frame_id: u32 },
    Stop,
}

struct NodeDone {
    node: NodeId,
    frame_number: u32,
}

/// Completion progress of one started frame. The expected count is
/// snapshotted when the frame starts; the worker set may change before the
/// completions arrive.
struct FrameProgress {
    done: usize,
    expected: usize,
}

/// The in-process server: one thread serving the frame-control protocol
/// for N node worker threads.
pub struct LocalServer;

impl LocalServer {
    /// Starts the server thread and returns the config handle driving it.
    ///
    /// `make_runner` is called per node on every successful init, so an
    /// exited config can be initialized again.
    pub fn start<F>(latency: u32, nodes: u32, make_runner: F) -> Config
    where
        F: FnMut(NodeId) -> Box<dyn FrameRunner> + Send + 'static,
    {
        let (command_tx, command_rx) = unbounded();
        let requests = Arc::new(RequestHandler::new());
        let tracker = FinishedFrameTracker::new();
        let finished = tracker.counter();

        let server = ServerThread {
            requests: Arc::clone(&requests),
            tracker,
            latency,
            nodes,
            make_runner: Box::new(make_runner),
            workers: Vec::new(),
            last_started: 0,
            in_flight: HashMap::new(),
        };
        let handle = thread::spawn(move || server.run(command_rx));

        Config {
            state: ConfigState::Idle,
            latency,
            current_frame: 0,
            commands: Some(command_tx),
            requests,
            finished,
            local_release: Arc::new(Monitor::new(0)),
            server: Some(handle),
        }
    }
}

/// Application handle for one cluster configuration.
pub struct Config {
    state: ConfigState,
    latency: u32,
    current_frame: u32,
    commands: Option<Sender<ServerCommand>>,
    requests: Arc<RequestHandler<u64>>,
    finished: Arc<Monitor<u32>>,
    local_release: Arc<Monitor<u32>>,
    server: Option<JoinHandle<()>>,
}

impl Config {
    pub fn state(&self) -> ConfigState {
        self.state
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    /// The last started frame number, 0 before the first frame.
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// The last globally finished frame number.
    pub fn finished_frame(&self) -> u32 {
        self.finished.get()
    }

    /// Initializes the configuration; blocks until the server replies.
    ///
    /// Failure is terminal: the config lands in `ErrorStopped` and cannot
    /// be initialized again.
    pub fn init(&mut self, init_id: u32) -> Result<(), ConfigError> {
        if self.state != ConfigState::Idle {
            return Err(ConfigError::BadState {
                operation: "init",
                state: self.state,
            });
        }
        self.state = ConfigState::Initializing;
        let request = self.requests.register();
        self.send(ServerCommand::Init { request, init_id })?;
        if self.requests.wait(request)? == 1 {
            info!(init_id, "config initialized");
            self.state = ConfigState::Running;
            Ok(())
        } else {
            warn!(init_id, "config initialization failed");
            self.state = ConfigState::ErrorStopped;
            Err(ConfigError::InitFailed)
        }
    }

    /// Stops the node workers; blocks until the server replies.
    pub fn exit(&mut self) -> Result<(), ConfigError> {
        if self.state != ConfigState::Running {
            return Err(ConfigError::BadState {
                operation: "exit",
                state: self.state,
            });
        }
        self.state = ConfigState::Exiting;
        let request = self.requests.register();
        self.send(ServerCommand::Exit { request })?;
        if self.requests.wait(request)? == 1 {
            self.state = ConfigState::Idle;
            Ok(())
        } else {
            self.state = ConfigState::ErrorStopped;
            Err(ConfigError::ExitFailed)
        }
    }

    /// Starts a new frame and returns its number.
    ///
    /// Frame numbers increase monotonically. Blocks while starting another
    /// frame would put this node more than `latency` frames ahead of the
    /// globally finished frame.
    pub fn start_frame(&mut self, frame_id: u32) -> Result<u32, ConfigError> {
        if self.state != ConfigState::Running {
            return Err(ConfigError::BadState {
                operation: "start_frame",
                state: self.state,
            });
        }
        // The new frame itself can never be finished yet, so the wait floor
        // is capped at the last started frame; latency 0 degenerates to a
        // fully synchronous loop instead of waiting on its own frame.
        let floor = (self.current_frame + 1)
            .saturating_sub(self.latency)
            .min(self.current_frame);
        self.finished.wait_ge(floor);

        let request = self.requests.register();
        self.send(ServerCommand::StartFrame { request, frame_id })?;
        let frame_number = self.requests.wait(request)? as u32;
        debug_assert_eq!(frame_number, self.current_frame + 1);
        self.current_frame = frame_number;
        debug!(frame = frame_number, "frame started");
        Ok(frame_number)
    }

    /// Blocks until the oldest outstanding frame has finished and returns
    /// the finished frame number.
    pub fn finish_frame(&mut self) -> Result<u32, ConfigError> {
        if self.state != ConfigState::Running {
            return Err(ConfigError::BadState {
                operation: "finish_frame",
                state: self.state,
            });
        }
        let request = self.requests.register();
        self.send(ServerCommand::FinishFrame { request })?;
        let target = self.requests.wait(request)? as u32;
        self.finished.wait_ge(target);
        Ok(self.finished.get())
    }

    /// Blocks until every started frame has finished.
    pub fn finish_all_frames(&mut self) -> Result<u32, ConfigError> {
        if self.state != ConfigState::Running {
            return Err(ConfigError::BadState {
                operation: "finish_all_frames",
                state: self.state,
            });
        }
        let request = self.requests.register();
        self.send(ServerCommand::FinishAllFrames { request })?;
        let target = self.requests.wait(request)? as u32;
        self.finished.wait_ge(target);
        debug!(frame = target, "all frames finished");
        Ok(target)
    }

    /// Marks this node's local resources for `frame_number` as reusable,
    /// independent of the global finish.
    pub fn release_frame_local(&self, frame_number: u32) {
        debug_assert!(frame_number >= self.local_release.get());
        self.local_release.set(frame_number);
    }

    /// Blocks until local resources for `frame_number` were released.
    pub fn wait_frame_released_local(&self, frame_number: u32) {
        self.local_release.wait_ge(frame_number);
    }

    fn send(&self, command: ServerCommand) -> Result<(), ConfigError> {
        self.commands
            .as_ref()
            .ok_or(ConfigError::ServerGone)?
            .send(command)
            .map_err(|_| ConfigError::ServerGone)
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        // Disconnecting the command channel stops the server thread.
        self.commands.take();
        if let Some(handle) = self.server.take() {
            if handle.join().is_err() {
                warn!("server thread panicked during shutdown");
            }
        }
    }
}

struct Worker {
    queue: Arc<MtQueue<NodeTask>>,
    handle: JoinHandle<()>,
}

struct ServerThread {
    requests: Arc<RequestHandler<u64>>,
    tracker: FinishedFrameTracker,
    latency: u32,
    nodes: u32,
    make_runner: Box<dyn FnMut(NodeId) -> Box<dyn FrameRunner> + Send>,
    workers: Vec<Worker>,
    last_started: u32,
    in_flight: HashMap<u32, FrameProgress>,
}

impl ServerThread {
    fn run(mut self, commands: Receiver<ServerCommand>) {
        let (done_tx, done_rx) = unbounded::<NodeDone>();
        loop {
            select! {
                recv(commands) -> command => match command {
                    Ok(command) => self.handle_command(command, &done_tx, &done_rx),
                    Err(_) => break,
                },
                recv(done_rx) -> done => {
                    if let Ok(done) = done {
                        self.handle_done(done);
                    }
                }
            }
        }
        self.stop_workers();
        debug!("server thread done");
    }

    fn handle_command(
        &mut self,
        command: ServerCommand,
        done_tx: &Sender<NodeDone>,
        done_rx: &Receiver<NodeDone>,
    ) {
        match command {
            ServerCommand::Init { request, init_id } => {
                let ok = self.init_workers(init_id, done_tx);
                self.serve(request, ok as u64);
            }
            ServerCommand::Exit { request } => {
                // Joining the workers flushes their queues, so every started
                // frame has reported by now; drain those completions before
                // replying or a later init would inherit a stalled tracker.
                self.stop_workers();
                while let Ok(done) = done_rx.try_recv() {
                    self.handle_done(done);
                }
                debug_assert!(self.in_flight.is_empty(), "frame lost at exit");
                self.serve(request, 1);
            }
            ServerCommand::StartFrame { request, frame_id } => {
                self.last_started += 1;
                let frame_number = self.last_started;
                for worker in &self.workers {
                    worker.queue.push(NodeTask::Frame {
                        frame_number,
                        frame_id,
                    });
                }
                if self.workers.is_empty() {
                    self.tracker.notify_done(frame_number);
                } else {
                    self.in_flight.insert(
                        frame_number,
                        FrameProgress {
                            done: 0,
                            expected: self.workers.len(),
                        },
                    );
                }
                self.serve(request, frame_number as u64);
            }
            ServerCommand::FinishFrame { request } => {
                let target = self.last_started.saturating_sub(self.latency);
                self.serve(request, target as u64);
            }
            ServerCommand::FinishAllFrames { request } => {
                self.serve(request, self.last_started as u64);
            }
        }
    }

    fn handle_done(&mut self, done: NodeDone) {
        debug!(node = done.node.0, frame = done.frame_number, "node finished");
        let Some(progress) = self.in_flight.get_mut(&done.frame_number) else {
            warn!(frame = done.frame_number, "completion for unknown frame");
            return;
        };
        progress.done += 1;
        if progress.done == progress.expected {
            self.in_flight.remove(&done.frame_number);
            self.tracker.notify_done(done.frame_number);
        }
    }

    fn init_workers(&mut self, init_id: u32, done_tx: &Sender<NodeDone>) -> bool {
        if !self.workers.is_empty() || self.nodes == 0 {
            warn!(init_id, nodes = self.nodes, "config cannot initialize");
            return false;
        }
        for index in 0..self.nodes {
            let node = NodeId(index);
            let queue = Arc::new(MtQueue::new());
            let mut runner = (self.make_runner)(node);
            let done = done_tx.clone();
            let handle = {
                let queue = Arc::clone(&queue);
                thread::spawn(move || loop {
                    match queue.pop() {
                        NodeTask::Frame {
                            frame_number,
                            frame_id,
                        } => {
                            if let Err(error) = runner.run_frame(node, frame_number, frame_id) {
                                warn!(
                                    node = node.0,
                                    frame = frame_number,
                                    error = %error,
                                    "frame runner failed, frame counted as done"
                                );
                            }
                            let _ = done.send(NodeDone { node, frame_number });
                        }
                        NodeTask::Stop => break,
                    }
                })
            };
            self.workers.push(Worker { queue, handle });
        }
        info!(init_id, nodes = self.nodes, "node workers started");
        true
    }

    fn stop_workers(&mut self) {
        for worker in &self.workers {
            worker.queue.push(NodeTask::Stop);
        }
        for worker in self.workers.drain(..) {
            if worker.handle.join().is_err() {
                warn!("node worker panicked");
            }
        }
    }

    fn serve(&self, request: RequestId, value: u64) {
        if let Err(error) = self.requests.serve(request, value) {
            warn!(error = %error, "failed to serve config request");
        }
    }
}
