use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use image::RgbaImage;

use crate::{
    component::{Component, PreviewContext},
    render::Compositor,
    PreviewConfig, Result, VisualizerError,
};

/// Snapshot of the editor's component stack, topmost layer first.
#[derive(Clone, Default)]
pub struct RenderRequest {
    pub components: Vec<Arc<dyn Component>>,
}

impl RenderRequest {
    pub fn new(components: Vec<Arc<dyn Component>>) -> Self {
        Self { components }
    }
}

impl std::fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("RenderRequest")
            .field("components", &names)
            .finish()
    }
}

/// Outbound notifications from the preview worker.
#[derive(Debug, Clone)]
pub enum PreviewEvent {
    Frame(RgbaImage),
    /// A render pass was abandoned; carries the reason.
    Failed(String),
}

/// Creates the producer/consumer pair for the preview pipeline plus the
/// receiver for the frames it emits.
pub fn channel(config: &PreviewConfig) -> Result<(PreviewQueue, PreviewWorker, Receiver<PreviewEvent>)> {
    config.validate()?;

    let (request_tx, request_rx) = crossbeam_channel::bounded(config.queue_capacity);
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    // Never carries a message; disconnects when the worker is dropped.
    let (alive_tx, alive_rx) = crossbeam_channel::bounded(0);

    let queue = PreviewQueue {
        tx: request_tx,
        overflow: request_rx.clone(),
        alive: alive_rx,
    };
    let worker = PreviewWorker {
        requests: request_rx,
        events: event_tx,
        compositor: Compositor::from_config(config)?,
        context: PreviewContext::new(config.output_width, config.output_height),
        _alive: alive_tx,
    };

    Ok((queue, worker, event_rx))
}

/// Producer side of the preview pipeline.
///
/// Submitting never blocks: when the queue is full the oldest pending request
/// is evicted, since only the freshest state is ever shown.
#[derive(Debug, Clone)]
pub struct PreviewQueue {
    tx: Sender<RenderRequest>,
    overflow: Receiver<RenderRequest>,
    alive: Receiver<()>,
}

impl PreviewQueue {
    /// Queues a render of `components`. Fails with
    /// [`VisualizerError::QueueClosed`] once the worker has gone away.
    pub fn submit(&self, components: Vec<Arc<dyn Component>>) -> Result<()> {
        if self.is_closed() {
            return Err(VisualizerError::QueueClosed);
        }

        let mut request = RenderRequest::new(components);
        loop {
            match self.tx.try_send(request) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.overflow.try_recv().is_ok() {
                        tracing::trace!("evicted stale preview request");
                    }
                    request = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(VisualizerError::QueueClosed),
            }
        }
    }

    /// Whether the worker has been dropped or its thread has exited.
    pub fn is_closed(&self) -> bool {
        matches!(self.alive.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Number of requests waiting for the worker.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer side of the preview pipeline.
#[derive(Debug)]
pub struct PreviewWorker {
    requests: Receiver<RenderRequest>,
    events: Sender<PreviewEvent>,
    compositor: Compositor,
    context: PreviewContext,
    _alive: Sender<()>,
}

impl PreviewWorker {
    pub fn context(&self) -> PreviewContext {
        self.context
    }

    /// Changes the output resolution used by subsequent passes.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(VisualizerError::InvalidConfig(
                "output resolution must be non-zero",
            ));
        }
        self.context = PreviewContext::new(width, height);
        Ok(())
    }

    /// Renders the newest queued request, dropping any older ones.
    ///
    /// Returns `Ok(false)` without emitting anything when nothing is queued.
    /// A failing component aborts the pass and no frame is emitted.
    pub fn process(&mut self) -> Result<bool> {
        let Some(request) = self.take_latest().0 else {
            return Ok(false);
        };
        self.render(request)
    }

    /// Runs the worker on its own thread, polling the queue every `interval`.
    ///
    /// The thread exits once every [`PreviewQueue`] has been dropped and the
    /// queue is drained, or when the event receiver goes away.
    pub fn spawn(self, interval: Duration) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("preview-worker".to_string())
            .spawn(move || self.run(interval))?;
        Ok(handle)
    }

    fn run(mut self, interval: Duration) {
        let ticker = crossbeam_channel::tick(interval);
        tracing::debug!(?interval, "preview worker started");

        loop {
            if ticker.recv().is_err() {
                break;
            }

            let (latest, closed) = self.take_latest();
            if let Some(request) = latest {
                match self.render(request) {
                    Ok(_) => {}
                    Err(VisualizerError::QueueClosed) => break,
                    Err(err) => {
                        tracing::error!(%err, "preview render failed");
                        if self.events.send(PreviewEvent::Failed(err.to_string())).is_err() {
                            break;
                        }
                    }
                }
            }

            if closed {
                break;
            }
        }

        tracing::debug!("preview worker stopped");
    }

    /// Drains the queue, returning the newest request and whether every
    /// producer has hung up.
    fn take_latest(&self) -> (Option<RenderRequest>, bool) {
        let mut latest = None;
        let mut dropped = 0usize;
        let closed = loop {
            match self.requests.try_recv() {
                Ok(request) => {
                    if latest.replace(request).is_some() {
                        dropped += 1;
                    }
                }
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };

        if dropped > 0 {
            tracing::debug!(dropped, "coalesced stale preview requests");
        }
        (latest, closed)
    }

    fn render(&mut self, request: RenderRequest) -> Result<bool> {
        let frame = self.compositor.composite(&self.context, &request.components)?;
        self.events
            .send(PreviewEvent::Frame(frame))
            .map_err(|_| VisualizerError::QueueClosed)?;
        Ok(true)
    }
}
