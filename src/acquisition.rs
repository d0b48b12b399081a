//! Restart → configure → receive → stop sequencing for one acquisition run.
//!
//! The receive loop is the only writer of the result buffers and of the
//! latest-frame slot. Other threads observe a run through an
//! [`AcquisitionControl`]: progress counters, the most recent frame and a
//! cooperative cancellation flag that the loop checks once per iteration.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::{SETTLE_DELAY, SETTLE_POLL_INTERVAL};
use crate::error::Result;
use crate::frames::{AcquisitionFrame, AcquisitionResult, SharedLatestFrame, StopReason};
use crate::protocol::ValidationMode;
use crate::routing::RoutingTable;
use crate::transport::Transport;
use crate::uss_config::AcquisitionConfig;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle = 0,
    Configuring = 1,
    Running = 2,
    Stopping = 3,
}

impl AcquisitionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Configuring,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionOptions {
    /// Pause between the restart packet and the configuration packet.
    pub settle_delay: Duration,
    pub validation: ValidationMode,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
            validation: ValidationMode::Lenient,
        }
    }
}

/// Packets and bounds of a run, encoded before anything is sent.
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    pub config_packet: Vec<u8>,
    pub restart_packet: Vec<u8>,
    pub num_acquisitions: usize,
}

impl AcquisitionPlan {
    /// Applies `routing` to a copy of `config`, validates it and encodes the packets.
    pub fn prepare(config: &AcquisitionConfig, routing: &RoutingTable, mode: ValidationMode) -> Result<Self> {
        let mut config = config.clone();
        config.apply_routing(routing);
        config.validate(mode)?;
        Ok(Self {
            config_packet: config.build_packet_with(mode)?,
            restart_packet: config.build_restart_packet(),
            num_acquisitions: config.num_acquisitions as usize,
        })
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    cancel: AtomicBool,
    received: AtomicUsize,
    target: AtomicUsize,
    latest: SharedLatestFrame,
}

/// Observer and cancellation handle for a run; cheap to clone across threads.
#[derive(Debug, Clone)]
pub struct AcquisitionControl {
    shared: Arc<Shared>,
}

impl AcquisitionControl {
    /// Asks the loop to stop at its next check point.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// `(received, requested)` acquisitions of the current run.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.shared.received.load(Ordering::Relaxed),
            self.shared.target.load(Ordering::Relaxed),
        )
    }

    /// Most recently received frame of the current run.
    pub fn latest_frame(&self) -> Option<Arc<AcquisitionFrame>> {
        self.shared.latest.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Drives one probe through acquisition runs.
pub struct AcquisitionLoop {
    options: AcquisitionOptions,
    shared: Arc<Shared>,
}

impl Default for AcquisitionLoop {
    fn default() -> Self {
        Self::new(AcquisitionOptions::default())
    }
}

impl AcquisitionLoop {
    pub fn new(options: AcquisitionOptions) -> Self {
        Self {
            options,
            shared: Arc::new(Shared {
                state: AtomicU8::new(AcquisitionState::Idle as u8),
                cancel: AtomicBool::new(false),
                received: AtomicUsize::new(0),
                target: AtomicUsize::new(0),
                latest: Arc::new(Mutex::new(None)),
            }),
        }
    }

    pub fn control(&self) -> AcquisitionControl {
        AcquisitionControl {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn options(&self) -> &AcquisitionOptions {
        &self.options
    }

    fn set_state(&self, state: AcquisitionState) {
        debug!("Acquisition state -> {state:?}");
        self.shared.state.store(state as u8, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::SeqCst)
    }

    /// Runs a full acquisition on the calling thread.
    ///
    /// Configuration errors are returned before anything is sent. Transport
    /// errors while configuring abort the run; once running, the run always
    /// ends with a restart packet and returns whatever was received.
    pub fn run<T: Transport>(
        &self,
        transport: &mut T,
        config: &AcquisitionConfig,
        routing: &RoutingTable,
    ) -> Result<AcquisitionResult> {
        let plan = AcquisitionPlan::prepare(config, routing, self.options.validation)?;
        self.execute(transport, &plan)
    }

    /// Runs a prepared plan on the calling thread.
    pub fn execute<T: Transport>(&self, transport: &mut T, plan: &AcquisitionPlan) -> Result<AcquisitionResult> {
        // a cancel requested while idle does not carry over into this run
        self.shared.cancel.store(false, Ordering::SeqCst);
        self.shared.received.store(0, Ordering::Relaxed);
        self.shared.target.store(plan.num_acquisitions, Ordering::Relaxed);
        if let Ok(mut slot) = self.shared.latest.lock() {
            *slot = None;
        }

        let outcome = self.configure(transport, plan).map(|()| self.receive(transport, plan));
        if outcome.is_err() {
            self.finish();
            return outcome;
        }

        self.set_state(AcquisitionState::Stopping);
        if let Err(e) = transport.send(&plan.restart_packet) {
            warn!("Failed to send restart packet after acquisition: {e}");
        }
        self.finish();
        outcome
    }

    fn finish(&self) {
        self.shared.cancel.store(false, Ordering::SeqCst);
        self.set_state(AcquisitionState::Idle);
    }

    fn configure<T: Transport>(&self, transport: &mut T, plan: &AcquisitionPlan) -> Result<()> {
        self.set_state(AcquisitionState::Configuring);

        // The probe may still be running a previous configuration.
        transport.send(&plan.restart_packet).inspect_err(|e| {
            error!("Failed to restart probe: {e}");
        })?;

        let deadline = Instant::now() + self.options.settle_delay;
        while !self.cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SETTLE_POLL_INTERVAL.min(deadline - now));
        }
        if self.cancelled() {
            info!("Acquisition cancelled before configuration was sent");
            return Ok(());
        }

        transport.send(&plan.config_packet).inspect_err(|e| {
            error!("Failed to send configuration: {e}");
        })
    }

    fn receive<T: Transport>(&self, transport: &mut T, plan: &AcquisitionPlan) -> AcquisitionResult {
        self.set_state(AcquisitionState::Running);
        let mut result = AcquisitionResult::new(transport.acq_length(), plan.num_acquisitions);

        while result.len() < plan.num_acquisitions {
            if self.cancelled() {
                result.stop_reason = StopReason::Cancelled;
                break;
            }
            match transport.receive_frame() {
                Ok(Some(frame)) => {
                    result.push(&frame);
                    self.publish(frame);
                    self.shared.received.store(result.len(), Ordering::Relaxed);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Acquisition stopped by transport error: {e}");
                    result.stop_reason = StopReason::Disconnected(e.to_string());
                    break;
                }
            }
        }

        info!(
            "Received {}/{} acquisitions ({:?})",
            result.len(),
            plan.num_acquisitions,
            result.stop_reason
        );
        result
    }

    fn publish(&self, frame: AcquisitionFrame) {
        if let Ok(mut slot) = self.shared.latest.lock() {
            *slot = Some(Arc::new(frame));
        }
    }

    /// Validates and encodes the run, then executes it on a new thread.
    ///
    /// On a configuration error nothing is spawned and the transport is handed back.
    pub fn spawn<T>(
        self,
        transport: T,
        config: &AcquisitionConfig,
        routing: &RoutingTable,
    ) -> std::result::Result<AcquisitionHandle<T>, (T, crate::error::Error)>
    where
        T: Transport + Send + 'static,
    {
        match AcquisitionPlan::prepare(config, routing, self.options.validation) {
            Ok(plan) => Ok(self.spawn_plan(transport, plan)),
            Err(e) => Err((transport, e)),
        }
    }

    pub fn spawn_plan<T>(self, mut transport: T, plan: AcquisitionPlan) -> AcquisitionHandle<T>
    where
        T: Transport + Send + 'static,
    {
        let control = self.control();
        let thread = thread::spawn(move || {
            let result = self.execute(&mut transport, &plan);
            (transport, result)
        });
        AcquisitionHandle { control, thread }
    }
}

/// A run executing on its own thread.
pub struct AcquisitionHandle<T> {
    control: AcquisitionControl,
    thread: JoinHandle<(T, Result<AcquisitionResult>)>,
}

impl<T> AcquisitionHandle<T> {
    pub fn control(&self) -> &AcquisitionControl {
        &self.control
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the run and returns the transport together with its outcome.
    ///
    /// Returns `None` if the acquisition thread panicked.
    pub fn join(self) -> Option<(T, Result<AcquisitionResult>)> {
        self.thread.join().ok()
    }
}
