//! Threads and channels that drive the pipeline
//!
//! One ingestion loop receives payloads from the collector thread, ingests
//! them, and fires due cadences. Outbreak analysis runs inline; model updates
//! go to a dedicated worker thread so fitting never stalls ingestion. A model
//! update that falls due while the previous one is still running is skipped.

use crate::collectors::{PayloadSource, SourceCollector};
use crate::config::Config;
use crate::error::SourceError;
use crate::pipeline::Pipeline;
use crate::scheduler::{Activity, Scheduler};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Messages received by the ingestion loop
#[derive(Debug)]
pub enum LoopMessage {
    Payload(Vec<u8>),
    /// The payload source is exhausted or failed
    EndOfStream,
    /// Stop as soon as possible (SIGINT)
    Shutdown,
}

/// Messages received by the model worker
#[derive(Debug)]
enum WorkerMessage {
    ModelUpdate,
    Shutdown,
}

/// Why [`Runtime::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Shutdown,
}

/// Clears the in-flight flag when a model update ends, even by panic
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Runtime {
    pipeline: Arc<Pipeline>,
    scheduler: Scheduler,
    sender: Sender<LoopMessage>,
    receiver: Receiver<LoopMessage>,
    worker_sender: Option<Sender<WorkerMessage>>,
    worker_handle: Option<JoinHandle<()>>,
    model_update_in_flight: Arc<AtomicBool>,
}

impl Runtime {
    pub fn new(config: &Config, pipeline: Arc<Pipeline>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            pipeline,
            scheduler: Scheduler::from_config(&config.schedule, Instant::now()),
            sender,
            receiver,
            worker_sender: None,
            worker_handle: None,
            model_update_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sender that can stop the ingestion loop from another thread or a signal handler
    pub fn shutdown_handle(&self) -> Sender<LoopMessage> {
        self.sender.clone()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Consume `source` until it ends or a shutdown message arrives
    ///
    /// When the source ends on its own, a final model update and outbreak
    /// analysis run before returning so that finite inputs still produce
    /// predictions and alerts.
    ///
    /// # Errors
    ///
    /// `SourceError::IoError` if a thread cannot be spawned.
    pub fn run(&mut self, source: Box<dyn PayloadSource>) -> Result<StopReason, SourceError> {
        info!("Starting outbreak watch runtime");

        self.spawn_model_worker()?;
        let mut collector = SourceCollector::new(source, self.sender.clone());
        if let Err(e) = collector.start() {
            self.stop_model_worker();
            return Err(e);
        }

        let reason = self.ingestion_loop();

        collector.stop();
        self.stop_model_worker();

        if reason == StopReason::EndOfStream {
            info!("Running final model update and outbreak analysis");
            self.pipeline.run_model_update();
            self.pipeline.run_outbreak_analysis();
        }

        self.pipeline.monitor().log_summary();
        info!("Outbreak watch runtime stopped ({:?})", reason);
        Ok(reason)
    }

    fn ingestion_loop(&mut self) -> StopReason {
        info!("Ingestion loop started");

        loop {
            for activity in self.scheduler.due(Instant::now()) {
                match activity {
                    Activity::OutbreakAnalysis => {
                        self.pipeline.run_outbreak_analysis();
                    }
                    Activity::ModelUpdate => self.dispatch_model_update(),
                }
            }

            let wait = self.scheduler.time_until_next(Instant::now());
            match self.receiver.recv_timeout(wait) {
                Ok(LoopMessage::Payload(payload)) => {
                    // Rejected payloads are logged and counted by the pipeline
                    let _ = self.pipeline.process_payload(&payload);
                }
                Ok(LoopMessage::EndOfStream) => {
                    info!("Payload stream ended");
                    return StopReason::EndOfStream;
                }
                Ok(LoopMessage::Shutdown) => {
                    info!("Ingestion loop received shutdown signal");
                    return StopReason::Shutdown;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Ingestion channel disconnected");
                    return StopReason::Shutdown;
                }
            }
        }
    }

    fn dispatch_model_update(&self) {
        if self.model_update_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Model update still running, skipping this cycle");
            self.pipeline.monitor().record_model_cycle_skipped();
            return;
        }

        let sent = self
            .worker_sender
            .as_ref()
            .map(|sender| sender.send(WorkerMessage::ModelUpdate).is_ok())
            .unwrap_or(false);
        if !sent {
            error!("Model worker is not running, dropping model update");
            self.model_update_in_flight.store(false, Ordering::SeqCst);
        }
    }

    fn spawn_model_worker(&mut self) -> Result<(), SourceError> {
        let (sender, receiver) = mpsc::channel::<WorkerMessage>();
        let pipeline = Arc::clone(&self.pipeline);
        let in_flight = Arc::clone(&self.model_update_in_flight);

        let handle = thread::Builder::new()
            .name("model-worker".to_string())
            .spawn(move || {
                info!("Model worker started");
                while let Ok(message) = receiver.recv() {
                    match message {
                        WorkerMessage::ModelUpdate => {
                            let _in_flight = InFlight(Arc::clone(&in_flight));
                            let summary = pipeline.run_model_update();
                            debug!(
                                "Model update: appended {}, training set {}, predictions {}",
                                summary.appended, summary.training_set_size, summary.predictions
                            );
                        }
                        WorkerMessage::Shutdown => break,
                    }
                }
                info!("Model worker stopped");
            })?;

        self.worker_sender = Some(sender);
        self.worker_handle = Some(handle);
        Ok(())
    }

    /// Let the worker finish its in-flight cycle, then join it
    fn stop_model_worker(&mut self) {
        if let Some(sender) = self.worker_sender.take() {
            if let Err(e) = sender.send(WorkerMessage::Shutdown) {
                debug!("Model worker already gone: {}", e);
            }
        }
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                error!("Model worker panicked");
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop_model_worker();
    }
}
