//! Background threads that run ingestions off the request path.
//!
//! [`IngestionWorker::submit`] queues a job and returns an
//! [`IngestionTask`]. The task yields a bounded stream of
//! [`IngestEvent::Progress`] followed by exactly one
//! [`IngestEvent::Finished`], after which the stream is closed.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::INGEST_TARGET;
use crate::error::IngestError;
use crate::pipeline::{CancelToken, IngestOutcome, IngestionPipeline, ProgressEvent, ProgressSink};

/// Progress events buffered per task before the worker blocks.
pub const EVENT_BUFFER: usize = 32;

/// Item yielded by an [`IngestionTask`].
#[derive(Debug, Clone)]
pub enum IngestEvent {
    /// Intermediate progress.
    Progress(ProgressEvent),
    /// Terminal result; always the last event.
    Finished(Result<IngestOutcome, IngestError>),
}

struct Job {
    upload: PathBuf,
    cancel: CancelToken,
    events: SyncSender<IngestEvent>,
}

/// Pool of dedicated ingestion threads.
#[derive(Debug)]
pub struct IngestionWorker {
    jobs: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
}

impl IngestionWorker {
    /// Starts `threads` workers (at least one) sharing `pipeline`.
    ///
    /// # Errors
    ///
    /// Propagates the OS error when a thread cannot be spawned.
    pub fn spawn(pipeline: Arc<IngestionPipeline>, threads: usize) -> std::io::Result<Self> {
        let (jobs, receiver) = mpsc::channel::<Job>();
        let queue = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let shared_queue = Arc::clone(&queue);
            let shared_pipeline = Arc::clone(&pipeline);
            let handle = thread::Builder::new()
                .name(format!("quill-ingest-{index}"))
                .spawn(move || run_worker(&shared_pipeline, &shared_queue))?;
            handles.push(handle);
        }
        Ok(Self {
            jobs: Some(jobs),
            threads: handles,
        })
    }

    /// Queues an ingestion of the archive at `upload`.
    ///
    /// The caller must keep `upload` in place until the task finishes. A
    /// worker that has shut down yields a task finishing with
    /// [`IngestError::WorkerUnavailable`].
    #[must_use]
    pub fn submit(&self, upload: PathBuf) -> IngestionTask {
        let (events, receiver) = mpsc::sync_channel(EVENT_BUFFER);
        let cancel = CancelToken::new();
        let job = Job {
            upload,
            cancel: cancel.clone(),
            events,
        };
        let rejected = match &self.jobs {
            Some(jobs) => jobs.send(job).err().map(|error| error.0),
            None => Some(job),
        };
        if let Some(job) = rejected {
            let _closed = job
                .events
                .send(IngestEvent::Finished(Err(IngestError::WorkerUnavailable)));
        }
        IngestionTask {
            events: receiver,
            cancel,
            finished: false,
        }
    }

    /// Stops accepting jobs and waits for in-flight runs to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.jobs.take());
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!(target: INGEST_TARGET, "ingestion thread panicked");
            }
        }
    }
}

impl Drop for IngestionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(pipeline: &IngestionPipeline, queue: &Mutex<Receiver<Job>>) {
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(job) = next else {
            debug!(target: INGEST_TARGET, "ingestion queue closed");
            return;
        };
        let mut sink = ChannelSink {
            events: &job.events,
        };
        let result = pipeline.ingest(&job.upload, &mut sink, &job.cancel);
        if job.events.send(IngestEvent::Finished(result)).is_err() {
            debug!(
                target: INGEST_TARGET,
                upload = %job.upload.display(),
                "task dropped before completion"
            );
        }
    }
}

struct ChannelSink<'a> {
    events: &'a SyncSender<IngestEvent>,
}

impl ProgressSink for ChannelSink<'_> {
    fn report(&mut self, event: ProgressEvent) {
        // A dropped task still lets the run complete.
        let _closed = self.events.send(IngestEvent::Progress(event));
    }
}

/// Handle to one queued ingestion.
#[derive(Debug)]
pub struct IngestionTask {
    events: Receiver<IngestEvent>,
    cancel: CancelToken,
    finished: bool,
}

impl IngestionTask {
    /// Requests cooperative cancellation.
    ///
    /// The run stops at its next checkpoint; once the directory swap has
    /// begun it completes regardless.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drains the stream and returns the terminal result.
    ///
    /// # Errors
    ///
    /// Returns the run's error, or [`IngestError::WorkerUnavailable`] if the
    /// stream closed without a terminal event.
    pub fn wait(self) -> Result<IngestOutcome, IngestError> {
        for event in self {
            if let IngestEvent::Finished(result) = event {
                return result;
            }
        }
        Err(IngestError::WorkerUnavailable)
    }
}

impl Iterator for IngestionTask {
    type Item = IngestEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.events.recv() {
            Ok(event) => {
                self.finished = matches!(event, IngestEvent::Finished(_));
                Some(event)
            }
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}
