//! Isolation channel between a caller and an execution host.
//!
//! Each [`IsolationUnit`] is a dedicated thread owning its own engine
//! context. The protocol is one-shot: one job goes in, an ordered stream of
//! records comes out, and the unit is done. There is no acknowledgement and
//! no backpressure; the stream is unbounded.

use common::{FaultOrigin, Job, OutputRecord, SandboxError, SandboxResult, StructuredValue, ValueKind};
use futures::Stream;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

use crate::config::SandboxConfig;
use crate::engine::ExecutionHost;
use crate::sink::{ChannelSink, RecordSink};

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// A spawned, idle isolation unit waiting for its job.
pub struct IsolationUnit {
    id: u64,
    job_tx: oneshot::Sender<Job>,
    stream: RecordStream,
}

impl IsolationUnit {
    /// Spawn the isolation thread. It blocks until a job is posted and exits
    /// quietly if the unit is dropped first.
    pub fn spawn(config: &SandboxConfig) -> SandboxResult<Self> {
        let id = NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed);
        let (job_tx, job_rx) = oneshot::channel();
        let (record_tx, record_rx) = mpsc::unbounded_channel();
        let terminated = Arc::new(AtomicBool::new(false));

        let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
        if let Some(stack_size) = config.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        let sink = ChannelSink::new(record_tx, terminated.clone());
        let worker_config = config.clone();
        let worker = builder
            .spawn(move || worker_main(id, worker_config, job_rx, sink))
            .map_err(|err| SandboxError::channel(format!("failed to spawn isolation unit: {}", err)))?;

        tracing::debug!("Spawned isolation unit {}", id);

        Ok(Self {
            id,
            job_tx,
            stream: RecordStream {
                records: record_rx,
                terminated,
                worker: Some(worker),
            },
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Post the job and hand back the record stream.
    pub fn post(self, job: Job) -> SandboxResult<RecordStream> {
        self.job_tx
            .send(job)
            .map_err(|_| SandboxError::channel(format!("isolation unit {} exited before receiving its job", self.id)))?;
        Ok(self.stream)
    }
}

fn worker_main(id: u64, config: SandboxConfig, job_rx: oneshot::Receiver<Job>, sink: ChannelSink) {
    let job = match job_rx.blocking_recv() {
        Ok(job) => job,
        Err(_) => {
            tracing::debug!("Isolation unit {} dropped before a job was posted", id);
            return;
        }
    };

    let sink: Rc<dyn RecordSink> = Rc::new(sink);
    let mut host = ExecutionHost::new(config, sink.clone());

    match panic::catch_unwind(AssertUnwindSafe(|| host.run(&job))) {
        Ok(Ok(state)) => tracing::debug!("Isolation unit {} finished: {:?}", id, state),
        Ok(Err(err)) => sink.emit(synthetic_fault(FaultOrigin::HostSetup, &err)),
        Err(_) => {
            tracing::warn!("Isolation unit {} panicked", id);
            let err = SandboxError::internal("execution host panicked");
            sink.emit(synthetic_fault(FaultOrigin::HostSetup, &err));
        }
    }
}

/// Error record for failures the execution host cannot report itself.
pub fn synthetic_fault(origin: FaultOrigin, err: &SandboxError) -> OutputRecord {
    let error = StructuredValue::new(ValueKind::Error, format!("{}: {}", err.name(), err.detail()));
    OutputRecord::fault(origin, error, None)
}

/// Ordered records coming back from one unit.
///
/// The stream ends when the unit finishes or after [`RecordStream::terminate`].
pub struct RecordStream {
    records: mpsc::UnboundedReceiver<OutputRecord>,
    terminated: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl RecordStream {
    /// A stream that yields the given records and ends.
    pub fn from_records(records: Vec<OutputRecord>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for record in records {
            let _ = tx.send(record);
        }
        Self {
            records: rx,
            terminated: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Next record, or `None` once the unit is finished or terminated.
    pub async fn recv(&mut self) -> Option<OutputRecord> {
        if self.is_terminated() {
            return None;
        }
        self.records.recv().await
    }

    /// Blocking variant of [`RecordStream::recv`]. Must not be called from
    /// inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<OutputRecord> {
        if self.is_terminated() {
            return None;
        }
        self.records.blocking_recv()
    }

    /// Discard the unit. Records not yet received are dropped and nothing
    /// further is delivered. Code that is still running keeps its thread
    /// until it returns or trips an engine limit; a configured timeout always
    /// installs one (see [`SandboxConfig::effective_loop_iteration_limit`]).
    pub fn terminate(&mut self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.records.close();
        if let Some(worker) = self.worker.as_ref() {
            tracing::debug!("Terminating isolation unit (finished: {})", worker.is_finished());
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Whether the isolation thread has exited. Always true for streams
    /// built with [`RecordStream::from_records`].
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |worker| worker.is_finished())
    }

    /// Receive everything until the unit finishes.
    pub async fn collect_all(mut self) -> Vec<OutputRecord> {
        let mut records = Vec::new();
        while let Some(record) = self.recv().await {
            records.push(record);
        }
        records
    }
}

impl Stream for RecordStream {
    type Item = OutputRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        if self.is_terminated() {
            return Poll::Ready(None);
        }
        self.records.poll_recv(cx)
    }
}

/// Caller-side entry point: one fresh isolation unit per job.
#[derive(Clone, Debug, Default)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Start a job. Channel failures are reported in-band as a stream holding
    /// one synthetic error record.
    pub fn execute(&self, job: impl Into<Job>) -> RecordStream {
        let job = job.into();
        match IsolationUnit::spawn(&self.config).and_then(|unit| unit.post(job)) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("Isolation channel failure: {}", err);
                RecordStream::from_records(vec![synthetic_fault(FaultOrigin::Channel, &err)])
            }
        }
    }

    /// Run a job and collect its records, honoring the configured timeout.
    ///
    /// On timeout the unit is terminated and a `TimeoutError` record is
    /// appended after whatever had been delivered.
    pub async fn run(&self, job: impl Into<Job>) -> Vec<OutputRecord> {
        let mut stream = self.execute(job);

        let Some(limit) = self.config.timeout else {
            return stream.collect_all().await;
        };

        let deadline = tokio::time::Instant::now() + limit;
        let mut records = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, stream.recv()).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(_) => {
                    stream.terminate();
                    let err = SandboxError::timeout(format!(
                        "execution exceeded {}ms and was terminated",
                        limit.as_millis()
                    ));
                    tracing::warn!("{}", err);
                    records.push(synthetic_fault(FaultOrigin::Timeout, &err));
                    break;
                }
            }
        }
        records
    }
}
