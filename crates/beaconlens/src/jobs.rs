//! Background analysis jobs over frame sequences.
//!
//! Each submitted job runs on its own worker thread against a shared
//! [`BeaconAnalyzer`] and publishes its [`JobStatus`] on a
//! `tokio::sync::watch` channel, so callers can poll, block, or await
//! progress. Cancellation is checked between frames.

use std::collections::HashMap;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbImage;
use tokio::sync::watch;

use crate::analyzer::BeaconAnalyzer;
use crate::report::AnalysisReport;
use crate::DetectionResult;

/// A finite stream of RGB frames.
pub trait FrameSource: Send + 'static {
    /// Total number of frames, when known up front.
    fn frame_count(&self) -> Option<u64>;
    /// Next frame; `None` at the end of the stream.
    fn next_frame(&mut self) -> Option<Result<RgbImage, image::ImageError>>;
}

/// In-memory frames, consumed front to back.
impl FrameSource for VecDeque<RgbImage> {
    fn frame_count(&self) -> Option<u64> {
        Some(self.len() as u64)
    }

    fn next_frame(&mut self) -> Option<Result<RgbImage, image::ImageError>> {
        self.pop_front().map(Ok)
    }
}

/// Image files decoded lazily, one per frame.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            next: 0,
        }
    }
}

impl FrameSource for ImageSequence {
    fn frame_count(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }

    fn next_frame(&mut self) -> Option<Result<RgbImage, image::ImageError>> {
        let path = self.paths.get(self.next)?;
        self.next += 1;
        tracing::trace!(path = %path.display(), "decoding frame");
        Some(image::open(path).map(|img| img.to_rgb8()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// `progress` is in `[0, 1]`; it stays 0 for sources of unknown length.
    Running { progress: f64, frames_done: u64 },
    Completed {
        frames: u64,
        report: Arc<AnalysisReport>,
    },
    Failed { message: String },
    Cancelled { frames_done: u64 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("{0} has not completed")]
    NotCompleted(JobId),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct JobHandle {
    status: watch::Receiver<JobStatus>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Owns the running and finished jobs of one analyzer.
pub struct JobRegistry {
    analyzer: Arc<BeaconAnalyzer>,
    next_id: AtomicU64,
    jobs: Mutex<HashMap<JobId, JobHandle>>,
}

impl JobRegistry {
    pub fn new(analyzer: Arc<BeaconAnalyzer>) -> Self {
        Self {
            analyzer,
            next_id: AtomicU64::new(0),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn analyzer(&self) -> &Arc<BeaconAnalyzer> {
        &self.analyzer
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobHandle>> {
        // A panicking holder cannot leave the map half-updated.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start analyzing every frame of `source` against every detection.
    pub fn submit<S: FrameSource>(
        &self,
        source: S,
        detections: Vec<DetectionResult>,
    ) -> Result<JobId, JobError> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = watch::channel(JobStatus::Running {
            progress: 0.0,
            frames_done: 0,
        });
        let cancel = Arc::new(AtomicBool::new(false));

        let worker = {
            let analyzer = Arc::clone(&self.analyzer);
            let cancel = Arc::clone(&cancel);
            std::thread::Builder::new()
                .name(format!("beaconlens-{}", id))
                .spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_job(id, &analyzer, source, &detections, &cancel, &tx)
                    }));
                    if let Err(payload) = outcome {
                        let message =
                            format!("{} worker panicked: {}", id, panic_message(&*payload));
                        tracing::error!(job = %id, %message, "job failed");
                        tx.send_replace(JobStatus::Failed { message });
                    }
                })?
        };

        tracing::info!(job = %id, "job submitted");
        self.lock().insert(
            id,
            JobHandle {
                status: rx,
                cancel,
                worker: Some(worker),
            },
        );
        Ok(id)
    }

    /// Latest published status.
    pub fn status(&self, id: JobId) -> Result<JobStatus, JobError> {
        let jobs = self.lock();
        let job = jobs.get(&id).ok_or(JobError::UnknownJob(id))?;
        let status = job.status.borrow().clone();
        Ok(status)
    }

    /// Receiver that observes every status update of the job.
    pub fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobStatus>, JobError> {
        let jobs = self.lock();
        let job = jobs.get(&id).ok_or(JobError::UnknownJob(id))?;
        Ok(job.status.clone())
    }

    /// Ask the job to stop before its next frame.
    pub fn cancel(&self, id: JobId) -> Result<(), JobError> {
        let jobs = self.lock();
        let job = jobs.get(&id).ok_or(JobError::UnknownJob(id))?;
        job.cancel.store(true, Ordering::Relaxed);
        tracing::info!(job = %id, "cancellation requested");
        Ok(())
    }

    /// Block until the job reaches a terminal status and return it.
    pub fn wait(&self, id: JobId) -> Result<JobStatus, JobError> {
        let worker = {
            let mut jobs = self.lock();
            let job = jobs.get_mut(&id).ok_or(JobError::UnknownJob(id))?;
            job.worker.take()
        };

        if let Some(worker) = worker {
            if worker.join().is_err() {
                return Ok(JobStatus::Failed {
                    message: format!("{} worker panicked", id),
                });
            }
        }

        // Another caller may be joining the worker; fall back to polling.
        loop {
            let status = self.status(id)?;
            if status.is_terminal() {
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Remove a completed job and hand back its report.
    pub fn take_result(&self, id: JobId) -> Result<AnalysisReport, JobError> {
        let mut jobs = self.lock();
        let job = jobs.get(&id).ok_or(JobError::UnknownJob(id))?;
        let report = match &*job.status.borrow() {
            JobStatus::Completed { report, .. } => Arc::clone(report),
            _ => return Err(JobError::NotCompleted(id)),
        };
        if let Some(job) = jobs.remove(&id) {
            if let Some(worker) = job.worker {
                let _ = worker.join();
            }
        }
        Ok(Arc::try_unwrap(report).unwrap_or_else(|shared| (*shared).clone()))
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        let jobs = std::mem::take(&mut *self.lock());
        for (_, job) in jobs {
            job.cancel.store(true, Ordering::Relaxed);
            if let Some(worker) = job.worker {
                let _ = worker.join();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn run_job<S: FrameSource>(
    id: JobId,
    analyzer: &BeaconAnalyzer,
    mut source: S,
    detections: &[DetectionResult],
    cancel: &AtomicBool,
    tx: &watch::Sender<JobStatus>,
) {
    let total = source.frame_count();
    let mut report = AnalysisReport::new();
    let mut frames_done = 0u64;

    let cancelled = |frames_done: u64| {
        tracing::info!(job = %id, frames_done, "job cancelled");
        tx.send_replace(JobStatus::Cancelled { frames_done });
    };
    let failed = |message: String| {
        tracing::warn!(job = %id, %message, "job failed");
        tx.send_replace(JobStatus::Failed { message });
    };

    loop {
        if cancel.load(Ordering::Relaxed) {
            return cancelled(frames_done);
        }
        let Some(frame) = source.next_frame() else {
            break;
        };
        if cancel.load(Ordering::Relaxed) {
            return cancelled(frames_done);
        }
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => return failed(format!("frame {}: {}", frames_done, err)),
        };

        for detection in detections {
            match analyzer.analyze(&frame, detection) {
                Ok(result) => report.record(&result, frames_done),
                Err(err) => return failed(format!("frame {}: {}", frames_done, err)),
            }
        }

        frames_done += 1;
        let progress = match total {
            Some(0) => 1.0,
            Some(t) => (frames_done as f64 / t as f64).min(1.0),
            None => 0.0,
        };
        tx.send_replace(JobStatus::Running {
            progress,
            frames_done,
        });
        tracing::debug!(job = %id, frames_done, progress, "frame analyzed");
    }

    tracing::info!(job = %id, frames = frames_done, "job completed");
    tx.send_replace(JobStatus::Completed {
        frames: frames_done,
        report: Arc::new(report),
    });
}
