//! Background segmentation worker
//!
//! One thread per session receives frozen marker snapshots over a
//! crossbeam channel. Submitting a job cancels the one in flight, the
//! worker skips queued jobs superseded by newer ones, and only the result
//! of the newest job is handed back.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use ndarray::Array3;
use tracing::debug;
use voxseg_core::{CancelToken, Error, Result, Volume, VoxelElement};

use crate::config::SessionConfig;
use crate::features::FeatureCache;
use crate::strategy::{run_strategy, SegmentOutcome, SegmentScope};

/// One segmentation request
pub struct SegmentJob<T: VoxelElement> {
    pub id: u64,
    pub volume: Arc<Volume<T>>,
    /// Marker buffer as it was at stroke release
    pub markers: Arc<Array3<u8>>,
    pub scope: SegmentScope,
    pub config: SessionConfig,
    pub cancel: CancelToken,
}

/// Outcome of one job
#[derive(Debug)]
pub struct JobResult {
    pub id: u64,
    pub outcome: Result<SegmentOutcome>,
    pub elapsed: Duration,
}

impl<T: VoxelElement> SegmentJob<T> {
    /// Run on the current thread with `cache`
    pub fn run(&self, cache: &FeatureCache) -> JobResult {
        let start = Instant::now();
        let outcome = if self.cancel.is_cancelled() {
            Ok(SegmentOutcome::Cancelled)
        } else {
            run_strategy(&self.volume, self.markers.view(), self.scope, &self.config, cache, &self.cancel)
        };
        JobResult { id: self.id, outcome, elapsed: start.elapsed() }
    }
}

pub struct SegmentationWorker<T: VoxelElement> {
    jobs: Option<Sender<SegmentJob<T>>>,
    results: Receiver<JobResult>,
    handle: Option<JoinHandle<()>>,
    in_flight: Option<(u64, CancelToken)>,
}

impl<T: VoxelElement> SegmentationWorker<T> {
    pub fn spawn(cache: Arc<FeatureCache>) -> Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<SegmentJob<T>>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("voxseg-worker".to_string())
            .spawn(move || worker_loop(job_rx, result_tx, cache))?;
        Ok(Self { jobs: Some(job_tx), results: result_rx, handle: Some(handle), in_flight: None })
    }

    /// Queue `job`, cancelling whatever is in flight.
    pub fn submit(&mut self, job: SegmentJob<T>) -> Result<()> {
        self.cancel();
        let entry = (job.id, job.cancel.clone());
        self.jobs
            .as_ref()
            .ok_or_else(|| Error::Other("segmentation worker stopped".to_string()))?
            .send(job)
            .map_err(|_| Error::Other("segmentation worker stopped".to_string()))?;
        self.in_flight = Some(entry);
        Ok(())
    }

    /// Cancel the in-flight job; its result will be discarded
    pub fn cancel(&mut self) {
        if let Some((id, token)) = self.in_flight.take() {
            debug!(job = id, "cancelling in-flight segmentation");
            token.cancel();
        }
    }

    /// Id of the job whose result is awaited
    pub fn pending(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|(id, _)| *id)
    }

    /// Result of the newest job if it has finished; older results are dropped.
    pub fn try_result(&mut self) -> Option<JobResult> {
        while let Ok(result) = self.results.try_recv() {
            if let Some(result) = self.accept(result) {
                return Some(result);
            }
        }
        None
    }

    /// Block until the newest job finishes or `timeout` elapses.
    pub fn wait_result(&mut self, timeout: Duration) -> Option<JobResult> {
        let deadline = Instant::now() + timeout;
        while self.in_flight.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(result) => {
                    if let Some(result) = self.accept(result) {
                        return Some(result);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
        None
    }

    fn accept(&mut self, result: JobResult) -> Option<JobResult> {
        if self.pending() == Some(result.id) {
            self.in_flight = None;
            Some(result)
        } else {
            debug!(job = result.id, "discarding superseded result");
            None
        }
    }
}

impl<T: VoxelElement> Drop for SegmentationWorker<T> {
    fn drop(&mut self) {
        self.cancel();
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop<T: VoxelElement>(jobs: Receiver<SegmentJob<T>>, results: Sender<JobResult>, cache: Arc<FeatureCache>) {
    while let Ok(mut job) = jobs.recv() {
        while let Ok(newer) = jobs.try_recv() {
            debug!(job = job.id, superseded_by = newer.id, "skipping stale job");
            job = newer;
        }
        let result = job.run(&cache);
        if results.send(result).is_err() {
            break;
        }
    }
    debug!("segmentation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentationAlgorithm;

    fn job(id: u64, volume: &Arc<Volume<i16>>, markers: Array3<u8>) -> SegmentJob<i16> {
        SegmentJob {
            id,
            volume: Arc::clone(volume),
            markers: Arc::new(markers),
            scope: SegmentScope::Volume,
            config: SessionConfig { algorithm: SegmentationAlgorithm::WatershedIft, ..Default::default() },
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn test_only_newest_result_is_returned() {
        let volume = Arc::new(Volume::<i16>::filled(4, 4, 4, 10));
        let mut worker = SegmentationWorker::spawn(Arc::new(FeatureCache::new())).unwrap();
        let mut ready = Array3::zeros((4, 4, 4));
        ready[(0, 0, 0)] = 1;
        ready[(3, 3, 3)] = 2;

        worker.submit(job(1, &volume, Array3::zeros((4, 4, 4)))).unwrap();
        worker.submit(job(2, &volume, ready)).unwrap();
        assert_eq!(worker.pending(), Some(2));

        let result = worker.wait_result(Duration::from_secs(30)).unwrap();
        assert_eq!(result.id, 2);
        assert!(matches!(result.outcome, Ok(SegmentOutcome::Labels(_))));
        assert_eq!(worker.pending(), None);
        assert!(worker.try_result().is_none());
    }

    #[test]
    fn test_cancelled_job_result_is_discarded() {
        let volume = Arc::new(Volume::<i16>::filled(2, 2, 2, 0));
        let mut worker = SegmentationWorker::spawn(Arc::new(FeatureCache::new())).unwrap();
        worker.submit(job(7, &volume, Array3::zeros((2, 2, 2)))).unwrap();
        worker.cancel();
        assert!(worker.wait_result(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn test_pre_cancelled_job_runs_nothing() {
        let volume = Arc::new(Volume::<i16>::filled(2, 2, 2, 0));
        let j = job(3, &volume, Array3::zeros((2, 2, 2)));
        j.cancel.cancel();
        let result = j.run(&FeatureCache::new());
        assert!(matches!(result.outcome, Ok(SegmentOutcome::Cancelled)));
    }
}
