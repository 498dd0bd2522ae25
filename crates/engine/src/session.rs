//! Interactive segmentation session
//!
//! State machine over stroke events:
//!
//! ```text
//! Idle --StrokeStart--> Painting --StrokeEnd--> Segmenting --poll--> Idle
//!                          ^                        |
//!                          +------StrokeStart-------+
//! ```
//!
//! A storage failure while allocating the marker buffer moves the session
//! to `Aborted`, where every further stroke is ignored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use voxseg_core::{Error, Result, Volume, VoxelElement};

use crate::brush::{apply_stroke, resolve_label, Footprint};
use crate::compositor::{CommitSummary, MaskCompositor, PaddedMask};
use crate::config::{config_channel, ConfigHandle, ConfigReceiver, SessionConfig};
use crate::features::FeatureCache;
use crate::host::{StrokeEvent, StrokePoint};
use crate::markers::{MarkerBuffer, MarkerLabel};
use crate::strategy::{SegmentOutcome, SegmentScope};
use crate::worker::{JobResult, SegmentJob, SegmentationWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Painting,
    Segmenting,
    Aborted,
}

/// How a segmentation run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    Committed(CommitSummary),
    /// Not enough markers; mask untouched
    NotReady(String),
    /// The strategy failed (e.g. degenerate training set); mask untouched
    Declined(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub job: u64,
    pub status: CommitStatus,
    pub elapsed: Duration,
}

impl SegmentReport {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, CommitStatus::Committed(_))
    }
}

pub struct Session<T: VoxelElement> {
    volume: Arc<Volume<T>>,
    config: SessionConfig,
    updates: ConfigReceiver,
    markers: Option<MarkerBuffer>,
    compositor: MaskCompositor,
    cache: Arc<FeatureCache>,
    worker: SegmentationWorker<T>,
    state: SessionState,
    stroke: Option<StrokePoint>,
    last_scope: SegmentScope,
    next_job: u64,
}

impl<T: VoxelElement> Session<T> {
    /// Start a session on `volume`; returns the host's configuration handle.
    pub fn new(
        volume: Arc<Volume<T>>,
        config: SessionConfig,
        compositor: MaskCompositor,
    ) -> Result<(Self, ConfigHandle)> {
        config.validate()?;
        let (handle, updates) = config_channel();
        let cache = Arc::new(FeatureCache::new());
        let worker = SegmentationWorker::spawn(Arc::clone(&cache))?;
        info!(shape = ?volume.shape(), algorithm = ?config.algorithm, "segmentation session started");
        let session = Self {
            volume,
            config,
            updates,
            markers: None,
            compositor,
            cache,
            worker,
            state: SessionState::Idle,
            stroke: None,
            last_scope: SegmentScope::Volume,
            next_job: 1,
        };
        Ok((session, handle))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn volume(&self) -> &Arc<Volume<T>> {
        &self.volume
    }

    /// Marker buffer, once the first stroke has allocated it
    pub fn markers(&self) -> Option<&MarkerBuffer> {
        self.markers.as_ref()
    }

    pub fn compositor_mut(&mut self) -> &mut MaskCompositor {
        &mut self.compositor
    }

    /// Id of the segmentation job whose result is awaited
    pub fn pending_job(&self) -> Option<u64> {
        self.worker.pending()
    }

    /// Swap in a new volume of the same shape; descriptors are recomputed lazily.
    pub fn set_volume(&mut self, volume: Arc<Volume<T>>) -> Result<()> {
        if volume.shape() != self.volume.shape() {
            return Err(Error::SizeMismatch { expected: self.volume.shape(), actual: volume.shape() });
        }
        self.worker.cancel();
        self.cache.invalidate();
        self.volume = volume;
        if self.state == SessionState::Segmenting {
            self.state = SessionState::Idle;
        }
        Ok(())
    }

    /// Feed one stroke event through the state machine.
    ///
    /// Only a marker storage failure is returned as an error; the session is
    /// aborted afterwards.
    pub fn handle(&mut self, event: StrokeEvent) -> Result<SessionState> {
        if self.state == SessionState::Aborted {
            debug!(?event, "session aborted, stroke ignored");
            return Ok(self.state);
        }
        self.updates.drain(&mut self.config);

        match event {
            StrokeEvent::Start { point, modifiers } => {
                let allocated = self.ensure_markers().map(|_| ());
                if let Err(e) = allocated {
                    return Err(self.abort(e));
                }
                let label = resolve_label(self.config.operation, modifiers);
                self.paint(point, label)?;
                self.stroke = Some(point);
                self.state = SessionState::Painting;
            }
            StrokeEvent::Move { point, modifiers } => {
                if self.state != SessionState::Painting {
                    debug!("move without an active stroke ignored");
                    return Ok(self.state);
                }
                let label = resolve_label(self.config.operation, modifiers);
                self.paint(point, label)?;
                self.stroke = Some(point);
            }
            StrokeEvent::End => {
                let Some(point) = self.stroke.take().filter(|_| self.state == SessionState::Painting) else {
                    debug!("release without an active stroke ignored");
                    return Ok(self.state);
                };
                self.release(point)?;
            }
        }
        Ok(self.state)
    }

    /// Commit the newest finished segmentation, if any.
    pub fn poll(&mut self, mask: &mut PaddedMask) -> Result<Option<SegmentReport>> {
        match self.worker.try_result() {
            Some(result) => self.finish(result, mask).map(Some),
            None => Ok(None),
        }
    }

    /// Block until the newest segmentation finishes (or `timeout`), then commit it.
    pub fn wait(&mut self, mask: &mut PaddedMask, timeout: Duration) -> Result<Option<SegmentReport>> {
        match self.worker.wait_result(timeout) {
            Some(result) => self.finish(result, mask).map(Some),
            None => Ok(None),
        }
    }

    /// Segment the current markers on the calling thread, using the scope
    /// of the last released stroke.
    pub fn segment_now(&mut self, mask: &mut PaddedMask) -> Result<SegmentReport> {
        self.run_sync(self.last_scope, mask)
    }

    /// Re-run the configured algorithm over the whole volume with 3D
    /// connectivity.
    pub fn expand_to_3d(&mut self, mask: &mut PaddedMask) -> Result<SegmentReport> {
        self.run_sync(SegmentScope::Volume, mask)
    }

    /// Drop foreground components of at most `max_size` voxels from `mask`.
    pub fn remove_small_regions(&mut self, mask: &mut PaddedMask, max_size: usize) -> Result<usize> {
        self.updates.drain(&mut self.config);
        self.compositor.remove_small_regions(mask, max_size, self.config.con_3d)
    }

    /// Erase every marker
    pub fn clear_markers(&mut self) {
        if let Some(markers) = self.markers.as_mut() {
            markers.clear();
        }
    }

    fn ensure_markers(&mut self) -> Result<&mut MarkerBuffer> {
        if self.markers.is_none() {
            let storage = &self.config.storage;
            let buffer = MarkerBuffer::allocate(
                self.volume.shape(),
                storage.resident_limit_bytes,
                storage.spill_dir.as_deref(),
            )?;
            self.markers = Some(buffer);
        }
        self.markers
            .as_mut()
            .ok_or_else(|| Error::Storage("marker buffer missing".to_string()))
    }

    fn abort(&mut self, e: Error) -> Error {
        error!("segmentation session aborted: {e}");
        self.worker.cancel();
        self.state = SessionState::Aborted;
        e
    }

    fn paint(&mut self, point: StrokePoint, label: MarkerLabel) -> Result<()> {
        let footprint = Footprint::new(self.config.brush_shape, self.config.brush_size)?;
        let Some(markers) = self.markers.as_mut() else {
            return Ok(());
        };
        let written = apply_stroke(markers, &footprint, point.center, point.orientation, point.slice, label)?;
        debug!(?point, ?label, written, "brush dab");
        Ok(())
    }

    fn scope_for(&self, point: StrokePoint) -> SegmentScope {
        if self.config.algorithm.is_watershed() {
            SegmentScope::Slice { orientation: point.orientation, index: point.slice }
        } else {
            SegmentScope::Volume
        }
    }

    fn release(&mut self, point: StrokePoint) -> Result<()> {
        if point.slice >= point.orientation.slice_count(self.volume.shape()) {
            debug!(?point, "release on a slice outside the volume");
            self.state = SessionState::Idle;
            return Ok(());
        }
        let Some(markers) = self.markers.as_ref() else {
            self.state = SessionState::Idle;
            return Ok(());
        };
        let snapshot = markers.snapshot()?;
        let scope = self.scope_for(point);
        self.last_scope = scope;

        let id = self.take_job_id();
        self.worker.submit(SegmentJob {
            id,
            volume: Arc::clone(&self.volume),
            markers: snapshot,
            scope,
            config: self.config.clone(),
            cancel: Default::default(),
        })?;
        debug!(job = id, ?scope, "segmentation submitted");
        self.state = SessionState::Segmenting;
        Ok(())
    }

    fn run_sync(&mut self, scope: SegmentScope, mask: &mut PaddedMask) -> Result<SegmentReport> {
        let id = self.take_job_id();
        if self.state == SessionState::Aborted {
            return Ok(SegmentReport {
                job: id,
                status: CommitStatus::Declined("session aborted".to_string()),
                elapsed: Duration::ZERO,
            });
        }
        self.updates.drain(&mut self.config);
        self.worker.cancel();

        let Some(markers) = self.markers.as_ref() else {
            return Ok(SegmentReport {
                job: id,
                status: CommitStatus::NotReady("no markers painted".to_string()),
                elapsed: Duration::ZERO,
            });
        };
        let job = SegmentJob {
            id,
            volume: Arc::clone(&self.volume),
            markers: markers.snapshot()?,
            scope,
            config: self.config.clone(),
            cancel: Default::default(),
        };
        let previous = self.state;
        self.state = SessionState::Segmenting;
        let result = job.run(&self.cache);
        self.state = if previous == SessionState::Painting { previous } else { SessionState::Idle };
        self.finish(result, mask)
    }

    fn finish(&mut self, result: JobResult, mask: &mut PaddedMask) -> Result<SegmentReport> {
        let start = Instant::now();
        let status = match result.outcome {
            Ok(SegmentOutcome::Labels(output)) => match self.compositor.commit(mask, &output, self.config.merge_mode) {
                Ok(summary) => CommitStatus::Committed(summary),
                Err(e) if e.is_fatal() => return Err(self.abort(e)),
                Err(e) => {
                    warn!(job = result.id, "commit declined: {e}");
                    CommitStatus::Declined(e.to_string())
                }
            },
            Ok(SegmentOutcome::NotReady(reason)) => {
                debug!(job = result.id, "segmentation not ready: {reason}");
                CommitStatus::NotReady(reason)
            }
            Ok(SegmentOutcome::Cancelled) => CommitStatus::Cancelled,
            Err(e) => {
                warn!(job = result.id, "segmentation declined: {e}");
                CommitStatus::Declined(e.to_string())
            }
        };
        if self.state == SessionState::Segmenting {
            self.state = SessionState::Idle;
        }
        Ok(SegmentReport { job: result.id, status, elapsed: result.elapsed + start.elapsed() })
    }

    fn take_job_id(&mut self) -> u64 {
        let id = self.next_job;
        self.next_job += 1;
        id
    }
}

impl<T: VoxelElement> Drop for Session<T> {
    fn drop(&mut self) {
        self.worker.cancel();
        self.cache.cancel_extraction();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::BrushModifiers;
    use voxseg_core::Orientation;

    fn start(slice: usize, center: (isize, isize)) -> StrokeEvent {
        StrokeEvent::Start {
            point: StrokePoint { orientation: Orientation::Axial, slice, center },
            modifiers: BrushModifiers::default(),
        }
    }

    fn session() -> Session<i16> {
        let volume = Arc::new(Volume::filled(3, 6, 6, 5));
        let config = SessionConfig { brush_size: 1, ..Default::default() };
        Session::new(volume, config, MaskCompositor::default()).unwrap().0
    }

    #[test]
    fn test_state_transitions() {
        let mut session = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.markers().is_none());
        assert_eq!(session.handle(StrokeEvent::End).unwrap(), SessionState::Idle);
        assert_eq!(session.handle(start(1, (2, 2))).unwrap(), SessionState::Painting);
        assert!(session.markers().is_some());
        assert_eq!(session.handle(StrokeEvent::End).unwrap(), SessionState::Segmenting);
        let mut mask = PaddedMask::new((3, 6, 6));
        let report = session.wait(&mut mask, Duration::from_secs(30)).unwrap().unwrap();
        assert!(matches!(report.status, CommitStatus::NotReady(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_move_without_start_is_ignored() {
        let mut session = session();
        let event = StrokeEvent::Move {
            point: StrokePoint { orientation: Orientation::Axial, slice: 0, center: (1, 1) },
            modifiers: BrushModifiers::default(),
        };
        assert_eq!(session.handle(event).unwrap(), SessionState::Idle);
        assert!(session.markers().is_none());
    }

    #[test]
    fn test_segment_now_without_markers() {
        let mut session = session();
        let mut mask = PaddedMask::new((3, 6, 6));
        let report = session.segment_now(&mut mask).unwrap();
        assert!(matches!(report.status, CommitStatus::NotReady(_)));
        assert!(!mask.is_edited());
    }

    #[test]
    fn test_set_volume_rejects_other_shape() {
        let mut session = session();
        assert!(session.set_volume(Arc::new(Volume::filled(2, 2, 2, 0))).is_err());
        assert!(session.set_volume(Arc::new(Volume::filled(3, 6, 6, 9))).is_ok());
    }

    #[test]
    fn test_commit_into_mismatched_mask_is_declined() {
        let mut session = session();
        session.handle(start(1, (1, 1))).unwrap();
        session.handle(StrokeEvent::End).unwrap();
        session
            .handle(StrokeEvent::Start {
                point: StrokePoint { orientation: Orientation::Axial, slice: 1, center: (4, 4) },
                modifiers: BrushModifiers { alternate: true, erase: false },
            })
            .unwrap();
        session.handle(StrokeEvent::End).unwrap();

        let mut wrong = PaddedMask::new((2, 2, 2));
        let report = session.segment_now(&mut wrong).unwrap();
        assert!(matches!(report.status, CommitStatus::Declined(_)), "{:?}", report.status);
        assert!(!wrong.is_edited());
        assert_ne!(session.state(), SessionState::Aborted);
    }
}
