//! Chunked upload of a volume into a provisioned channel
//!
//! The volume is walked in ascending depth order, one slab at a time. Each
//! slab is normalized to row-major layout, encoded once, and written with a
//! bounded per-slab retry budget. Exhausting the budget aborts the upload;
//! slabs already written are left in place.

use crate::error::{IngestError, Result};
use crate::layout::{SlabRange, TransferPlan, DEFAULT_UPLOAD_INCREMENT};
use crate::remote::{CutoutRequest, RemoteStore};
use crate::resource::ResourceHierarchy;
use crate::source::VolumeSource;
use crate::types::{VolumeGeometry, Voxel};
use bytes::{Bytes, BytesMut};
use ndarray::{ArrayBase, CowArray, Data, Ix3};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Default number of retries per slab
pub const DEFAULT_RETRY_MAX: u32 = 3;

/// Default pause between write attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Receives `(completed, total)` after every slab
pub trait ProgressSink: Send + Sync {
    fn on_slab(&self, completed: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_slab(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Progress sink that discards updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_slab(&self, _completed: usize, _total: usize) {}
}

/// Progress sink that emits a tracing event per slab
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_slab(&self, completed: usize, total: usize) {
        info!(completed, total, "slab uploaded");
    }
}

/// Per-slab write retry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to make the given attempt (1-based)
    Attempting(u32),
    /// Write landed after the given number of attempts
    Succeeded(u32),
    /// Every allowed attempt failed; holds the number of attempts made
    FailedExhausted(u32),
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting(1)
    }

    /// Advance after an attempt; at most `retry_max + 1` attempts are allowed
    pub fn advance(self, succeeded: bool, retry_max: u32) -> Self {
        match self {
            RetryState::Attempting(attempt) if succeeded => RetryState::Succeeded(attempt),
            RetryState::Attempting(attempt) if attempt > retry_max => {
                RetryState::FailedExhausted(attempt)
            }
            RetryState::Attempting(attempt) => RetryState::Attempting(attempt + 1),
            done => done,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetryState::Attempting(_))
    }
}

/// Tunables for a chunked upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Depth slices per slab
    pub increment: usize,
    /// Retries allowed per slab after the first attempt
    pub retry_max: u32,
    /// Pause before each retry
    pub retry_delay: Duration,
    /// Resolution level written to
    pub resolution: u32,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            increment: DEFAULT_UPLOAD_INCREMENT,
            retry_max: DEFAULT_RETRY_MAX,
            retry_delay: DEFAULT_RETRY_DELAY,
            resolution: 0,
        }
    }
}

/// Totals for a finished upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub slabs_written: usize,
    /// Failed write attempts that were retried successfully
    pub retries: u32,
    pub voxels_written: usize,
    pub bytes_written: usize,
}

/// Return `slab` in standard (row-major, contiguous) layout
///
/// Already-contiguous slabs pass through untouched; anything else is copied.
pub fn normalize_layout<A: Clone>(slab: CowArray<'_, A, Ix3>) -> CowArray<'_, A, Ix3> {
    if slab.is_standard_layout() {
        slab
    } else {
        slab.as_standard_layout().into_owned().into()
    }
}

/// Encode a contiguous slab as little-endian bytes
pub fn encode_slab<T, S>(slab: &ArrayBase<S, Ix3>) -> Result<Bytes>
where
    T: Voxel,
    S: Data<Elem = T>,
{
    let values = slab.as_slice().ok_or_else(|| {
        IngestError::InvalidGeometry("Slab is not in contiguous row-major layout".to_string())
    })?;

    let mut buf = BytesMut::with_capacity(values.len() * T::DATA_TYPE.size_in_bytes());
    for &v in values {
        v.put_le(&mut buf);
    }
    Ok(buf.freeze())
}

/// Drives slab-by-slab transfer into a remote channel
pub struct ChunkedUploader<'a, R: ?Sized> {
    remote: &'a R,
    options: UploadOptions,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl<'a, R: RemoteStore + ?Sized> ChunkedUploader<'a, R> {
    pub fn new(remote: &'a R, options: UploadOptions) -> Self {
        Self {
            remote,
            options,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Upload every slab of `source` into the hierarchy's channel
    pub async fn upload<S: VolumeSource>(
        &self,
        hierarchy: &ResourceHierarchy,
        geometry: &VolumeGeometry,
        source: &S,
    ) -> Result<UploadStats> {
        if source.shape() != geometry.shape() {
            return Err(IngestError::InvalidGeometry(format!(
                "Source shape {:?} does not match geometry {:?}",
                source.shape(),
                geometry.shape()
            )));
        }

        let data_type = <S::Elem as Voxel>::DATA_TYPE;
        if data_type != hierarchy.channel.data_type {
            return Err(IngestError::DataTypeMismatch {
                expected: hierarchy.channel.data_type.to_string(),
                actual: data_type.to_string(),
            });
        }

        let plan = TransferPlan::new(geometry.depth(), self.options.increment)?;
        let uri = hierarchy.uri();
        let total = plan.len();
        let mut stats = UploadStats::default();

        for range in plan.slabs() {
            if self.cancel.is_cancelled() {
                return Err(IngestError::Cancelled(range.z_start));
            }

            let request = {
                let slab = source
                    .read_slab(range.range())
                    .map_err(|e| IngestError::SlabRead {
                        z_start: range.z_start,
                        z_end: range.z_end,
                        source: Box::new(e),
                    })?;
                let (depth, height, width) = slab.dim();
                if depth != range.depth() || [height, width] != [geometry.height(), geometry.width()] {
                    return Err(IngestError::SlabRead {
                        z_start: range.z_start,
                        z_end: range.z_end,
                        source: Box::new(IngestError::InvalidGeometry(format!(
                            "Source returned slab of shape {:?}",
                            slab.dim()
                        ))),
                    });
                }

                let slab = normalize_layout(slab);
                CutoutRequest {
                    uri: uri.clone(),
                    resolution: self.options.resolution,
                    z: range.z_start..range.z_start + depth,
                    y: 0..height,
                    x: 0..width,
                    data_type,
                    data: encode_slab(&slab)?,
                }
            };

            let attempts = self.write_with_retry(&request, range).await?;
            stats.slabs_written += 1;
            stats.retries += attempts - 1;
            stats.voxels_written += request.voxel_count();
            stats.bytes_written += request.data.len();

            self.progress.on_slab(range.index + 1, total);
        }

        Ok(stats)
    }

    /// Write one encoded slab, returning the number of attempts it took
    async fn write_with_retry(&self, request: &CutoutRequest, range: SlabRange) -> Result<u32> {
        let retry_max = self.options.retry_max;
        let mut state = RetryState::start();
        let mut last_error = None;

        loop {
            match state {
                RetryState::Attempting(attempt) => {
                    if attempt > 1 {
                        info!(
                            z_start = range.z_start,
                            attempt = attempt - 1,
                            retry_max,
                            "retrying slab"
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                return Err(IngestError::Cancelled(range.z_start));
                            }
                            _ = tokio::time::sleep(self.options.retry_delay) => {}
                        }
                    }

                    let outcome = self.remote.write_cutout(request).await;
                    state = state.advance(outcome.is_ok(), retry_max);
                    if let Err(err) = outcome {
                        error!(
                            z_start = range.z_start,
                            z_end = range.z_end,
                            attempt,
                            "error uploading slab: {err}"
                        );
                        last_error = Some(err);
                    }
                }
                RetryState::Succeeded(attempts) => {
                    debug!(z_start = range.z_start, z_end = range.z_end, attempts, "slab written");
                    return Ok(attempts);
                }
                RetryState::FailedExhausted(attempts) => {
                    let source = last_error.take().unwrap_or_else(|| {
                        IngestError::Remote("write failed without an error".to_string())
                    });
                    return Err(IngestError::SlabWrite {
                        z_start: range.z_start,
                        z_end: range.z_end,
                        attempts,
                        source: Box::new(source),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, DEFAULT_DESCRIPTION};
    use crate::source::InMemorySource;
    use crate::types::{ChannelType, DataType};
    use crate::uri::BossUri;
    use async_trait::async_trait;
    use ndarray::Array3;
    use parking_lot::Mutex;

    /// Fails writes at one depth and cancels the session on the first failure
    struct CancelOnFailure {
        fail_z_start: usize,
        cancel: CancellationToken,
        attempts: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl RemoteStore for CancelOnFailure {
        async fn get_project(&self, resource: &Resource) -> Result<Resource> {
            Ok(resource.clone())
        }

        async fn create_project(&self, resource: &Resource) -> Result<Resource> {
            Ok(resource.clone())
        }

        async fn write_cutout(&self, request: &CutoutRequest) -> Result<()> {
            self.attempts.lock().push(request.z.start);
            if request.z.start == self.fail_z_start {
                self.cancel.cancel();
                return Err(IngestError::Remote("HTTP 503".into()));
            }
            Ok(())
        }

        async fn channel_exists(&self, _uri: &BossUri) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let cancel = CancellationToken::new();
        let remote = CancelOnFailure {
            fail_z_start: 2,
            cancel: cancel.clone(),
            attempts: Mutex::new(Vec::new()),
        };
        let geometry = VolumeGeometry::new([6, 2, 2], [1.0, 1.0, 1.0], "nanometers").unwrap();
        let hierarchy = ResourceHierarchy::derive(
            &BossUri::new("lab", "exp", "em"),
            &geometry,
            DataType::U8,
            ChannelType::Image,
            DEFAULT_DESCRIPTION,
        );
        let options = UploadOptions {
            increment: 2,
            retry_delay: Duration::from_secs(3600),
            ..UploadOptions::default()
        };

        let err = ChunkedUploader::new(&remote, options)
            .with_cancellation(cancel)
            .upload(&hierarchy, &geometry, &InMemorySource::new(Array3::<u8>::zeros((6, 2, 2))))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Cancelled(2)));
        assert_eq!(*remote.attempts.lock(), vec![0, 2]);
    }

    #[test]
    fn test_retry_state_exhausts_after_retry_max_plus_one() {
        let mut state = RetryState::start();
        let mut attempts = 0;
        while !state.is_terminal() {
            attempts += 1;
            state = state.advance(false, 3);
        }
        assert_eq!(attempts, 4);
        assert_eq!(state, RetryState::FailedExhausted(4));
    }

    #[test]
    fn test_retry_state_recovers() {
        let state = RetryState::start()
            .advance(false, 3)
            .advance(false, 3)
            .advance(true, 3);
        assert_eq!(state, RetryState::Succeeded(3));
        assert_eq!(state.advance(false, 3), RetryState::Succeeded(3));
    }

    #[test]
    fn test_retry_state_zero_budget() {
        assert_eq!(RetryState::start().advance(false, 0), RetryState::FailedExhausted(1));
        assert_eq!(RetryState::start().advance(true, 0), RetryState::Succeeded(1));
    }

    #[test]
    fn test_normalize_layout_preserves_contents() {
        let base = Array3::from_shape_fn((3, 4, 5), |(z, y, x)| (z * 100 + y * 10 + x) as u16);
        let transposed = base.clone().permuted_axes([2, 1, 0]);
        assert!(!transposed.is_standard_layout());

        let normalized = normalize_layout(CowArray::from(transposed.view()));
        assert!(normalized.is_standard_layout());
        assert_eq!(normalized, transposed);

        let contiguous = normalize_layout(CowArray::from(base.view()));
        assert!(contiguous.is_view());
    }

    #[test]
    fn test_encode_slab() {
        let slab = Array3::from_shape_vec((1, 1, 2), vec![1u16, 0x0203]).unwrap();
        let bytes = encode_slab(&slab).unwrap();
        assert_eq!(&bytes[..], &[1, 0, 3, 2]);

        let base = Array3::<u8>::zeros((2, 3, 4));
        assert!(encode_slab(&base.view().permuted_axes([2, 1, 0])).is_err());
    }
}
