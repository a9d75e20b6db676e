//! Upload sessions: validate, check the destination, provision, then transfer

use crate::config::UploadConfig;
use crate::error::{IngestError, Result};
use crate::provision::Provisioner;
use crate::remote::RemoteStore;
use crate::resource::ResourceHierarchy;
use crate::source::{
    CoercedSource, FileSequenceSource, ImageSliceDecoder, InMemorySource, SliceDecoder,
    SliceSequence, VolumeSource,
};
use crate::types::{dispatch_voxel, VolumeGeometry, Voxel};
use crate::upload::{ChunkedUploader, NoProgress, ProgressSink, UploadStats};
use crate::uri::BossUri;
use chrono::{DateTime, Utc};
use ndarray::Array3;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// How a session ended, when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Every slab was written
    Completed(UploadReport),
    /// The channel already exists and overwrite was not requested; nothing was touched
    DestinationPopulated(BossUri),
}

impl SessionOutcome {
    pub fn report(&self) -> Option<&UploadReport> {
        match self {
            SessionOutcome::Completed(report) => Some(report),
            SessionOutcome::DestinationPopulated(_) => None,
        }
    }
}

/// Summary of a completed upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub session_id: Uuid,
    pub uri: BossUri,
    pub hierarchy: ResourceHierarchy,
    pub geometry: VolumeGeometry,
    pub stats: UploadStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UploadReport {
    pub fn neuroglancer_url(&self) -> String {
        self.uri.neuroglancer_url()
    }
}

/// One upload of one volume into one channel
pub struct UploadSession<R: ?Sized> {
    remote: Arc<R>,
    config: UploadConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl<R: RemoteStore + ?Sized> UploadSession<R> {
    pub fn new(remote: Arc<R>, config: UploadConfig) -> Self {
        Self {
            remote,
            config,
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

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Token that aborts the session between slabs when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Upload a volume held in memory
    ///
    /// When the config names a `dtype` different from `T`, slabs are cast as
    /// they are uploaded.
    pub async fn upload_array<T: Voxel>(&self, data: Array3<T>) -> Result<SessionOutcome> {
        self.config.validate()?;
        let source = InMemorySource::new(data);

        match self.config.dtype {
            Some(dtype) if dtype != T::DATA_TYPE => {
                dispatch_voxel!(dtype, V => self.run(CoercedSource::<_, V>::new(source)).await)
            }
            _ => self.run(source).await,
        }
    }

    /// Upload the slice files in the configured `data_dir`
    pub async fn upload_directory(&self) -> Result<SessionOutcome> {
        self.upload_directory_with(ImageSliceDecoder).await
    }

    /// Upload the slice files in the configured `data_dir` with a custom decoder
    pub async fn upload_directory_with<D: SliceDecoder>(&self, decoder: D) -> Result<SessionOutcome> {
        self.config.validate()?;
        let dir = self
            .config
            .data_dir
            .as_deref()
            .ok_or_else(|| IngestError::Configuration("data_dir is required".to_string()))?;

        let sequence = SliceSequence::discover(dir, &self.config.data_extension, &decoder)?;
        let data_type = self.config.dtype.unwrap_or_else(|| sequence.natural_data_type());
        dispatch_voxel!(data_type, V => {
            self.run(FileSequenceSource::<V, D>::new(sequence, decoder)).await
        })
    }

    async fn run<S: VolumeSource>(&self, source: S) -> Result<SessionOutcome> {
        let uri = self.config.parsed_uri()?;
        let shape = source.shape();
        if let Some(expected) = self.config.shape {
            if expected != shape {
                return Err(IngestError::InvalidGeometry(format!(
                    "Configured shape {:?} does not match source shape {:?}",
                    expected, shape
                )));
            }
        }
        let geometry = VolumeGeometry::new(shape, self.config.voxel_size, &self.config.voxel_unit)?;

        let session_id = Uuid::new_v4();
        let span = info_span!("upload_session", session = %session_id, uri = %uri);
        self.transfer(session_id, uri, geometry, &source)
            .instrument(span)
            .await
    }

    async fn transfer<S: VolumeSource>(
        &self,
        session_id: Uuid,
        uri: BossUri,
        geometry: VolumeGeometry,
        source: &S,
    ) -> Result<SessionOutcome> {
        if !self.config.overwrite && self.remote.channel_exists(&uri).await? {
            warn!("dataset already exists at {uri}; set overwrite to true to replace it");
            return Ok(SessionOutcome::DestinationPopulated(uri));
        }

        let started_at = Utc::now();
        let data_type = <S::Elem as Voxel>::DATA_TYPE;
        info!(geometry = %geometry.summary(), data_type = %data_type, "starting upload");

        let hierarchy = Provisioner::new(self.remote.as_ref())
            .provision_uri(
                &uri,
                &geometry,
                data_type,
                self.config.channel_type,
                &self.config.description,
            )
            .await?;

        let stats = ChunkedUploader::new(self.remote.as_ref(), self.config.upload_options())
            .with_progress(Arc::clone(&self.progress))
            .with_cancellation(self.cancel.clone())
            .upload(&hierarchy, &geometry, source)
            .await?;

        info!(
            slabs = stats.slabs_written,
            retries = stats.retries,
            voxels = stats.voxels_written,
            "upload complete"
        );

        Ok(SessionOutcome::Completed(UploadReport {
            session_id,
            uri,
            hierarchy,
            geometry,
            stats,
            started_at,
            finished_at: Utc::now(),
        }))
    }
}
