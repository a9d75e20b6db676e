//! Resource provisioning - idempotent creation of the remote hierarchy
//!
//! Steps run strictly in order because each one's confirmed result seeds the
//! next descriptor:
//!
//! 1. collection
//! 2. coordinate frame (the service may resolve it to an existing frame)
//! 3. experiment, referencing the confirmed frame name
//! 4. precursor source channel
//! 5. destination channel, listing the source channel's confirmed name

use crate::error::{IngestError, Result};
use crate::remote::RemoteStore;
use crate::resource::{
    ChannelResource, CollectionResource, CoordinateFrameResource, ExperimentResource, Resource,
    ResourceHierarchy,
};
use crate::types::{ChannelType, DataType, VolumeGeometry};
use crate::uri::BossUri;
use tracing::{debug, info};

fn unexpected(wanted: &str, got: &Resource) -> IngestError {
    IngestError::Remote(format!("Expected a {} but the remote returned {}", wanted, got))
}

/// Ensures the collection/frame/experiment/channel hierarchy exists remotely
pub struct Provisioner<'a, R: ?Sized> {
    remote: &'a R,
}

impl<'a, R: RemoteStore + ?Sized> Provisioner<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self { remote }
    }

    /// Fetch a project, creating it only if the remote reports it missing
    ///
    /// Errors other than not-found propagate unchanged and are not retried.
    pub async fn get_or_create(&self, resource: &Resource) -> Result<Resource> {
        match self.remote.get_project(resource).await {
            Ok(existing) => {
                debug!(resource = %resource, "resource already exists");
                Ok(existing)
            }
            Err(err) if err.is_not_found() => {
                info!(resource = %resource, "creating {}", resource.name());
                self.remote.create_project(resource).await
            }
            Err(err) => Err(err),
        }
    }

    /// Derive the hierarchy for `uri` and provision it
    pub async fn provision_uri(
        &self,
        uri: &BossUri,
        geometry: &VolumeGeometry,
        data_type: DataType,
        channel_type: ChannelType,
        description: &str,
    ) -> Result<ResourceHierarchy> {
        let requested = ResourceHierarchy::derive(uri, geometry, data_type, channel_type, description);
        self.provision(&requested).await
    }

    /// Provision `requested`, returning the hierarchy as confirmed by the remote
    pub async fn provision(&self, requested: &ResourceHierarchy) -> Result<ResourceHierarchy> {
        let collection = self.collection(&requested.collection).await?;
        let coord_frame = self.coord_frame(&requested.coord_frame).await?;
        if coord_frame.name != requested.coord_frame.name {
            info!(
                requested = %requested.coord_frame.name,
                resolved = %coord_frame.name,
                "coordinate frame resolved to an existing frame"
            );
        }

        let experiment = self
            .experiment(&ExperimentResource {
                coord_frame_name: coord_frame.name.clone(),
                ..requested.experiment.clone()
            })
            .await?;

        let source_channel = self.channel(&requested.source_channel).await?;
        let channel = self
            .channel(&ChannelResource {
                source_channel_names: vec![source_channel.name.clone()],
                ..requested.channel.clone()
            })
            .await?;

        Ok(ResourceHierarchy {
            collection,
            coord_frame,
            experiment,
            source_channel,
            channel,
        })
    }

    async fn collection(&self, requested: &CollectionResource) -> Result<CollectionResource> {
        match self.get_or_create(&Resource::Collection(requested.clone())).await? {
            Resource::Collection(confirmed) => Ok(confirmed),
            other => Err(unexpected("collection", &other)),
        }
    }

    async fn coord_frame(&self, requested: &CoordinateFrameResource) -> Result<CoordinateFrameResource> {
        match self.get_or_create(&Resource::CoordinateFrame(requested.clone())).await? {
            Resource::CoordinateFrame(confirmed) => Ok(confirmed),
            other => Err(unexpected("coordinate frame", &other)),
        }
    }

    async fn experiment(&self, requested: &ExperimentResource) -> Result<ExperimentResource> {
        match self.get_or_create(&Resource::Experiment(requested.clone())).await? {
            Resource::Experiment(confirmed) => Ok(confirmed),
            other => Err(unexpected("experiment", &other)),
        }
    }

    async fn channel(&self, requested: &ChannelResource) -> Result<ChannelResource> {
        match self.get_or_create(&Resource::Channel(requested.clone())).await? {
            Resource::Channel(confirmed) => Ok(confirmed),
            other => Err(unexpected("channel", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CutoutRequest, MemoryRemote};
    use crate::resource::DEFAULT_DESCRIPTION;
    use async_trait::async_trait;

    fn geometry() -> VolumeGeometry {
        VolumeGeometry::new([40, 64, 64], [30.0, 4.0, 4.0], "nanometers").unwrap()
    }

    fn requested() -> ResourceHierarchy {
        ResourceHierarchy::derive(
            &BossUri::new("lab", "exp", "em"),
            &geometry(),
            DataType::U8,
            ChannelType::Image,
            DEFAULT_DESCRIPTION,
        )
    }

    #[tokio::test]
    async fn test_provision_creates_in_dependency_order() {
        let remote = MemoryRemote::new();
        let resolved = Provisioner::new(&remote).provision(&requested()).await.unwrap();

        assert_eq!(
            remote.created(),
            vec![
                "collection/lab",
                "coord/CF_lab_exp",
                "collection/lab/experiment/exp",
                "collection/lab/experiment/exp/channel/em",
            ]
        );
        assert_eq!(resolved.experiment.coord_frame_name, "CF_lab_exp");
        assert_eq!(resolved.channel.name, "em");
        // The precursor shares the destination's name, so step 5 finds it
        // and the confirmed channel lists no sources.
        assert_eq!(resolved.source_channel, resolved.channel);
        assert!(resolved.channel.source_channel_names.is_empty());
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let remote = MemoryRemote::new();
        let provisioner = Provisioner::new(&remote);

        let first = provisioner.provision(&requested()).await.unwrap();
        let calls = remote.create_calls().len();
        let second = provisioner.provision(&requested()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(remote.create_calls().len(), calls);
    }

    #[tokio::test]
    async fn test_provision_with_shared_frame_is_idempotent() {
        let remote = MemoryRemote::new();
        remote.insert_project(Resource::CoordinateFrame(CoordinateFrameResource::from_geometry(
            "CF_shared",
            "",
            &geometry(),
        )));
        let provisioner = Provisioner::new(&remote);

        let first = provisioner.provision(&requested()).await.unwrap();
        let calls = remote.create_calls();
        assert!(!calls.contains(&"coord/CF_lab_exp".to_string()));

        let second = provisioner.provision(&requested()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(remote.create_calls(), calls);
        assert_eq!(second.experiment.coord_frame_name, "CF_shared");
    }

    #[tokio::test]
    async fn test_resolved_frame_name_propagates_to_experiment() {
        let remote = MemoryRemote::new();
        remote.insert_project(Resource::CoordinateFrame(CoordinateFrameResource::from_geometry(
            "CF_shared",
            "",
            &geometry(),
        )));

        let resolved = Provisioner::new(&remote).provision(&requested()).await.unwrap();
        assert_eq!(resolved.coord_frame.name, "CF_shared");
        assert_eq!(resolved.experiment.coord_frame_name, "CF_shared");
        assert!(!remote.created().contains(&"coord/CF_lab_exp".to_string()));
    }

    struct Unavailable;

    #[async_trait]
    impl RemoteStore for Unavailable {
        async fn get_project(&self, _resource: &Resource) -> Result<Resource> {
            Err(IngestError::Remote("HTTP 500".into()))
        }

        async fn create_project(&self, _resource: &Resource) -> Result<Resource> {
            panic!("create must not be called when get fails with a non-404 error");
        }

        async fn write_cutout(&self, _request: &CutoutRequest) -> Result<()> {
            unreachable!()
        }

        async fn channel_exists(&self, _uri: &BossUri) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_non_not_found_error_propagates() {
        let err = Provisioner::new(&Unavailable)
            .provision(&requested())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Remote(msg) if msg == "HTTP 500"));
    }
}
