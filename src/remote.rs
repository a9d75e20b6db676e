//! Remote store client interface and an in-process implementation

use crate::error::{IngestError, Result};
use crate::resource::Resource;
use crate::types::DataType;
use crate::uri::BossUri;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Range;

/// A single rectangular write into a channel
#[derive(Debug, Clone, PartialEq)]
pub struct CutoutRequest {
    pub uri: BossUri,
    pub resolution: u32,
    pub z: Range<usize>,
    pub y: Range<usize>,
    pub x: Range<usize>,
    pub data_type: DataType,
    /// Row-major (ZYX) little-endian voxel data
    pub data: Bytes,
}

impl CutoutRequest {
    /// Number of voxels addressed by the z/y/x ranges
    pub fn voxel_count(&self) -> usize {
        self.z.len() * self.y.len() * self.x.len()
    }
}

/// Operations consumed from the remote store
///
/// Implement this for a concrete service client. `get_project` must report a
/// missing project as [`IngestError::NotFound`]; any other error is treated as
/// fatal by provisioning.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch an existing project matching the descriptor's identity
    async fn get_project(&self, resource: &Resource) -> Result<Resource>;

    /// Create a project, returning what the service actually stored
    async fn create_project(&self, resource: &Resource) -> Result<Resource>;

    /// Write a cutout to a channel
    async fn write_cutout(&self, request: &CutoutRequest) -> Result<()>;

    /// Check whether the destination channel already exists
    async fn channel_exists(&self, uri: &BossUri) -> Result<bool>;
}

/// Remote store held entirely in memory
///
/// Mirrors the service's behaviour that matters to provisioning: parents must
/// exist before children, and a coordinate frame lookup or create resolves to
/// an existing frame with identical bounds.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: RwLock<RemoteState>,
}

#[derive(Debug, Default)]
struct RemoteState {
    projects: HashMap<String, Resource>,
    created: Vec<String>,
    create_calls: Vec<String>,
    writes: Vec<CutoutRequest>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a project without counting it as a create call
    pub fn insert_project(&self, resource: Resource) {
        self.state.write().projects.insert(resource.key(), resource);
    }

    /// Look up a stored project by key
    pub fn project(&self, key: &str) -> Option<Resource> {
        self.state.read().projects.get(key).cloned()
    }

    /// Keys of every project created through `create_project`, in call order
    pub fn created(&self) -> Vec<String> {
        self.state.read().created.clone()
    }

    /// Keys passed to every `create_project` call, including ones that
    /// resolved to an existing project
    pub fn create_calls(&self) -> Vec<String> {
        self.state.read().create_calls.clone()
    }

    /// Every cutout written so far, in call order
    pub fn writes(&self) -> Vec<CutoutRequest> {
        self.state.read().writes.clone()
    }

    fn lookup(state: &RemoteState, resource: &Resource) -> Option<Resource> {
        if let Some(existing) = state.projects.get(&resource.key()) {
            return Some(existing.clone());
        }
        let Resource::CoordinateFrame(frame) = resource else {
            return None;
        };
        state
            .projects
            .values()
            .find(|p| matches!(p, Resource::CoordinateFrame(other) if other.same_bounds(frame)))
            .cloned()
    }

    fn require(state: &RemoteState, key: String) -> Result<()> {
        if state.projects.contains_key(&key) {
            Ok(())
        } else {
            Err(IngestError::Remote(format!("Parent project missing: {}", key)))
        }
    }

    fn check_parents(state: &RemoteState, resource: &Resource) -> Result<()> {
        match resource {
            Resource::Collection(_) | Resource::CoordinateFrame(_) => Ok(()),
            Resource::Experiment(exp) => {
                Self::require(state, format!("collection/{}", exp.collection_name))?;
                Self::require(state, format!("coord/{}", exp.coord_frame_name))
            }
            Resource::Channel(chan) => {
                let experiment = format!(
                    "collection/{}/experiment/{}",
                    chan.collection_name, chan.experiment_name
                );
                Self::require(state, experiment.clone())?;
                for source in &chan.source_channel_names {
                    Self::require(state, format!("{}/channel/{}", experiment, source))?;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get_project(&self, resource: &Resource) -> Result<Resource> {
        Self::lookup(&self.state.read(), resource)
            .ok_or_else(|| IngestError::NotFound(resource.key()))
    }

    async fn create_project(&self, resource: &Resource) -> Result<Resource> {
        let mut state = self.state.write();
        let key = resource.key();
        state.create_calls.push(key.clone());

        if let Some(existing) = Self::lookup(&state, resource) {
            return Ok(existing);
        }

        Self::check_parents(&state, resource)?;
        state.projects.insert(key.clone(), resource.clone());
        state.created.push(key);
        Ok(resource.clone())
    }

    async fn write_cutout(&self, request: &CutoutRequest) -> Result<()> {
        let mut state = self.state.write();
        let key = format!(
            "collection/{}/experiment/{}/channel/{}",
            request.uri.collection, request.uri.experiment, request.uri.channel
        );

        let Some(Resource::Channel(channel)) = state.projects.get(&key) else {
            return Err(IngestError::NotFound(key));
        };
        if channel.data_type != request.data_type {
            return Err(IngestError::DataTypeMismatch {
                expected: channel.data_type.to_string(),
                actual: request.data_type.to_string(),
            });
        }

        let expected_bytes = request.voxel_count() * request.data_type.size_in_bytes();
        if request.data.len() != expected_bytes {
            return Err(IngestError::Remote(format!(
                "Cutout size mismatch: expected {} bytes, got {}",
                expected_bytes,
                request.data.len()
            )));
        }

        state.writes.push(request.clone());
        Ok(())
    }

    async fn channel_exists(&self, uri: &BossUri) -> Result<bool> {
        let key = format!(
            "collection/{}/experiment/{}/channel/{}",
            uri.collection, uri.experiment, uri.channel
        );
        Ok(self.state.read().projects.contains_key(&key))
    }
}
