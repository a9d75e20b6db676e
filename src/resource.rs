//! Resource descriptors for the remote collection/frame/experiment/channel hierarchy

use crate::types::{ChannelType, DataType, VolumeGeometry};
use crate::uri::BossUri;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Description stamped onto every resource created by this crate
pub const DEFAULT_DESCRIPTION: &str = "Uploaded via boss-ingest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResource {
    pub name: String,
    pub description: String,
}

/// Spatial extents and voxel size shared by experiments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFrameResource {
    pub name: String,
    pub description: String,
    pub x_start: usize,
    pub x_stop: usize,
    pub y_start: usize,
    pub y_stop: usize,
    pub z_start: usize,
    pub z_stop: usize,
    pub x_voxel_size: f64,
    pub y_voxel_size: f64,
    pub z_voxel_size: f64,
    pub voxel_unit: String,
}

impl CoordinateFrameResource {
    /// Frame covering `[0, dim)` on every axis of `geometry`
    pub fn from_geometry(name: impl Into<String>, description: impl Into<String>, geometry: &VolumeGeometry) -> Self {
        let [z_voxel_size, y_voxel_size, x_voxel_size] = geometry.voxel_size();
        Self {
            name: name.into(),
            description: description.into(),
            x_start: 0,
            x_stop: geometry.width(),
            y_start: 0,
            y_stop: geometry.height(),
            z_start: 0,
            z_stop: geometry.depth(),
            x_voxel_size,
            y_voxel_size,
            z_voxel_size,
            voxel_unit: geometry.voxel_unit().to_string(),
        }
    }

    /// Same extents and voxel size, regardless of name
    pub fn same_bounds(&self, other: &Self) -> bool {
        (self.x_start, self.x_stop, self.y_start, self.y_stop, self.z_start, self.z_stop)
            == (other.x_start, other.x_stop, other.y_start, other.y_stop, other.z_start, other.z_stop)
            && self.x_voxel_size == other.x_voxel_size
            && self.y_voxel_size == other.y_voxel_size
            && self.z_voxel_size == other.z_voxel_size
            && self.voxel_unit == other.voxel_unit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResource {
    pub name: String,
    pub description: String,
    pub collection_name: String,
    pub coord_frame_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResource {
    pub name: String,
    pub description: String,
    pub collection_name: String,
    pub experiment_name: String,
    pub channel_type: ChannelType,
    pub data_type: DataType,
    pub source_channel_names: Vec<String>,
}

/// Any provisionable project in the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Collection(CollectionResource),
    CoordinateFrame(CoordinateFrameResource),
    Experiment(ExperimentResource),
    Channel(ChannelResource),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Collection(r) => &r.name,
            Resource::CoordinateFrame(r) => &r.name,
            Resource::Experiment(r) => &r.name,
            Resource::Channel(r) => &r.name,
        }
    }

    /// Key that identifies this resource within its parent scope
    pub fn key(&self) -> String {
        match self {
            Resource::Collection(r) => format!("collection/{}", r.name),
            Resource::CoordinateFrame(r) => format!("coord/{}", r.name),
            Resource::Experiment(r) => format!("collection/{}/experiment/{}", r.collection_name, r.name),
            Resource::Channel(r) => format!(
                "collection/{}/experiment/{}/channel/{}",
                r.collection_name, r.experiment_name, r.name
            ),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// The four-level hierarchy needed before a channel can receive cutouts
///
/// `source_channel` is the precursor channel declared first; `channel` is the
/// destination that lists it as its source. Both carry the destination's
/// name, so on a store keyed by name the destination resolves to the stored
/// precursor and a provisioned hierarchy's `channel.source_channel_names` is
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHierarchy {
    pub collection: CollectionResource,
    pub coord_frame: CoordinateFrameResource,
    pub experiment: ExperimentResource,
    pub source_channel: ChannelResource,
    pub channel: ChannelResource,
}

impl ResourceHierarchy {
    /// Derive the requested hierarchy for uploading `geometry` to `uri`
    pub fn derive(
        uri: &BossUri,
        geometry: &VolumeGeometry,
        data_type: DataType,
        channel_type: ChannelType,
        description: &str,
    ) -> Self {
        let coord_frame_name = uri.coord_frame_name();
        let channel = ChannelResource {
            name: uri.channel.clone(),
            description: description.to_string(),
            collection_name: uri.collection.clone(),
            experiment_name: uri.experiment.clone(),
            channel_type,
            data_type,
            source_channel_names: Vec::new(),
        };

        Self {
            collection: CollectionResource {
                name: uri.collection.clone(),
                description: description.to_string(),
            },
            coord_frame: CoordinateFrameResource::from_geometry(&coord_frame_name, description, geometry),
            experiment: ExperimentResource {
                name: uri.experiment.clone(),
                description: description.to_string(),
                collection_name: uri.collection.clone(),
                coord_frame_name,
            },
            source_channel: channel.clone(),
            channel,
        }
    }

    /// Address of the destination channel
    pub fn uri(&self) -> BossUri {
        BossUri::new(
            &self.channel.collection_name,
            &self.channel.experiment_name,
            &self.channel.name,
        )
    }
}
