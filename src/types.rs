//! Core data types for volume ingest

use crate::error::{IngestError, Result};
use bytes::{BufMut, BytesMut};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Voxel data types accepted by the remote channel store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "uint64")]
    U64,
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "int64")]
    I64,
    #[serde(rename = "float32")]
    F32,
    #[serde(rename = "float64")]
    F64,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
        }
    }

    /// Name used by the remote store for channel datatypes
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uint8" => Ok(DataType::U8),
            "uint16" => Ok(DataType::U16),
            "uint32" => Ok(DataType::U32),
            "uint64" => Ok(DataType::U64),
            "int8" => Ok(DataType::I8),
            "int16" => Ok(DataType::I16),
            "int32" => Ok(DataType::I32),
            "int64" => Ok(DataType::I64),
            "float32" => Ok(DataType::F32),
            "float64" => Ok(DataType::F64),
            other => Err(IngestError::Configuration(format!(
                "Unknown data type: {}",
                other
            ))),
        }
    }
}

/// A primitive element that can be stored in a channel
pub trait Voxel: Copy + Default + Send + Sync + fmt::Debug + NumCast + 'static {
    /// Channel data type this element maps to
    const DATA_TYPE: DataType;

    /// Append the little-endian encoding of this value
    fn put_le(self, buf: &mut BytesMut);
}

macro_rules! impl_voxel {
    ($($t:ty => $dt:ident, $put:ident;)*) => {
        $(
            impl Voxel for $t {
                const DATA_TYPE: DataType = DataType::$dt;

                fn put_le(self, buf: &mut BytesMut) {
                    buf.$put(self);
                }
            }
        )*
    };
}

impl_voxel! {
    u8 => U8, put_u8;
    u16 => U16, put_u16_le;
    u32 => U32, put_u32_le;
    u64 => U64, put_u64_le;
    i8 => I8, put_i8;
    i16 => I16, put_i16_le;
    i32 => I32, put_i32_le;
    i64 => I64, put_i64_le;
    f32 => F32, put_f32_le;
    f64 => F64, put_f64_le;
}

/// Run `$body` with `$T` bound to the Rust element type for a runtime `DataType`
macro_rules! dispatch_voxel {
    ($data_type:expr, $T:ident => $body:expr) => {
        match $data_type {
            $crate::types::DataType::U8 => {
                type $T = u8;
                $body
            }
            $crate::types::DataType::U16 => {
                type $T = u16;
                $body
            }
            $crate::types::DataType::U32 => {
                type $T = u32;
                $body
            }
            $crate::types::DataType::U64 => {
                type $T = u64;
                $body
            }
            $crate::types::DataType::I8 => {
                type $T = i8;
                $body
            }
            $crate::types::DataType::I16 => {
                type $T = i16;
                $body
            }
            $crate::types::DataType::I32 => {
                type $T = i32;
                $body
            }
            $crate::types::DataType::I64 => {
                type $T = i64;
                $body
            }
            $crate::types::DataType::F32 => {
                type $T = f32;
                $body
            }
            $crate::types::DataType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}
pub(crate) use dispatch_voxel;

/// Convert a single value between voxel types, failing if it does not fit
pub fn cast_voxel<S: Voxel, T: Voxel>(value: S) -> Result<T> {
    num_traits::cast::<S, T>(value).ok_or_else(|| {
        IngestError::Decode(format!(
            "Value {:?} is not representable as {}",
            value,
            T::DATA_TYPE
        ))
    })
}

/// Kind of data a channel holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Raw intensity images
    #[default]
    Image,
    /// Segmentation labels
    Annotation,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Image => f.write_str("image"),
            ChannelType::Annotation => f.write_str("annotation"),
        }
    }
}

/// Shape and physical voxel size of a volume, all in ZYX order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    shape: [usize; 3],
    voxel_size: [f64; 3],
    voxel_unit: String,
}

impl VolumeGeometry {
    /// Create a new geometry
    ///
    /// # Arguments
    /// * `shape` - Voxel counts as (depth, height, width)
    /// * `voxel_size` - Physical voxel size as (z, y, x)
    /// * `voxel_unit` - Unit of `voxel_size`, e.g. "nanometers"
    pub fn new(shape: [usize; 3], voxel_size: [f64; 3], voxel_unit: impl Into<String>) -> Result<Self> {
        if shape.iter().any(|&d| d == 0) {
            return Err(IngestError::InvalidGeometry(format!(
                "All shape dimensions must be > 0, got {:?}",
                shape
            )));
        }
        if voxel_size.iter().any(|&v| !v.is_finite() || v <= 0.0) {
            return Err(IngestError::InvalidGeometry(format!(
                "Voxel sizes must be positive, got {:?}",
                voxel_size
            )));
        }

        Ok(Self {
            shape,
            voxel_size,
            voxel_unit: voxel_unit.into(),
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn depth(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn voxel_size(&self) -> [f64; 3] {
        self.voxel_size
    }

    pub fn voxel_unit(&self) -> &str {
        &self.voxel_unit
    }

    /// Total number of voxels in the volume
    pub fn total_voxels(&self) -> usize {
        self.shape.iter().product()
    }

    /// Get a summary string of the geometry
    pub fn summary(&self) -> String {
        format!(
            "{} x {} x {} (ZYX), voxel {:?} {}",
            self.depth(),
            self.height(),
            self.width(),
            self.voxel_size,
            self.voxel_unit
        )
    }
}
