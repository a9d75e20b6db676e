//! Transfer layout - how a volume's depth axis is divided into slabs

use crate::error::{IngestError, Result};
use std::ops::Range;

/// Default number of depth slices per slab
pub const DEFAULT_UPLOAD_INCREMENT: usize = 16;

/// One contiguous depth range of the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabRange {
    /// Position of this slab in the plan
    pub index: usize,
    pub z_start: usize,
    pub z_end: usize,
}

impl SlabRange {
    /// Number of depth slices in this slab
    pub fn depth(&self) -> usize {
        self.z_end - self.z_start
    }

    pub fn range(&self) -> Range<usize> {
        self.z_start..self.z_end
    }
}

/// Partition of `[0, depth)` into slabs of at most `increment` slices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    depth: usize,
    increment: usize,
}

impl TransferPlan {
    /// Create a new plan
    ///
    /// Increments that are multiples of 16 match the remote's cuboid size and
    /// upload fastest, but any positive value is accepted.
    pub fn new(depth: usize, increment: usize) -> Result<Self> {
        if depth == 0 {
            return Err(IngestError::InvalidGeometry(
                "Volume depth must be > 0".to_string(),
            ));
        }
        if increment == 0 {
            return Err(IngestError::Configuration(
                "Upload increment must be a positive integer".to_string(),
            ));
        }

        Ok(Self { depth, increment })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn increment(&self) -> usize {
        self.increment
    }

    /// Number of slabs in the plan
    pub fn len(&self) -> usize {
        self.depth.div_ceil(self.increment)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the slab at a given position
    pub fn slab(&self, index: usize) -> Option<SlabRange> {
        let z_start = index.checked_mul(self.increment)?;
        if z_start >= self.depth {
            return None;
        }

        Some(SlabRange {
            index,
            z_start,
            z_end: (z_start + self.increment).min(self.depth),
        })
    }

    /// Iterate slabs in ascending depth order
    pub fn slabs(&self) -> impl Iterator<Item = SlabRange> + '_ {
        (0..self.len()).filter_map(move |i| self.slab(i))
    }
}
