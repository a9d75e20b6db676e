//! Volume sources - where slab data comes from
//!
//! A [`VolumeSource`] produces the voxels of a half-open depth range on demand.
//! [`InMemorySource`] slices an array it already holds; [`FileSequenceSource`]
//! decodes one image file per depth slice, touching only the files a slab needs
//! so that volumes larger than memory can be uploaded.

use crate::error::{IngestError, Result};
use crate::types::{cast_voxel, DataType, Voxel};
use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array2, Array3, Axis, CowArray, Ix3};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Produces slabs of a ZYX volume
pub trait VolumeSource: Send + Sync {
    /// Element type of the produced slabs
    type Elem: Voxel;

    /// Full volume shape as (depth, height, width)
    fn shape(&self) -> [usize; 3];

    /// Voxels for depth slices `[z.start, z.end)`
    fn read_slab(&self, z: Range<usize>) -> Result<CowArray<'_, Self::Elem, Ix3>>;
}

fn check_range(z: &Range<usize>, depth: usize) -> Result<()> {
    if z.start >= z.end || z.end > depth {
        return Err(IngestError::InvalidGeometry(format!(
            "Slab {}..{} outside volume depth {}",
            z.start, z.end, depth
        )));
    }
    Ok(())
}

/// Source backed by an array already held in memory
#[derive(Debug, Clone)]
pub struct InMemorySource<T> {
    data: Array3<T>,
}

impl<T: Voxel> InMemorySource<T> {
    pub fn new(data: Array3<T>) -> Self {
        Self { data }
    }
}

impl<T: Voxel> VolumeSource for InMemorySource<T> {
    type Elem = T;

    fn shape(&self) -> [usize; 3] {
        let (d, h, w) = self.data.dim();
        [d, h, w]
    }

    fn read_slab(&self, z: Range<usize>) -> Result<CowArray<'_, T, Ix3>> {
        check_range(&z, self.data.len_of(Axis(0)))?;
        Ok(self.data.slice(s![z, .., ..]).into())
    }
}

/// Adapter that casts every slab of another source to `T`
///
/// Casting happens per slab, so memory stays bounded by the slab size.
#[derive(Debug, Clone)]
pub struct CoercedSource<S, T> {
    inner: S,
    _elem: PhantomData<fn() -> T>,
}

impl<S: VolumeSource, T: Voxel> CoercedSource<S, T> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _elem: PhantomData,
        }
    }
}

impl<S: VolumeSource, T: Voxel> VolumeSource for CoercedSource<S, T> {
    type Elem = T;

    fn shape(&self) -> [usize; 3] {
        self.inner.shape()
    }

    fn read_slab(&self, z: Range<usize>) -> Result<CowArray<'_, T, Ix3>> {
        let slab = self.inner.read_slab(z)?;
        let values = slab
            .iter()
            .map(|&v| cast_voxel::<S::Elem, T>(v))
            .collect::<Result<Vec<_>>>()?;
        let cast = Array3::from_shape_vec(slab.raw_dim(), values)
            .map_err(|e| IngestError::Decode(e.to_string()))?;
        Ok(cast.into())
    }
}

/// Dimensions and natural data type of one decoded slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceInfo {
    pub height: usize,
    pub width: usize,
    pub data_type: DataType,
}

/// Decodes a single depth slice from a file
pub trait SliceDecoder: Send + Sync {
    /// Inspect a file without converting its pixels
    fn probe(&self, path: &Path) -> Result<SliceInfo>;

    /// Decode a file into a (height, width) array of `T`
    fn decode<T: Voxel>(&self, path: &Path) -> Result<Array2<T>>;
}

/// Decoder for single-channel PNG/TIFF slices
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSliceDecoder;

impl ImageSliceDecoder {
    fn unsupported(path: &Path, image: &DynamicImage) -> IngestError {
        IngestError::Decode(format!(
            "{}: expected a single-channel 8 or 16 bit image, got {:?}",
            path.display(),
            image.color()
        ))
    }
}

fn to_array<S: Voxel, T: Voxel>(raw: &[S], height: usize, width: usize) -> Result<Array2<T>> {
    let values = raw
        .iter()
        .map(|&v| cast_voxel::<S, T>(v))
        .collect::<Result<Vec<_>>>()?;
    Array2::from_shape_vec((height, width), values).map_err(|e| IngestError::Decode(e.to_string()))
}

impl SliceDecoder for ImageSliceDecoder {
    fn probe(&self, path: &Path) -> Result<SliceInfo> {
        let image = image::open(path)?;
        let data_type = match &image {
            DynamicImage::ImageLuma8(_) => DataType::U8,
            DynamicImage::ImageLuma16(_) => DataType::U16,
            other => return Err(Self::unsupported(path, other)),
        };

        let (width, height) = image.dimensions();
        Ok(SliceInfo {
            height: height as usize,
            width: width as usize,
            data_type,
        })
    }

    fn decode<T: Voxel>(&self, path: &Path) -> Result<Array2<T>> {
        let image = image::open(path)?;
        let (width, height) = image.dimensions();
        let (height, width) = (height as usize, width as usize);
        match &image {
            DynamicImage::ImageLuma8(buf) => to_array::<u8, T>(buf.as_raw(), height, width),
            DynamicImage::ImageLuma16(buf) => to_array::<u16, T>(buf.as_raw(), height, width),
            other => Err(Self::unsupported(path, other)),
        }
    }
}

/// Sorted list of slice files, discovered and probed once
#[derive(Debug, Clone)]
pub struct SliceSequence {
    paths: Vec<PathBuf>,
    info: SliceInfo,
}

impl SliceSequence {
    /// Scan `dir` for files whose names end with `extension`
    ///
    /// An empty `extension` matches every file. Fails with
    /// [`IngestError::NoMatchingFiles`] when nothing matches.
    pub fn discover<D: SliceDecoder>(dir: &Path, extension: &str, decoder: &D) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().ends_with(extension) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        Self::from_paths(paths, decoder).map_err(|err| match err {
            IngestError::NoMatchingFiles { .. } => IngestError::NoMatchingFiles {
                dir: dir.to_path_buf(),
                extension: extension.to_string(),
            },
            other => other,
        })
    }

    /// Use an explicit, already ordered list of slice files
    pub fn from_paths<D: SliceDecoder>(paths: Vec<PathBuf>, decoder: &D) -> Result<Self> {
        let first = paths.first().ok_or_else(|| IngestError::NoMatchingFiles {
            dir: PathBuf::new(),
            extension: String::new(),
        })?;
        let info = decoder.probe(first)?;
        Ok(Self { paths, info })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Data type of the first slice as stored on disk
    pub fn natural_data_type(&self) -> DataType {
        self.info.data_type
    }

    /// Volume shape as (depth, height, width)
    pub fn shape(&self) -> [usize; 3] {
        [self.paths.len(), self.info.height, self.info.width]
    }
}

/// Source that decodes one file per depth slice, lazily per slab
pub struct FileSequenceSource<T, D = ImageSliceDecoder> {
    sequence: SliceSequence,
    decoder: D,
    _elem: PhantomData<fn() -> T>,
}

impl<T: Voxel, D: SliceDecoder> FileSequenceSource<T, D> {
    pub fn new(sequence: SliceSequence, decoder: D) -> Self {
        Self {
            sequence,
            decoder,
            _elem: PhantomData,
        }
    }
}

impl<T: Voxel, D: SliceDecoder> VolumeSource for FileSequenceSource<T, D> {
    type Elem = T;

    fn shape(&self) -> [usize; 3] {
        self.sequence.shape()
    }

    fn read_slab(&self, z: Range<usize>) -> Result<CowArray<'_, T, Ix3>> {
        let [depth, height, width] = self.shape();
        check_range(&z, depth)?;

        let mut slab = Array3::<T>::from_elem((z.len(), height, width), T::default());
        for (i, path) in self.sequence.paths[z].iter().enumerate() {
            let slice = self.decoder.decode::<T>(path)?;
            if slice.dim() != (height, width) {
                return Err(IngestError::Decode(format!(
                    "{}: slice is {:?}, expected {:?}",
                    path.display(),
                    slice.dim(),
                    (height, width)
                )));
            }
            slab.index_axis_mut(Axis(0), i).assign(&slice);
        }

        Ok(slab.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};
    use tempfile::TempDir;

    fn write_slices(dir: &Path, count: u8, height: u32, width: u32) {
        for z in 0..count {
            let img = GrayImage::from_fn(width, height, |x, y| Luma([z * 10 + (y * width + x) as u8]));
            img.save(dir.join(format!("slice_{:03}.png", z))).unwrap();
        }
    }

    #[test]
    fn test_in_memory_slab_is_a_view() {
        let data = Array3::from_shape_fn((5, 2, 3), |(z, y, x)| (z * 100 + y * 10 + x) as u16);
        let source = InMemorySource::new(data.clone());
        assert_eq!(source.shape(), [5, 2, 3]);

        let slab = source.read_slab(3..5).unwrap();
        assert!(slab.is_view());
        assert_eq!(slab, data.slice(s![3..5, .., ..]));
        assert!(source.read_slab(4..6).is_err());
    }

    #[test]
    fn test_coerced_source_casts_values() {
        let data = Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (z + y + x) as u8);
        let source = CoercedSource::<_, u64>::new(InMemorySource::new(data.clone()));
        let slab = source.read_slab(0..2).unwrap();
        assert_eq!(slab, data.mapv(u64::from));

        let wide = Array3::from_elem((1, 1, 1), 1000u16);
        let narrowing = CoercedSource::<_, u8>::new(InMemorySource::new(wide));
        assert!(matches!(narrowing.read_slab(0..1), Err(IngestError::Decode(_))));
    }

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = TempDir::new().unwrap();
        write_slices(dir.path(), 4, 3, 2);
        std::fs::write(dir.path().join("notes.txt"), b"not a slice").unwrap();

        let sequence = SliceSequence::discover(dir.path(), ".png", &ImageSliceDecoder).unwrap();
        assert_eq!(sequence.len(), 4);
        assert_eq!(sequence.shape(), [4, 3, 2]);
        assert_eq!(sequence.natural_data_type(), DataType::U8);
        assert!(sequence.paths()[0].ends_with("slice_000.png"));
        assert!(sequence.paths()[3].ends_with("slice_003.png"));
    }

    #[test]
    fn test_discover_empty_listing() {
        let dir = TempDir::new().unwrap();
        write_slices(dir.path(), 2, 2, 2);

        let err = SliceSequence::discover(dir.path(), ".tif", &ImageSliceDecoder).unwrap_err();
        match err {
            IngestError::NoMatchingFiles { dir: d, extension } => {
                assert_eq!(d, dir.path());
                assert_eq!(extension, ".tif");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_file_sequence_reads_requested_slices() {
        let dir = TempDir::new().unwrap();
        write_slices(dir.path(), 5, 2, 3);
        let sequence = SliceSequence::discover(dir.path(), ".png", &ImageSliceDecoder).unwrap();
        let source = FileSequenceSource::<u16, _>::new(sequence, ImageSliceDecoder);

        let slab = source.read_slab(2..4).unwrap();
        assert_eq!(slab.dim(), (2, 2, 3));
        assert_eq!(slab[[0, 0, 0]], 20u16);
        assert_eq!(slab[[1, 1, 2]], 35u16);
    }

    #[test]
    fn test_file_sequence_rejects_mismatched_slice() {
        let dir = TempDir::new().unwrap();
        write_slices(dir.path(), 2, 2, 2);
        let odd: ImageBuffer<Luma<u8>, Vec<u8>> = GrayImage::new(3, 3);
        odd.save(dir.path().join("slice_999.png")).unwrap();

        let sequence = SliceSequence::discover(dir.path(), ".png", &ImageSliceDecoder).unwrap();
        let source = FileSequenceSource::<u8, _>::new(sequence, ImageSliceDecoder);
        assert!(source.read_slab(0..2).is_ok());
        assert!(matches!(source.read_slab(1..3), Err(IngestError::Decode(_))));
    }
}
