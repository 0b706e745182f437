//! Data types and associated functions and methods

use crate::error::SubsetError;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use validator::{Validate, ValidationError};

/// Supported numerical data types
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// [i8]
    Int8,
    /// [i16]
    Int16,
    /// [i32]
    Int32,
    /// [i64]
    Int64,
    /// [u8]
    Uint8,
    /// [u16]
    Uint16,
    /// [u32]
    Uint32,
    /// [u64]
    Uint64,
    /// [f32]
    Float32,
    /// [f64]
    Float64,
}

impl DType {
    /// Returns the size of the associated type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Int8 => std::mem::size_of::<i8>(),
            Self::Int16 => std::mem::size_of::<i16>(),
            Self::Int32 => std::mem::size_of::<i32>(),
            Self::Int64 => std::mem::size_of::<i64>(),
            Self::Uint8 => std::mem::size_of::<u8>(),
            Self::Uint16 => std::mem::size_of::<u16>(),
            Self::Uint32 => std::mem::size_of::<u32>(),
            Self::Uint64 => std::mem::size_of::<u64>(),
            Self::Float32 => std::mem::size_of::<f32>(),
            Self::Float64 => std::mem::size_of::<f64>(),
        }
    }
}

/// A slice of a single dimension of an array
///
/// Selections use NumPy slice semantics:
///
/// When start or end is negative:
/// * positive_start = start + length
/// * positive_end = end + length
/// Start and end are clamped:
/// * positive_start = min(positive_start, 0)
/// * positive_end + max(positive_end, length)
/// When the stride is positive:
/// * positive_start <= i < positive_end
/// When the stride is negative:
/// * positive_end <= i < positive_start
// NOTE: In serde, structs can be deserialised from sequences or maps. This allows us to support
// the [<start>, <end>, <stride>] form, with the convenience of named fields.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_slice"))]
pub struct Slice {
    /// Start of the slice
    pub start: isize,
    /// End of the slice
    pub end: isize,
    /// Stride size
    pub stride: isize,
}

impl Slice {
    /// Return a new Slice object.
    pub fn new(start: isize, end: isize, stride: isize) -> Self {
        Slice { start, end, stride }
    }
}

/// Validate an array slice
fn validate_slice(slice: &Slice) -> Result<(), ValidationError> {
    if slice.stride == 0 {
        let mut error = ValidationError::new("Selection stride must not be equal to zero");
        error.add_param("stride".into(), &slice.stride);
        return Err(error);
    }
    Ok(())
}

/// A selection over a multi-dimensional array.
///
/// Holds one [Slice] per leading dimension. Dimensions without a slice are selected in full, so
/// the empty selection addresses the whole array (including rank 0 arrays).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Selection(pub Vec<Slice>);

impl Selection {
    /// Selects every element of the array.
    pub fn all() -> Self {
        Selection(vec![])
    }

    /// Selects a contiguous range of the leading dimension and all of the trailing dimensions.
    pub fn rows(range: IndexRange) -> Self {
        let start = isize::try_from(range.min).unwrap_or(isize::MAX);
        let end = isize::try_from(range.max).unwrap_or(isize::MAX);
        Selection(vec![Slice::new(start, end, 1)])
    }

    /// Returns the slices of this selection.
    pub fn slices(&self) -> &[Slice] {
        &self.0
    }

    /// Returns the number of explicitly sliced dimensions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no dimension is explicitly sliced.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Slice>> for Selection {
    fn from(slices: Vec<Slice>) -> Self {
        Selection(slices)
    }
}

/// A geographic bounding box in degrees.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[validate(schema(function = "validate_bounding_box"))]
pub struct BoundingBox {
    /// Western edge
    #[validate(range(min = -180.0, max = 180.0, message = "min_lon must be within [-180, 180]"))]
    pub min_lon: f64,
    /// Eastern edge
    #[validate(range(min = -180.0, max = 180.0, message = "max_lon must be within [-180, 180]"))]
    pub max_lon: f64,
    /// Southern edge
    #[validate(range(min = -90.0, max = 90.0, message = "min_lat must be within [-90, 90]"))]
    pub min_lat: f64,
    /// Northern edge
    #[validate(range(min = -90.0, max = 90.0, message = "max_lat must be within [-90, 90]"))]
    pub max_lat: f64,
}

impl BoundingBox {
    /// Return a new BoundingBox object. The box is not validated.
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// Returns true if the point lies inside the box. Edges are inclusive.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Validate the ordering of bounding box edges
fn validate_bounding_box(bbox: &BoundingBox) -> Result<(), ValidationError> {
    // Negated comparisons so that NaN edges are rejected too.
    if !(bbox.min_lon < bbox.max_lon) {
        let mut error = ValidationError::new("min_lon must be less than max_lon");
        error.add_param("min_lon".into(), &bbox.min_lon);
        error.add_param("max_lon".into(), &bbox.max_lon);
        return Err(error);
    }
    if !(bbox.min_lat < bbox.max_lat) {
        let mut error = ValidationError::new("min_lat must be less than max_lat");
        error.add_param("min_lat".into(), &bbox.min_lat);
        error.add_param("max_lat".into(), &bbox.max_lat);
        return Err(error);
    }
    Ok(())
}

/// A half-open interval `[min, max)` over an array's leading dimension.
///
/// An empty result (no samples) is represented as `Option::<IndexRange>::None` rather than as a
/// zero-length range.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "IndexRangeFields")]
pub struct IndexRange {
    /// First index in the range
    pub min: usize,
    /// One past the last index in the range
    pub max: usize,
}

impl IndexRange {
    /// Return a new IndexRange object.
    ///
    /// Use [IndexRange::try_new] for bounds that are not known to be ordered.
    pub fn new(min: usize, max: usize) -> Self {
        debug_assert!(min <= max, "index range {}..{} is inverted", min, max);
        IndexRange { min, max }
    }

    /// Return a new IndexRange object, checking that `min <= max`.
    pub fn try_new(min: usize, max: usize) -> Result<Self, SubsetError> {
        if min > max {
            return Err(SubsetError::InvalidRange { min, max });
        }
        Ok(IndexRange { min, max })
    }

    /// Number of indices covered by the range.
    pub fn len(&self) -> usize {
        self.max.saturating_sub(self.min)
    }

    /// Returns true if the range covers no indices.
    pub fn is_empty(&self) -> bool {
        self.min == self.max
    }

    /// Returns the midpoint used to split the range in two.
    pub fn mid(&self) -> usize {
        self.min + self.len() / 2
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexRangeFields {
    min: usize,
    max: usize,
}

impl TryFrom<IndexRangeFields> for IndexRange {
    type Error = SubsetError;

    fn try_from(fields: IndexRangeFields) -> Result<Self, Self::Error> {
        IndexRange::try_new(fields.min, fields.max)
    }
}

impl std::fmt::Display for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}

/// Shape and element type of a dataset.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DatasetMeta {
    /// Extent of each dimension. Empty for scalar datasets.
    pub shape: Vec<usize>,
    /// Element type
    pub dtype: DType,
}

impl DatasetMeta {
    /// Return a new DatasetMeta object.
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        DatasetMeta { shape, dtype }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns a copy of this metadata with the leading extent replaced.
    ///
    /// Trailing dimensions are preserved unchanged. Scalar metadata is returned as is.
    pub fn with_extent(&self, extent: usize) -> Self {
        let mut shape = self.shape.clone();
        if let Some(leading) = shape.first_mut() {
            *leading = extent;
        }
        DatasetMeta::new(shape, self.dtype)
    }
}

/// An attribute value.
///
/// This is an alias of serde_json's Value, which covers the scalars, strings and arrays that are
/// attached to groups and datasets.
pub type AttrValue = serde_json::Value;

/// A mapping from attribute name to value.
pub type Attributes = serde_json::Map<String, AttrValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Token};

    #[test]
    fn dtype_size_of() {
        assert_eq!(1, DType::Int8.size_of());
        assert_eq!(2, DType::Uint16.size_of());
        assert_eq!(4, DType::Float32.size_of());
        assert_eq!(8, DType::Float64.size_of());
    }

    #[test]
    fn dtype_json() {
        let dtype: DType = serde_json::from_str(r#""float32""#).unwrap();
        assert_eq!(DType::Float32, dtype);
        assert_eq!(r#""uint16""#, serde_json::to_string(&DType::Uint16).unwrap());
    }

    #[test]
    fn invalid_dtype() {
        assert_de_tokens_error::<DType>(
            &[Token::Enum { name: "DType" }, Token::Str("foo"), Token::Unit],
            "unknown variant `foo`, expected one of `int8`, `int16`, `int32`, `int64`, `uint8`, `uint16`, `uint32`, `uint64`, `float32`, `float64`",
        )
    }

    #[test]
    fn slice_from_seq() {
        assert_de_tokens(
            &Slice::new(1, 2, 3),
            &[
                Token::Seq { len: Some(3) },
                Token::I64(1),
                Token::I64(2),
                Token::I64(3),
                Token::SeqEnd,
            ],
        );
    }

    #[test]
    fn selection_json() {
        let selection: Selection = serde_json::from_str("[[1, 2, 1], [0, 5, 2]]").unwrap();
        assert_eq!(
            Selection(vec![Slice::new(1, 2, 1), Slice::new(0, 5, 2)]),
            selection
        );
    }

    #[test]
    #[should_panic(expected = "Selection stride must not be equal to zero")]
    fn invalid_slice_stride() {
        Slice::new(1, 2, 0).validate().unwrap()
    }

    #[test]
    fn selection_rows() {
        assert_eq!(
            Selection(vec![Slice::new(2, 5, 1)]),
            Selection::rows(IndexRange::new(2, 5))
        );
        assert!(Selection::all().is_empty());
    }

    #[test]
    fn bounding_box_valid() {
        BoundingBox::new(-1.0, 1.0, 15.0, 35.0).validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "min_lon must be within [-180, 180]")]
    fn bounding_box_lon_out_of_range() {
        BoundingBox::new(-181.0, 1.0, 15.0, 35.0).validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "max_lat must be within [-90, 90]")]
    fn bounding_box_lat_out_of_range() {
        BoundingBox::new(-1.0, 1.0, 15.0, 95.0).validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "min_lon must be less than max_lon")]
    fn bounding_box_lon_inverted() {
        BoundingBox::new(1.0, 1.0, 15.0, 35.0).validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "min_lat must be less than max_lat")]
    fn bounding_box_lat_inverted() {
        BoundingBox::new(-1.0, 1.0, 35.0, 15.0).validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "min_lat must be less than max_lat")]
    fn bounding_box_nan() {
        BoundingBox::new(-1.0, 1.0, f64::NAN, 15.0).validate().unwrap()
    }

    #[test]
    fn bounding_box_contains_edges() {
        let bbox = BoundingBox::new(-1.0, 1.0, 15.0, 35.0);
        assert!(bbox.contains(15.0, -1.0));
        assert!(bbox.contains(35.0, 1.0));
        assert!(!bbox.contains(35.1, 0.0));
        assert!(!bbox.contains(f64::NAN, 0.0));
    }

    #[test]
    fn index_range() {
        let range = IndexRange::new(2, 7);
        assert_eq!(5, range.len());
        assert_eq!(4, range.mid());
        assert!(!range.is_empty());
        assert!(IndexRange::new(3, 3).is_empty());
        assert_eq!("2:7", range.to_string());
    }

    #[test]
    fn index_range_inverted() {
        assert_eq!(IndexRange::new(2, 7), IndexRange::try_new(2, 7).unwrap());
        assert!(matches!(
            IndexRange::try_new(7, 2).unwrap_err(),
            SubsetError::InvalidRange { min: 7, max: 2 }
        ));
    }

    #[test]
    fn index_range_from_fields() {
        assert_de_tokens(
            &IndexRange::new(1, 3),
            &[
                Token::Struct {
                    name: "IndexRangeFields",
                    len: 2,
                },
                Token::Str("min"),
                Token::U64(1),
                Token::Str("max"),
                Token::U64(3),
                Token::StructEnd,
            ],
        );
        assert_de_tokens_error::<IndexRange>(
            &[
                Token::Struct {
                    name: "IndexRangeFields",
                    len: 2,
                },
                Token::Str("min"),
                Token::U64(5),
                Token::Str("max"),
                Token::U64(2),
                Token::StructEnd,
            ],
            "index range 5:2 is inverted",
        );
    }

    #[test]
    fn dataset_meta_with_extent() {
        let meta = DatasetMeta::new(vec![100, 5], DType::Int8);
        assert_eq!(DatasetMeta::new(vec![7, 5], DType::Int8), meta.with_extent(7));
        let scalar = DatasetMeta::new(vec![], DType::Int8);
        assert_eq!(scalar, scalar.with_extent(7));
    }
}
