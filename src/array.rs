//! Functions and utilities for working with [ndarray] objects.
//!
//! Datasets are held in memory as an [ArrayData], a dynamically typed wrapper around an
//! [ndarray::ArrayD] of one of the supported element types.

use crate::error::SubsetError;
use crate::models::{DType, DatasetMeta, IndexRange, Selection, Slice};
use crate::types::ByteOrder;

use core::convert::TryFrom;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use validator::Validate;
// Bring trait into scope to use as_bytes method.
use zerocopy::AsBytes;

/// Trait for array elements.
pub trait Element:
    Clone
    + Copy
    + PartialOrd
    + num_traits::Zero
    + num_traits::ToPrimitive
    + std::fmt::Debug
    + zerocopy::AsBytes
    + zerocopy::FromBytes
    + Send
    + Sync
    + 'static
{
}

/// Blanket implementation of Element.
impl<T> Element for T where
    T: Clone
        + Copy
        + PartialOrd
        + num_traits::Zero
        + num_traits::ToPrimitive
        + std::fmt::Debug
        + zerocopy::AsBytes
        + zerocopy::FromBytes
        + Send
        + Sync
        + 'static
{
}

/// Slice description for arrays of dynamic dimensionality.
pub type DynSliceInfo = ndarray::SliceInfo<Vec<ndarray::SliceInfoElem>, IxDyn, IxDyn>;

/// An owned n-dimensional array of one of the supported [DType]s.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Uint8(ArrayD<u8>),
    Uint16(ArrayD<u16>),
    Uint32(ArrayD<u32>),
    Uint64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

/// Evaluates an expression against the typed array inside an [ArrayData].
macro_rules! with_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            ArrayData::Int8($array) => $body,
            ArrayData::Int16($array) => $body,
            ArrayData::Int32($array) => $body,
            ArrayData::Int64($array) => $body,
            ArrayData::Uint8($array) => $body,
            ArrayData::Uint16($array) => $body,
            ArrayData::Uint32($array) => $body,
            ArrayData::Uint64($array) => $body,
            ArrayData::Float32($array) => $body,
            ArrayData::Float64($array) => $body,
        }
    };
}

/// Maps the typed array inside an [ArrayData] to a new array of the same type.
macro_rules! map_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            ArrayData::Int8($array) => ArrayData::Int8($body),
            ArrayData::Int16($array) => ArrayData::Int16($body),
            ArrayData::Int32($array) => ArrayData::Int32($body),
            ArrayData::Int64($array) => ArrayData::Int64($body),
            ArrayData::Uint8($array) => ArrayData::Uint8($body),
            ArrayData::Uint16($array) => ArrayData::Uint16($body),
            ArrayData::Uint32($array) => ArrayData::Uint32($body),
            ArrayData::Uint64($array) => ArrayData::Uint64($body),
            ArrayData::Float32($array) => ArrayData::Float32($body),
            ArrayData::Float64($array) => ArrayData::Float64($body),
        }
    };
}

/// Convert a runtime [DType] into a concrete element type `$t` and build an [ArrayData] from
/// `$body`.
macro_rules! from_dtype {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            DType::Int8 => {
                type $t = i8;
                ArrayData::Int8($body)
            }
            DType::Int16 => {
                type $t = i16;
                ArrayData::Int16($body)
            }
            DType::Int32 => {
                type $t = i32;
                ArrayData::Int32($body)
            }
            DType::Int64 => {
                type $t = i64;
                ArrayData::Int64($body)
            }
            DType::Uint8 => {
                type $t = u8;
                ArrayData::Uint8($body)
            }
            DType::Uint16 => {
                type $t = u16;
                ArrayData::Uint16($body)
            }
            DType::Uint32 => {
                type $t = u32;
                ArrayData::Uint32($body)
            }
            DType::Uint64 => {
                type $t = u64;
                ArrayData::Uint64($body)
            }
            DType::Float32 => {
                type $t = f32;
                ArrayData::Float32($body)
            }
            DType::Float64 => {
                type $t = f64;
                ArrayData::Float64($body)
            }
        }
    };
}

macro_rules! impl_from_array {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<ArrayD<$t>> for ArrayData {
                fn from(array: ArrayD<$t>) -> Self {
                    ArrayData::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
);

impl ArrayData {
    /// Returns the element type of the array.
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Int8(_) => DType::Int8,
            ArrayData::Int16(_) => DType::Int16,
            ArrayData::Int32(_) => DType::Int32,
            ArrayData::Int64(_) => DType::Int64,
            ArrayData::Uint8(_) => DType::Uint8,
            ArrayData::Uint16(_) => DType::Uint16,
            ArrayData::Uint32(_) => DType::Uint32,
            ArrayData::Uint64(_) => DType::Uint64,
            ArrayData::Float32(_) => DType::Float32,
            ArrayData::Float64(_) => DType::Float64,
        }
    }

    /// Returns the shape of the array.
    pub fn shape(&self) -> &[usize] {
        with_array!(self, array => array.shape())
    }

    /// Returns the extent of the leading dimension, or `None` for rank 0 arrays.
    pub fn leading_extent(&self) -> Option<usize> {
        self.shape().first().copied()
    }

    /// Number of elements in the array.
    pub fn len(&self) -> usize {
        with_array!(self, array => array.len())
    }

    /// Returns true if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the shape and element type of the array.
    pub fn meta(&self) -> DatasetMeta {
        DatasetMeta::new(self.shape().to_vec(), self.dtype())
    }

    /// Returns a zero-filled array.
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        from_dtype!(dtype, T => ArrayD::<T>::zeros(IxDyn(shape)))
    }

    /// Returns an owned copy of the selected part of the array.
    ///
    /// # Arguments
    ///
    /// * `selection`: Selection in NumPy semantics. Dimensions without a slice are taken in full.
    pub fn slice(&self, selection: &Selection) -> Result<Self, SubsetError> {
        let slice_info = build_slice_info(selection, self.shape())?;
        Ok(map_array!(self, array => array.slice(&slice_info).to_owned()))
    }

    /// Overwrites the selected part of the array with `data`.
    ///
    /// The selected region must have exactly the shape of `data`, and both arrays must share an
    /// element type.
    pub fn assign(&mut self, selection: &Selection, data: &ArrayData) -> Result<(), SubsetError> {
        let slice_info = build_slice_info(selection, self.shape())?;
        let (expected, actual) = (self.dtype(), data.dtype());
        match (self, data) {
            (ArrayData::Int8(dest), ArrayData::Int8(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Int16(dest), ArrayData::Int16(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Int32(dest), ArrayData::Int32(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Int64(dest), ArrayData::Int64(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Uint8(dest), ArrayData::Uint8(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Uint16(dest), ArrayData::Uint16(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Uint32(dest), ArrayData::Uint32(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Uint64(dest), ArrayData::Uint64(src)) => assign_t(dest, &slice_info, src),
            (ArrayData::Float32(dest), ArrayData::Float32(src)) => {
                assign_t(dest, &slice_info, src)
            }
            (ArrayData::Float64(dest), ArrayData::Float64(src)) => {
                assign_t(dest, &slice_info, src)
            }
            _ => Err(SubsetError::DTypeMismatch { expected, actual }),
        }
    }

    /// Build an array from row-major bytes.
    ///
    /// # Arguments
    ///
    /// * `dtype`: Element type of the data
    /// * `shape`: Shape of the array. The byte count must match the shape exactly.
    /// * `data`: Raw bytes. No alignment is required.
    /// * `byte_order`: Byte order of `data`
    pub fn from_bytes(
        dtype: DType,
        shape: &[usize],
        data: &[u8],
        byte_order: ByteOrder,
    ) -> Result<Self, SubsetError> {
        Ok(from_dtype!(dtype, T => array_from_bytes::<T>(shape, data, byte_order)?))
    }

    /// Returns the elements of the array as bytes, in logical row-major order.
    pub fn to_bytes(&self, byte_order: ByteOrder) -> Vec<u8> {
        with_array!(self, array => array_to_bytes(array, byte_order))
    }

    /// Returns the elements of a 1D array converted to [f64].
    pub fn to_f64_vec(&self) -> Result<Vec<f64>, SubsetError> {
        if self.shape().len() != 1 {
            return Err(SubsetError::ShapeMismatch {
                what: "coordinate array".to_string(),
                expected: vec![self.len()],
                actual: self.shape().to_vec(),
            });
        }
        Ok(with_array!(self, array => array
            .iter()
            .map(|value| value.to_f64().unwrap_or(f64::NAN))
            .collect()))
    }

    /// Returns the sum of all elements, treating each as a non-negative count.
    pub fn sum_counts(&self) -> Result<u64, SubsetError> {
        with_array!(self, array => sum_counts_t(array))
    }
}

fn assign_t<T: Element>(
    dest: &mut ArrayD<T>,
    slice_info: &DynSliceInfo,
    src: &ArrayD<T>,
) -> Result<(), SubsetError> {
    let mut view = dest.slice_mut(slice_info);
    if view.shape() != src.shape() {
        return Err(SubsetError::ShapeMismatch {
            what: "selection".to_string(),
            expected: view.shape().to_vec(),
            actual: src.shape().to_vec(),
        });
    }
    view.assign(src);
    Ok(())
}

fn sum_counts_t<T: Element>(array: &ArrayD<T>) -> Result<u64, SubsetError> {
    array.iter().try_fold(0_u64, |total, value| {
        value
            .to_u64()
            .and_then(|count| total.checked_add(count))
            .ok_or_else(|| SubsetError::InvalidCount {
                value: format!("{:?}", value),
            })
    })
}

/// Convert from bytes to `&[T]`.
///
/// Zerocopy provides a mechanism for converting between types.
/// Correct alignment of the data is necessary.
///
/// # Arguments
///
/// * `data`: Bytes containing data to convert.
fn from_bytes<T: zerocopy::FromBytes>(data: &[u8]) -> Result<&[T], SubsetError> {
    let layout = zerocopy::LayoutVerified::<_, [T]>::new_slice(data).ok_or(
        SubsetError::FromBytes {
            type_name: std::any::type_name::<T>(),
        },
    )?;
    Ok(layout.into_slice())
}

/// Swap the bytes of each element in place.
fn swap_bytes(data: &mut [u8], element_size: usize) {
    if element_size > 1 {
        data.chunks_exact_mut(element_size)
            .for_each(|element| element.reverse());
    }
}

fn array_from_bytes<T: Element>(
    shape: &[usize],
    data: &[u8],
    byte_order: ByteOrder,
) -> Result<ArrayD<T>, SubsetError> {
    let expected = shape.iter().product::<usize>() * std::mem::size_of::<T>();
    if data.len() != expected {
        return Err(SubsetError::ShapeMismatch {
            what: "array bytes".to_string(),
            expected: vec![expected],
            actual: vec![data.len()],
        });
    }
    // An empty Vec has a dangling pointer that zerocopy rejects as unaligned.
    if data.is_empty() {
        return Ok(ArrayD::from_shape_vec(IxDyn(shape), vec![])?);
    }
    // Copy into an 8-byte aligned buffer so that zerocopy can reinterpret it.
    let mut buf = maligned::align_first::<u8, maligned::A8>(data.len());
    buf.extend_from_slice(data);
    if !byte_order.is_native() {
        swap_bytes(&mut buf, std::mem::size_of::<T>());
    }
    let values = from_bytes::<T>(&buf)?;
    Ok(ArrayD::from_shape_vec(IxDyn(shape), values.to_vec())?)
}

fn array_to_bytes<T: Element>(array: &ArrayD<T>, byte_order: ByteOrder) -> Vec<u8> {
    let size = std::mem::size_of::<T>();
    let mut bytes = Vec::with_capacity(array.len() * size);
    for value in array.iter() {
        bytes.extend_from_slice(value.as_bytes());
    }
    if !byte_order.is_native() {
        swap_bytes(&mut bytes, size);
    }
    bytes
}

/// Returns an array index in numpy semantics to an index with ndarray semantics.
///
/// The resulting value will be clamped such that it is safe for indexing in ndarray.
/// This allows us to accept selections with NumPy's less restrictive semantics.
/// When the stride is negative (`reverse` is `true`), the result is offset by one to allow for
/// Numpy's non-inclusive start and inclusive end in this scenario.
///
/// # Arguments
///
/// * `index`: Selection index
/// * `length`: Length of corresponding axis
/// * `reverse`: Whether the stride is negative
fn to_ndarray_index(index: isize, length: usize, reverse: bool) -> Result<isize, SubsetError> {
    let length_isize = isize::try_from(length)?;
    let result = if reverse { index + 1 } else { index };
    Ok(if index < 0 {
        std::cmp::max(result + length_isize, 0)
    } else {
        std::cmp::min(result, length_isize)
    })
}

/// Convert a [crate::models::Slice] object with indices in numpy semantics to an
/// [ndarray::SliceInfoElem::Slice] with ndarray semantics.
///
/// See [ndarray docs](https://docs.rs/ndarray/0.15.6/ndarray/macro.s.html#negative-step) for
/// information about ndarray's handling of negative strides.
fn to_ndarray_slice(slice: &Slice, length: usize) -> Result<ndarray::SliceInfoElem, SubsetError> {
    slice.validate()?;
    let reverse = slice.stride < 0;
    let start = to_ndarray_index(slice.start, length, reverse)?;
    let end = to_ndarray_index(slice.end, length, reverse)?;
    let (start, end) = if reverse { (end, start) } else { (start, end) };
    Ok(ndarray::SliceInfoElem::Slice {
        start,
        end: Some(end),
        step: slice.stride,
    })
}

/// Returns an [ndarray] SliceInfo object corresponding to the selection.
///
/// Dimensions beyond the end of the selection are selected in full.
pub fn build_slice_info(
    selection: &Selection,
    shape: &[usize],
) -> Result<DynSliceInfo, SubsetError> {
    if selection.len() > shape.len() {
        return Err(SubsetError::SelectionRank {
            selection: selection.len(),
            rank: shape.len(),
        });
    }
    let mut si = std::iter::zip(selection.slices(), shape)
        .map(|(slice, length)| to_ndarray_slice(slice, *length))
        .collect::<Result<Vec<ndarray::SliceInfoElem>, SubsetError>>()?;
    si.extend(
        shape[selection.len()..]
            .iter()
            .map(|_| ndarray::SliceInfoElem::Slice {
                start: 0,
                end: None,
                step: 1,
            }),
    );
    Ok(ndarray::SliceInfo::try_from(si)?)
}

/// Resolves a unit stride slice of an axis into the half-open range of indices it covers.
///
/// Returns `None` for other strides, whose selected indices are not contiguous.
pub fn row_span(slice: &Slice, length: usize) -> Result<Option<IndexRange>, SubsetError> {
    if slice.stride != 1 {
        return Ok(None);
    }
    let start = usize::try_from(to_ndarray_index(slice.start, length, false)?)?;
    let end = usize::try_from(to_ndarray_index(slice.end, length, false)?)?;
    Ok(Some(IndexRange::new(start, std::cmp::max(start, end))))
}
