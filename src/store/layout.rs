//! Persisted store layout shared by the directory and remote backends.
//!
//! Each node is a directory (or object prefix) named after its path.
//!
//! * A group holds `.group.json`, containing `{"attributes": {...}}`.
//! * A dataset holds `.dataset.json`, containing
//!   `{"dtype": ..., "shape": [...], "byte_order": ..., "attributes": {...}}`, and `data`, the
//!   elements in row-major order.

use crate::array::row_span;
use crate::error::SubsetError;
use crate::models::{Attributes, DType, DatasetMeta, Selection, Slice};
use crate::store::{NodeKind, NodePath};
use crate::types::{ByteOrder, NATIVE_BYTE_ORDER};

use serde::{Deserialize, Serialize};

/// Name of the group document.
pub const GROUP_DOCUMENT: &str = ".group.json";
/// Name of the dataset document.
pub const DATASET_DOCUMENT: &str = ".dataset.json";
/// Name of the dataset element data.
pub const DATA_OBJECT: &str = "data";

/// Contents of `.group.json`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GroupDocument {
    #[serde(default)]
    pub attributes: Attributes,
}

/// Contents of `.dataset.json`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DatasetDocument {
    pub dtype: DType,
    pub shape: Vec<usize>,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub attributes: Attributes,
}

impl DatasetDocument {
    /// Describe a new dataset, stored in the host's byte order.
    pub fn new(meta: &DatasetMeta) -> Self {
        DatasetDocument {
            dtype: meta.dtype,
            shape: meta.shape.clone(),
            byte_order: NATIVE_BYTE_ORDER,
            attributes: Attributes::new(),
        }
    }

    /// Returns the shape and element type of the dataset.
    pub fn meta(&self) -> DatasetMeta {
        DatasetMeta::new(self.shape.clone(), self.dtype)
    }

    /// Size of the data object in bytes.
    pub fn data_size(&self) -> usize {
        self.shape.iter().product::<usize>() * self.dtype.size_of()
    }
}

/// Document of either kind of node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeDocument {
    Group(GroupDocument),
    Dataset(DatasetDocument),
}

impl NodeDocument {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeDocument::Group(_) => NodeKind::Group,
            NodeDocument::Dataset(_) => NodeKind::Dataset,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            NodeDocument::Group(group) => &group.attributes,
            NodeDocument::Dataset(dataset) => &dataset.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            NodeDocument::Group(group) => &mut group.attributes,
            NodeDocument::Dataset(dataset) => &mut dataset.attributes,
        }
    }

    /// Returns the dataset document, or [SubsetError::NotADataset] for groups.
    pub fn into_dataset(self, path: &NodePath) -> Result<DatasetDocument, SubsetError> {
        match self {
            NodeDocument::Dataset(dataset) => Ok(dataset),
            NodeDocument::Group(_) => Err(SubsetError::NotADataset {
                path: path.to_string(),
            }),
        }
    }

    /// Name of the document object for this kind of node.
    pub fn file_name(&self) -> &'static str {
        match self {
            NodeDocument::Group(_) => GROUP_DOCUMENT,
            NodeDocument::Dataset(_) => DATASET_DOCUMENT,
        }
    }

    /// Serialise the document to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, SubsetError> {
        Ok(match self {
            NodeDocument::Group(group) => serde_json::to_vec_pretty(group)?,
            NodeDocument::Dataset(dataset) => serde_json::to_vec_pretty(dataset)?,
        })
    }
}

/// Returns the key of an object belonging to a node, relative to the store root.
pub fn object_key(path: &NodePath, name: &str) -> String {
    if path.is_root() {
        name.to_string()
    } else {
        format!("{}/{}", path.key(), name)
    }
}

/// A contiguous block of rows of a dataset's data object that covers a selection.
#[derive(Debug, PartialEq)]
pub struct RowBlock {
    /// Byte offset of the block in the data object.
    pub offset: u64,
    /// Size of the block in bytes.
    pub size: u64,
    /// Shape of the block.
    pub shape: Vec<usize>,
    /// Selection to apply to the block to obtain the requested selection.
    pub selection: Selection,
}

/// Plan the block of rows to transfer for a selection.
///
/// Only the leading dimension is narrowed, and only for unit stride slices. Other selections
/// transfer the whole dataset.
pub fn row_block(meta: &DatasetMeta, selection: &Selection) -> Result<RowBlock, SubsetError> {
    if selection.len() > meta.rank() {
        return Err(SubsetError::SelectionRank {
            selection: selection.len(),
            rank: meta.rank(),
        });
    }
    let element_size = meta.dtype.size_of();
    let Some((&rows, trailing)) = meta.shape.split_first() else {
        return Ok(RowBlock {
            offset: 0,
            size: u64::try_from(element_size)?,
            shape: vec![],
            selection: Selection::all(),
        });
    };
    let row_size = trailing.iter().product::<usize>() * element_size;
    let span = match selection.slices().first() {
        Some(first) => row_span(first, rows)?,
        None => None,
    };
    let (start, count, selection) = match span {
        Some(span) => {
            let mut slices = vec![Slice::new(0, isize::try_from(span.len())?, 1)];
            slices.extend_from_slice(&selection.slices()[1..]);
            (span.min, span.len(), Selection(slices))
        }
        None => (0, rows, selection.clone()),
    };
    let mut shape = vec![count];
    shape.extend_from_slice(trailing);
    Ok(RowBlock {
        offset: u64::try_from(start * row_size)?,
        size: u64::try_from(count * row_size)?,
        shape,
        selection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::IndexRange;

    #[test]
    fn dataset_document_json() {
        let document: DatasetDocument =
            serde_json::from_str(r#"{"dtype": "float64", "shape": [10, 2]}"#).unwrap();
        assert_eq!(DType::Float64, document.dtype);
        assert_eq!(ByteOrder::Little, document.byte_order);
        assert!(document.attributes.is_empty());
        assert_eq!(160, document.data_size());
    }

    #[test]
    fn group_document_json() {
        let document: GroupDocument =
            serde_json::from_str(r#"{"attributes": {"min_lat": 15.0}}"#).unwrap();
        assert_eq!(Some(&serde_json::json!(15.0)), document.attributes.get("min_lat"));
        let document = NodeDocument::Group(document);
        assert_eq!(NodeKind::Group, document.kind());
        assert_eq!(GROUP_DOCUMENT, document.file_name());
    }

    #[test]
    fn dataset_document_round_trip() {
        let meta = DatasetMeta::new(vec![3], DType::Int8);
        let document = NodeDocument::Dataset(DatasetDocument::new(&meta));
        let json = document.to_json().unwrap();
        let parsed: DatasetDocument = serde_json::from_slice(&json).unwrap();
        assert_eq!(meta, parsed.meta());
        assert_eq!(NATIVE_BYTE_ORDER, parsed.byte_order);
    }

    #[test]
    fn into_dataset_of_group() {
        let document = NodeDocument::Group(GroupDocument::default());
        assert!(matches!(
            document.into_dataset(&NodePath::parse("/gt1l")).unwrap_err(),
            SubsetError::NotADataset { .. }
        ));
    }

    #[test]
    fn object_keys() {
        assert_eq!(".group.json", object_key(&NodePath::root(), GROUP_DOCUMENT));
        assert_eq!(
            "gt1l/heights/h_ph/data",
            object_key(&NodePath::parse("/gt1l/heights/h_ph"), DATA_OBJECT)
        );
    }

    #[test]
    fn row_block_rows() {
        let meta = DatasetMeta::new(vec![10, 5], DType::Int16);
        let block = row_block(&meta, &Selection::rows(IndexRange::new(2, 5))).unwrap();
        assert_eq!(
            RowBlock {
                offset: 20,
                size: 30,
                shape: vec![3, 5],
                selection: Selection(vec![Slice::new(0, 3, 1)]),
            },
            block
        );
    }

    #[test]
    fn row_block_keeps_trailing_slices() {
        let meta = DatasetMeta::new(vec![10, 5], DType::Uint8);
        let selection = Selection(vec![Slice::new(-2, 10, 1), Slice::new(1, 2, 1)]);
        let block = row_block(&meta, &selection).unwrap();
        assert_eq!(40, block.offset);
        assert_eq!(10, block.size);
        assert_eq!(
            Selection(vec![Slice::new(0, 2, 1), Slice::new(1, 2, 1)]),
            block.selection
        );
    }

    #[test]
    fn row_block_strided() {
        let meta = DatasetMeta::new(vec![10], DType::Float32);
        let selection = Selection(vec![Slice::new(0, 10, 2)]);
        let block = row_block(&meta, &selection).unwrap();
        assert_eq!((0, 40), (block.offset, block.size));
        assert_eq!(selection, block.selection);
    }

    #[test]
    fn row_block_all() {
        let meta = DatasetMeta::new(vec![4, 2], DType::Float64);
        let block = row_block(&meta, &Selection::all()).unwrap();
        assert_eq!((0, 64), (block.offset, block.size));
        assert_eq!(vec![4, 2], block.shape);
    }

    #[test]
    fn row_block_scalar() {
        let meta = DatasetMeta::new(vec![], DType::Int32);
        let block = row_block(&meta, &Selection::all()).unwrap();
        assert_eq!((0, 4), (block.offset, block.size));
        assert!(block.shape.is_empty());
    }

    #[test]
    fn row_block_empty_span() {
        let meta = DatasetMeta::new(vec![10], DType::Float32);
        let block = row_block(&meta, &Selection::rows(IndexRange::new(4, 4))).unwrap();
        assert_eq!((16, 0), (block.offset, block.size));
        assert_eq!(vec![0], block.shape);
    }

    #[test]
    fn row_block_rank_too_small() {
        let meta = DatasetMeta::new(vec![], DType::Int32);
        assert!(matches!(
            row_block(&meta, &Selection::rows(IndexRange::new(0, 1))).unwrap_err(),
            SubsetError::SelectionRank { .. }
        ));
    }
}
