//! Array store in a local directory tree.

use crate::array::ArrayData;
use crate::error::SubsetError;
use crate::metrics::record_store_request;
use crate::models::{AttrValue, Attributes, DatasetMeta, Selection};
use crate::store::layout::{
    self, DatasetDocument, GroupDocument, NodeDocument, DATASET_DOCUMENT, DATA_OBJECT,
    GROUP_DOCUMENT,
};
use crate::store::memory::check_new_node;
use crate::store::{ArrayStore, NodeKind, NodePath, OpenMode};

use async_trait::async_trait;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

const BACKEND: &str = "directory";

/// Array store in a local directory, using the persisted [layout].
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open the store in a directory.
    ///
    /// In [OpenMode::Read] the directory must hold a store. In [OpenMode::Write] a new store is
    /// created; a previous store in the directory is removed, but a non-empty directory holding
    /// anything else is left alone and reported as [SubsetError::AlreadyExists].
    pub async fn open(root: impl Into<PathBuf>, mode: OpenMode) -> Result<Self, SubsetError> {
        let store = DirectoryStore { root: root.into() };
        let root_document = store.root.join(GROUP_DOCUMENT);
        match mode {
            OpenMode::Read => {
                if !fs::try_exists(&root_document).await? {
                    return Err(SubsetError::NotFound {
                        path: store.root.display().to_string(),
                    });
                }
            }
            OpenMode::Write => {
                if fs::try_exists(&root_document).await? {
                    info!(root = %store.root.display(), "replacing existing store");
                    fs::remove_dir_all(&store.root).await?;
                } else if !is_empty_or_missing(&store.root).await? {
                    return Err(SubsetError::AlreadyExists {
                        path: store.root.display().to_string(),
                    });
                }
                fs::create_dir_all(&store.root).await?;
                store
                    .write_document(
                        &NodePath::root(),
                        &NodeDocument::Group(GroupDocument::default()),
                    )
                    .await?;
            }
        }
        Ok(store)
    }

    /// Returns the local path of an object belonging to a node.
    fn object_path(&self, path: &NodePath, name: &str) -> PathBuf {
        self.root.join(layout::object_key(path, name))
    }

    /// Read the document of a node, or `None` if there is no such node.
    async fn read_document(&self, path: &NodePath) -> Result<Option<NodeDocument>, SubsetError> {
        record_store_request(BACKEND, "read_document");
        if let Some(bytes) = read_optional(&self.object_path(path, DATASET_DOCUMENT)).await? {
            return Ok(Some(NodeDocument::Dataset(serde_json::from_slice(&bytes)?)));
        }
        if let Some(bytes) = read_optional(&self.object_path(path, GROUP_DOCUMENT)).await? {
            return Ok(Some(NodeDocument::Group(serde_json::from_slice(&bytes)?)));
        }
        Ok(None)
    }

    /// Read the document of a node that must exist.
    async fn document(&self, path: &NodePath) -> Result<NodeDocument, SubsetError> {
        self.read_document(path)
            .await?
            .ok_or_else(|| SubsetError::NotFound {
                path: path.to_string(),
            })
    }

    async fn write_document(
        &self,
        path: &NodePath,
        document: &NodeDocument,
    ) -> Result<(), SubsetError> {
        record_store_request(BACKEND, "write_document");
        fs::write(
            self.object_path(path, document.file_name()),
            document.to_json()?,
        )
        .await?;
        Ok(())
    }

    /// Create the directory of a new node and write its document.
    async fn create_node(
        &self,
        path: &NodePath,
        document: &NodeDocument,
    ) -> Result<(), SubsetError> {
        let exists = self.read_document(path).await?.is_some();
        let parent = path.parent().unwrap_or_else(NodePath::root);
        let parent_kind = self.read_document(&parent).await?.map(|doc| doc.kind());
        check_new_node(path, |_| parent_kind, exists)?;
        fs::create_dir(self.root.join(path.key())).await?;
        self.write_document(path, document).await
    }
}

/// Read a whole file, or `None` if it does not exist.
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SubsetError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn is_empty_or_missing(path: &Path) -> Result<bool, SubsetError> {
    match fs::read_dir(path).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_none()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl ArrayStore for DirectoryStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn node_kind(&self, path: &NodePath) -> Result<Option<NodeKind>, SubsetError> {
        Ok(self.read_document(path).await?.map(|document| document.kind()))
    }

    async fn create_group(&self, path: &NodePath) -> Result<(), SubsetError> {
        self.create_node(path, &NodeDocument::Group(GroupDocument::default()))
            .await
    }

    async fn create_dataset(
        &self,
        path: &NodePath,
        meta: &DatasetMeta,
    ) -> Result<(), SubsetError> {
        let document = DatasetDocument::new(meta);
        let size = u64::try_from(document.data_size())?;
        self.create_node(path, &NodeDocument::Dataset(document))
            .await?;
        // Allocate the full data object up front. Unwritten regions read as zeros.
        record_store_request(BACKEND, "allocate");
        let file = fs::File::create(self.object_path(path, DATA_OBJECT)).await?;
        file.set_len(size).await?;
        debug!(%path, size, "allocated dataset");
        Ok(())
    }

    async fn dataset_meta(&self, path: &NodePath) -> Result<DatasetMeta, SubsetError> {
        Ok(self.document(path).await?.into_dataset(path)?.meta())
    }

    async fn attributes(&self, path: &NodePath) -> Result<Attributes, SubsetError> {
        Ok(self.document(path).await?.attributes().clone())
    }

    async fn set_attribute(
        &self,
        path: &NodePath,
        name: &str,
        value: &AttrValue,
    ) -> Result<(), SubsetError> {
        let mut document = self.document(path).await?;
        document
            .attributes_mut()
            .insert(name.to_string(), value.clone());
        self.write_document(path, &document).await
    }

    async fn read(&self, path: &NodePath, selection: &Selection) -> Result<ArrayData, SubsetError> {
        let document = self.document(path).await?.into_dataset(path)?;
        let block = layout::row_block(&document.meta(), selection)?;
        let mut buf = vec![0; usize::try_from(block.size)?];
        if !buf.is_empty() {
            record_store_request(BACKEND, "read");
            let mut file = fs::File::open(self.object_path(path, DATA_OBJECT)).await?;
            file.seek(SeekFrom::Start(block.offset)).await?;
            file.read_exact(&mut buf).await?;
        }
        ArrayData::from_bytes(document.dtype, &block.shape, &buf, document.byte_order)?
            .slice(&block.selection)
    }

    async fn write(
        &self,
        path: &NodePath,
        selection: &Selection,
        data: &ArrayData,
    ) -> Result<(), SubsetError> {
        let document = self.document(path).await?.into_dataset(path)?;
        if document.dtype != data.dtype() {
            return Err(SubsetError::DTypeMismatch {
                expected: document.dtype,
                actual: data.dtype(),
            });
        }
        let block = layout::row_block(&document.meta(), selection)?;
        let mut buf = vec![0; usize::try_from(block.size)?];
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.object_path(path, DATA_OBJECT))
            .await?;
        if !buf.is_empty() {
            record_store_request(BACKEND, "read");
            file.seek(SeekFrom::Start(block.offset)).await?;
            file.read_exact(&mut buf).await?;
        }
        let mut array =
            ArrayData::from_bytes(document.dtype, &block.shape, &buf, document.byte_order)?;
        array.assign(&block.selection, data)?;
        if !buf.is_empty() {
            record_store_request(BACKEND, "write");
            file.seek(SeekFrom::Start(block.offset)).await?;
            file.write_all(&array.to_bytes(document.byte_order)).await?;
            file.flush().await?;
        }
        Ok(())
    }
}
