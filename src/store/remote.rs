//! Read-only array store backed by remote objects.
//!
//! The store reads the persisted [layout] through an [ObjectDownloader]. Node documents are
//! cached after the first request. Dataset reads fetch the block of rows covering the selection
//! with a single ranged request.
//!
//! Batched calls are issued concurrently, bounded by the connection limit, so a batch costs
//! roughly one round trip instead of one per node.

use crate::array::ArrayData;
use crate::error::SubsetError;
use crate::metrics::record_store_request;
use crate::models::{AttrValue, Attributes, DatasetMeta, Selection};
use crate::resource_manager::ResourceManager;
use crate::store::layout::{self, NodeDocument, DATASET_DOCUMENT, DATA_OBJECT, GROUP_DOCUMENT};
use crate::store::{ArrayStore, NodeKind, NodePath, ReadRequest};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Object downloader trait.
///
/// Defines the interface used by [RemoteStore] to fetch objects from a remote service.
#[async_trait]
pub trait ObjectDownloader: Send + Sync + std::fmt::Debug {
    /// Short backend name used in metrics and logs.
    fn backend(&self) -> &'static str;

    /// Returns the full location of an object, for messages.
    fn describe(&self, key: &str) -> String;

    /// Download an object, or part of one.
    ///
    /// Returns [SubsetError::NotFound] if there is no such object.
    ///
    /// # Arguments
    ///
    /// * `key`: Key of the object relative to the store root
    /// * `range`: Optional `(offset, size)` byte range. The size must be non-zero.
    async fn download(&self, key: &str, range: Option<(u64, u64)>) -> Result<Bytes, SubsetError>;
}

/// Read-only array store that downloads the persisted layout.
#[derive(Debug)]
pub struct RemoteStore<D> {
    downloader: D,
    resource_manager: ResourceManager,
    /// Node documents by path. `None` records a path with no node.
    documents: RwLock<HashMap<NodePath, Option<NodeDocument>>>,
}

impl<D: ObjectDownloader> RemoteStore<D> {
    /// Create a new remote store.
    ///
    /// # Arguments
    ///
    /// * `downloader`: Downloader for the store's objects
    /// * `connection_limit`: Optional limit on concurrent downloads
    pub fn new(downloader: D, connection_limit: Option<usize>) -> Self {
        RemoteStore {
            downloader,
            resource_manager: ResourceManager::new(connection_limit),
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Download an object, or `None` if it does not exist.
    async fn fetch(
        &self,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Option<Bytes>, SubsetError> {
        // Acquire connection permit to be freed via drop when this function returns
        let _conn_permits = self.resource_manager.connection().await?;
        record_store_request(self.downloader.backend(), "get");
        match self.downloader.download(key, range).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(SubsetError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Read the document of a node, or `None` if there is no such node.
    async fn read_document(&self, path: &NodePath) -> Result<Option<NodeDocument>, SubsetError> {
        // Common case: return a cached document.
        {
            let documents = self.documents.read().await;
            if let Some(document) = documents.get(path) {
                return Ok(document.clone());
            }
        }
        let dataset_key = layout::object_key(path, DATASET_DOCUMENT);
        let group_key = layout::object_key(path, GROUP_DOCUMENT);
        let document = if let Some(bytes) = self.fetch(&dataset_key, None).await? {
            Some(NodeDocument::Dataset(serde_json::from_slice(&bytes)?))
        } else if let Some(bytes) = self.fetch(&group_key, None).await? {
            Some(NodeDocument::Group(serde_json::from_slice(&bytes)?))
        } else {
            None
        };
        debug!(%path, kind = ?document.as_ref().map(NodeDocument::kind), "fetched node document");
        // Concurrent lookups of the same path insert identical documents.
        self.documents
            .write()
            .await
            .insert(path.clone(), document.clone());
        Ok(document)
    }

    /// Read the document of a node that must exist.
    async fn document(&self, path: &NodePath) -> Result<NodeDocument, SubsetError> {
        self.read_document(path)
            .await?
            .ok_or_else(|| SubsetError::NotFound {
                path: path.to_string(),
            })
    }

    fn read_only(&self) -> SubsetError {
        SubsetError::ReadOnly {
            location: self.downloader.describe(""),
        }
    }
}

#[async_trait]
impl<D: ObjectDownloader> ArrayStore for RemoteStore<D> {
    fn backend(&self) -> &'static str {
        self.downloader.backend()
    }

    async fn node_kind(&self, path: &NodePath) -> Result<Option<NodeKind>, SubsetError> {
        Ok(self.read_document(path).await?.map(|document| document.kind()))
    }

    async fn create_group(&self, _path: &NodePath) -> Result<(), SubsetError> {
        Err(self.read_only())
    }

    async fn create_dataset(
        &self,
        _path: &NodePath,
        _meta: &DatasetMeta,
    ) -> Result<(), SubsetError> {
        Err(self.read_only())
    }

    async fn dataset_meta(&self, path: &NodePath) -> Result<DatasetMeta, SubsetError> {
        Ok(self.document(path).await?.into_dataset(path)?.meta())
    }

    async fn attributes(&self, path: &NodePath) -> Result<Attributes, SubsetError> {
        Ok(self.document(path).await?.attributes().clone())
    }

    async fn set_attribute(
        &self,
        _path: &NodePath,
        _name: &str,
        _value: &AttrValue,
    ) -> Result<(), SubsetError> {
        Err(self.read_only())
    }

    async fn read(&self, path: &NodePath, selection: &Selection) -> Result<ArrayData, SubsetError> {
        let document = self.document(path).await?.into_dataset(path)?;
        let block = layout::row_block(&document.meta(), selection)?;
        let bytes = if block.size == 0 {
            Bytes::new()
        } else {
            let key = layout::object_key(path, DATA_OBJECT);
            self.fetch(&key, Some((block.offset, block.size)))
                .await?
                .ok_or_else(|| SubsetError::NotFound {
                    path: self.downloader.describe(&key),
                })?
        };
        ArrayData::from_bytes(document.dtype, &block.shape, &bytes, document.byte_order)?
            .slice(&block.selection)
    }

    async fn write(
        &self,
        _path: &NodePath,
        _selection: &Selection,
        _data: &ArrayData,
    ) -> Result<(), SubsetError> {
        Err(self.read_only())
    }

    async fn node_kinds(&self, paths: &[NodePath]) -> Result<Vec<Option<NodeKind>>, SubsetError> {
        try_join_all(paths.iter().map(|path| self.node_kind(path))).await
    }

    async fn dataset_metas(&self, paths: &[NodePath]) -> Result<Vec<DatasetMeta>, SubsetError> {
        try_join_all(paths.iter().map(|path| self.dataset_meta(path))).await
    }

    async fn get_attributes(
        &self,
        requests: &[(NodePath, String)],
    ) -> Result<Vec<Option<AttrValue>>, SubsetError> {
        try_join_all(requests.iter().map(|(path, name)| async move {
            Ok::<_, SubsetError>(self.attributes(path).await?.remove(name))
        }))
        .await
    }

    async fn read_selections(
        &self,
        requests: &[ReadRequest<'_>],
    ) -> Result<Vec<ArrayData>, SubsetError> {
        try_join_all(
            requests
                .iter()
                .map(|request| self.read(request.path, request.selection)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::{DType, IndexRange};
    use crate::store::directory::DirectoryStore;
    use crate::store::OpenMode;
    use ndarray::array;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves objects from a local directory and counts downloads.
    #[derive(Debug)]
    struct LocalDownloader {
        root: PathBuf,
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl ObjectDownloader for LocalDownloader {
        fn backend(&self) -> &'static str {
            "local"
        }

        fn describe(&self, key: &str) -> String {
            format!("local://{}", key)
        }

        async fn download(
            &self,
            key: &str,
            range: Option<(u64, u64)>,
        ) -> Result<Bytes, SubsetError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let data = match tokio::fs::read(self.root.join(key)).await {
                Ok(data) => data,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SubsetError::NotFound {
                        path: self.describe(key),
                    })
                }
                Err(err) => return Err(err.into()),
            };
            let data = match range {
                Some((offset, size)) => data[offset as usize..(offset + size) as usize].to_vec(),
                None => data,
            };
            Ok(data.into())
        }
    }

    async fn make_store() -> (PathBuf, RemoteStore<LocalDownloader>) {
        let root = std::env::temp_dir().join(format!("trackslice-{}", uuid::Uuid::new_v4()));
        let source = DirectoryStore::open(&root, OpenMode::Write).await.unwrap();
        let track = NodePath::parse("/gt1l");
        source.create_group(&track).await.unwrap();
        source
            .set_attribute(&track, "description", &json!("ground track"))
            .await
            .unwrap();
        for (name, values) in [
            ("lat", array![10.0, 20.0, 30.0, 40.0]),
            ("lon", array![0.0, 0.0, 0.0, 0.0]),
        ] {
            let path = track.join(name);
            source
                .create_dataset(&path, &DatasetMeta::new(vec![4], DType::Float64))
                .await
                .unwrap();
            source
                .write(&path, &Selection::all(), &ArrayData::from(values.into_dyn()))
                .await
                .unwrap();
        }
        let downloader = LocalDownloader {
            root: root.clone(),
            downloads: AtomicUsize::new(0),
        };
        (root, RemoteStore::new(downloader, Some(2)))
    }

    #[tokio::test]
    async fn read_selection() {
        let (root, store) = make_store().await;
        let lat = NodePath::parse("/gt1l/lat");
        assert_eq!(
            ArrayData::from(array![20.0, 30.0].into_dyn()),
            store
                .read(&lat, &Selection::rows(IndexRange::new(1, 3)))
                .await
                .unwrap()
        );
        assert_eq!(
            DatasetMeta::new(vec![4], DType::Float64),
            store.dataset_meta(&lat).await.unwrap()
        );
        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn documents_are_cached() {
        let (root, store) = make_store().await;
        let track = NodePath::parse("/gt1l");
        assert_eq!(Some(NodeKind::Group), store.node_kind(&track).await.unwrap());
        // Dataset document miss, then group document hit.
        assert_eq!(2, store.downloader.downloads.load(Ordering::SeqCst));
        assert_eq!(
            Some(&json!("ground track")),
            store.attributes(&track).await.unwrap().get("description")
        );
        assert_eq!(2, store.downloader.downloads.load(Ordering::SeqCst));
        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn batched_reads_in_request_order() {
        let (root, store) = make_store().await;
        let paths = [NodePath::parse("/gt1l/lat"), NodePath::parse("/gt1l/lon")];
        let all = Selection::all();
        let requests: Vec<ReadRequest> = paths
            .iter()
            .map(|path| ReadRequest {
                path,
                selection: &all,
            })
            .collect();
        let arrays = store.read_selections(&requests).await.unwrap();
        assert_eq!(
            vec![
                ArrayData::from(array![10.0, 20.0, 30.0, 40.0].into_dyn()),
                ArrayData::from(array![0.0, 0.0, 0.0, 0.0].into_dyn()),
            ],
            arrays
        );
        let kinds = store
            .node_kinds(&[paths[0].clone(), NodePath::parse("/gt2l")])
            .await
            .unwrap();
        assert_eq!(vec![Some(NodeKind::Dataset), None], kinds);
        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn missing_attribute_is_none() {
        let (root, store) = make_store().await;
        let values = store
            .get_attributes(&[
                (NodePath::parse("/gt1l"), "description".to_string()),
                (NodePath::parse("/gt1l"), "missing".to_string()),
            ])
            .await
            .unwrap();
        assert_eq!(vec![Some(json!("ground track")), None], values);
        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn writes_are_rejected() {
        let (root, store) = make_store().await;
        assert!(matches!(
            store
                .create_group(&NodePath::parse("/gt2l"))
                .await
                .unwrap_err(),
            SubsetError::ReadOnly { .. }
        ));
        assert!(matches!(
            store
                .set_attribute(&NodePath::root(), "min_lat", &json!(1.0))
                .await
                .unwrap_err(),
            SubsetError::ReadOnly { .. }
        ));
        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn read_missing_node() {
        let (root, store) = make_store().await;
        assert!(matches!(
            store
                .read(&NodePath::parse("/gt2l/lat"), &Selection::all())
                .await
                .unwrap_err(),
            SubsetError::NotFound { .. }
        ));
        tokio::fs::remove_dir_all(root).await.unwrap();
    }
}
