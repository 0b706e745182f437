//! Array store capability interface and backend factory.
//!
//! An [ArrayStore] holds a hierarchy of groups and datasets addressed by [NodePath]. Groups and
//! datasets both carry attributes. Datasets are n-dimensional arrays that are read and written
//! through selections.
//!
//! Every single-node operation has a batched counterpart taking a list of per-node requests and
//! returning per-node results in request order. The default batched implementations issue one
//! call per request, in order. Backends with per-request latency override them to coalesce the
//! requests.

pub mod directory;
pub mod http;
pub mod layout;
pub mod memory;
pub mod remote;
pub mod s3;

use crate::array::ArrayData;
use crate::error::SubsetError;
use crate::models::{AttrValue, Attributes, DatasetMeta, Selection};
use crate::s3_client::S3Credentials;

use async_trait::async_trait;
use expanduser::expanduser;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Absolute path of a node in an [ArrayStore].
///
/// Paths are normalised: they start with `/`, have no trailing or repeated separators, and the
/// root group is `/`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodePath(String);

impl NodePath {
    /// The root group.
    pub fn root() -> Self {
        NodePath("/".to_string())
    }

    /// Parse and normalise a path. Relative paths are resolved from the root.
    pub fn parse(path: &str) -> Self {
        NodePath::root().join(path)
    }

    /// Resolve `relative` under this path.
    ///
    /// A path starting with `/` is absolute and replaces this one.
    pub fn join(&self, relative: &str) -> Self {
        let base = if relative.starts_with('/') {
            ""
        } else {
            self.key()
        };
        let components: Vec<&str> = base
            .split('/')
            .chain(relative.split('/'))
            .filter(|component| !component.is_empty())
            .collect();
        NodePath(format!("/{}", components.join("/")))
    }

    /// Returns the path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path without its leading separator. The root's key is empty.
    pub fn key(&self) -> &str {
        &self.0[1..]
    }

    /// Returns true for the root group.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns the last component of the path. The root's name is empty.
    pub fn name(&self) -> &str {
        self.components().last().unwrap_or("")
    }

    /// Returns the parent path, or `None` for the root group.
    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        let key = self.key();
        Some(match key.rfind('/') {
            Some(index) => NodePath(format!("/{}", &key[..index])),
            None => NodePath::root(),
        })
    }

    /// Iterate over the components of the path.
    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.key().split('/').filter(|component| !component.is_empty())
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodePath {
    fn from(path: &str) -> Self {
        NodePath::parse(path)
    }
}

/// Kind of a node in an [ArrayStore].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    Group,
    Dataset,
}

/// Mode in which to open a store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Open an existing store for reading.
    Read,
    /// Create a new, empty store, replacing any previous store at the location.
    Write,
}

/// A selection read from one dataset.
#[derive(Clone, Copy, Debug)]
pub struct ReadRequest<'a> {
    pub path: &'a NodePath,
    pub selection: &'a Selection,
}

/// A selection written to one dataset.
#[derive(Clone, Copy, Debug)]
pub struct WriteRequest<'a> {
    pub path: &'a NodePath,
    pub selection: &'a Selection,
    pub data: &'a ArrayData,
}

/// An attribute written to one node.
#[derive(Clone, Copy, Debug)]
pub struct AttributeRequest<'a> {
    pub path: &'a NodePath,
    pub name: &'a str,
    pub value: &'a AttrValue,
}

/// Hierarchical array store.
#[async_trait]
pub trait ArrayStore: Send + Sync + std::fmt::Debug {
    /// Short backend name used in metrics and logs.
    fn backend(&self) -> &'static str;

    /// Returns the kind of node at a path, or `None` if there is no such node.
    async fn node_kind(&self, path: &NodePath) -> Result<Option<NodeKind>, SubsetError>;

    /// Create a group. The parent must be an existing group.
    async fn create_group(&self, path: &NodePath) -> Result<(), SubsetError>;

    /// Create a zero-filled dataset. The parent must be an existing group.
    async fn create_dataset(&self, path: &NodePath, meta: &DatasetMeta)
        -> Result<(), SubsetError>;

    /// Returns the shape and element type of a dataset.
    async fn dataset_meta(&self, path: &NodePath) -> Result<DatasetMeta, SubsetError>;

    /// Returns all attributes of a group or dataset.
    async fn attributes(&self, path: &NodePath) -> Result<Attributes, SubsetError>;

    /// Set one attribute of a group or dataset, replacing any previous value.
    async fn set_attribute(
        &self,
        path: &NodePath,
        name: &str,
        value: &AttrValue,
    ) -> Result<(), SubsetError>;

    /// Read a selection of a dataset.
    async fn read(&self, path: &NodePath, selection: &Selection)
        -> Result<ArrayData, SubsetError>;

    /// Write data into a selection of a dataset. The selected region must match the data's shape.
    async fn write(
        &self,
        path: &NodePath,
        selection: &Selection,
        data: &ArrayData,
    ) -> Result<(), SubsetError>;

    /// Batched [ArrayStore::node_kind].
    async fn node_kinds(&self, paths: &[NodePath]) -> Result<Vec<Option<NodeKind>>, SubsetError> {
        let mut kinds = Vec::with_capacity(paths.len());
        for path in paths {
            kinds.push(self.node_kind(path).await?);
        }
        Ok(kinds)
    }

    /// Batched [ArrayStore::create_group].
    async fn create_groups(&self, paths: &[NodePath]) -> Result<(), SubsetError> {
        for path in paths {
            self.create_group(path).await?;
        }
        Ok(())
    }

    /// Batched [ArrayStore::create_dataset].
    async fn create_datasets(
        &self,
        requests: &[(NodePath, DatasetMeta)],
    ) -> Result<(), SubsetError> {
        for (path, meta) in requests {
            self.create_dataset(path, meta).await?;
        }
        Ok(())
    }

    /// Batched [ArrayStore::dataset_meta].
    async fn dataset_metas(&self, paths: &[NodePath]) -> Result<Vec<DatasetMeta>, SubsetError> {
        let mut metas = Vec::with_capacity(paths.len());
        for path in paths {
            metas.push(self.dataset_meta(path).await?);
        }
        Ok(metas)
    }

    /// Returns one attribute of each node, or `None` where the node lacks the attribute.
    async fn get_attributes(
        &self,
        requests: &[(NodePath, String)],
    ) -> Result<Vec<Option<AttrValue>>, SubsetError> {
        let mut values = Vec::with_capacity(requests.len());
        for (path, name) in requests {
            values.push(self.attributes(path).await?.remove(name));
        }
        Ok(values)
    }

    /// Batched [ArrayStore::set_attribute].
    async fn set_attributes(&self, requests: &[AttributeRequest<'_>]) -> Result<(), SubsetError> {
        for request in requests {
            self.set_attribute(request.path, request.name, request.value)
                .await?;
        }
        Ok(())
    }

    /// Batched [ArrayStore::read].
    async fn read_selections(
        &self,
        requests: &[ReadRequest<'_>],
    ) -> Result<Vec<ArrayData>, SubsetError> {
        let mut arrays = Vec::with_capacity(requests.len());
        for request in requests {
            arrays.push(self.read(request.path, request.selection).await?);
        }
        Ok(arrays)
    }

    /// Batched [ArrayStore::write].
    async fn write_selections(&self, requests: &[WriteRequest<'_>]) -> Result<(), SubsetError> {
        for request in requests {
            self.write(request.path, request.selection, request.data)
                .await?;
        }
        Ok(())
    }
}

/// Options for backends that talk to remote services.
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    /// S3-compatible endpoint. When unset the AWS endpoint for the region is used.
    pub s3_endpoint: Option<Url>,
    /// AWS region.
    pub aws_region: String,
    /// Object storage credentials.
    pub credentials: S3Credentials,
    /// Maximum number of concurrent remote requests.
    pub connection_limit: Option<usize>,
}

/// Open the store at a location.
///
/// The backend is chosen by the location's URI scheme:
///
/// * `mem://`: new in-process store
/// * `s3://bucket/prefix`: S3 objects (read only)
/// * `http://` or `https://`: objects served over HTTP (read only)
/// * `file://` or a plain path: local directory
///
/// # Arguments
///
/// * `location`: Location of the store
/// * `mode`: Read an existing store, or create a new one
/// * `options`: Options for remote backends
pub async fn open_store(
    location: &str,
    mode: OpenMode,
    options: &StoreOptions,
) -> Result<Arc<dyn ArrayStore>, SubsetError> {
    info!(location, ?mode, "opening store");
    let store: Arc<dyn ArrayStore> = match location.split_once("://") {
        Some(("mem", _)) => Arc::new(memory::MemoryStore::new()),
        Some(("s3", path)) => {
            require_read_only(location, mode)?;
            let (bucket, prefix) = path.split_once('/').unwrap_or((path, ""));
            if bucket.is_empty() {
                return Err(SubsetError::UnsupportedLocation {
                    location: location.to_string(),
                });
            }
            let downloader = s3::S3Downloader::new(bucket, prefix, options).await;
            Arc::new(remote::RemoteStore::new(downloader, options.connection_limit))
        }
        Some(("http", _)) | Some(("https", _)) => {
            require_read_only(location, mode)?;
            let downloader = http::HttpDownloader::new(Url::parse(location)?);
            Arc::new(remote::RemoteStore::new(downloader, options.connection_limit))
        }
        Some(("file", path)) => {
            Arc::new(directory::DirectoryStore::open(expanduser(path)?, mode).await?)
        }
        Some(_) => {
            return Err(SubsetError::UnsupportedLocation {
                location: location.to_string(),
            })
        }
        None => Arc::new(directory::DirectoryStore::open(expanduser(location)?, mode).await?),
    };
    Ok(store)
}

fn require_read_only(location: &str, mode: OpenMode) -> Result<(), SubsetError> {
    match mode {
        OpenMode::Read => Ok(()),
        OpenMode::Write => Err(SubsetError::ReadOnly {
            location: location.to_string(),
        }),
    }
}
