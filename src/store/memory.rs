//! In-process array store.

use crate::array::ArrayData;
use crate::error::SubsetError;
use crate::models::{AttrValue, Attributes, DatasetMeta, Selection};
use crate::store::{ArrayStore, NodeKind, NodePath};

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
enum Node {
    Group {
        attributes: Attributes,
    },
    Dataset {
        attributes: Attributes,
        data: ArrayData,
    },
}

impl Node {
    fn kind(&self) -> NodeKind {
        match self {
            Node::Group { .. } => NodeKind::Group,
            Node::Dataset { .. } => NodeKind::Dataset,
        }
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Node::Group { attributes } => attributes,
            Node::Dataset { attributes, .. } => attributes,
        }
    }
}

/// Array store held in memory.
///
/// Nodes are kept in a map keyed by path. The root group exists from construction.
#[derive(Debug)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<NodePath, Node>>,
}

impl MemoryStore {
    /// Create an empty store containing only the root group.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            NodePath::root(),
            Node::Group {
                attributes: Attributes::new(),
            },
        );
        MemoryStore {
            nodes: RwLock::new(nodes),
        }
    }

    /// Insert a new node after checking that its parent is a group and that it does not exist.
    async fn insert(&self, path: &NodePath, node: Node) -> Result<(), SubsetError> {
        let mut nodes = self.nodes.write().await;
        check_new_node(path, |parent| nodes.get(parent).map(Node::kind), nodes.contains_key(path))?;
        nodes.insert(path.clone(), node);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that a node can be created at `path`.
///
/// # Arguments
///
/// * `path`: Path of the new node
/// * `parent_kind`: Returns the kind of the node at a path, if any
/// * `exists`: Whether a node already exists at `path`
pub(crate) fn check_new_node(
    path: &NodePath,
    parent_kind: impl FnOnce(&NodePath) -> Option<NodeKind>,
    exists: bool,
) -> Result<(), SubsetError> {
    if exists {
        return Err(SubsetError::AlreadyExists {
            path: path.to_string(),
        });
    }
    // The root always exists, so any new node has a parent.
    let parent = path.parent().unwrap_or_else(NodePath::root);
    match parent_kind(&parent) {
        Some(NodeKind::Group) => Ok(()),
        Some(NodeKind::Dataset) => Err(SubsetError::NotAGroup {
            path: parent.to_string(),
        }),
        None => Err(SubsetError::NotFound {
            path: parent.to_string(),
        }),
    }
}

fn not_found(path: &NodePath) -> SubsetError {
    SubsetError::NotFound {
        path: path.to_string(),
    }
}

#[async_trait]
impl ArrayStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn node_kind(&self, path: &NodePath) -> Result<Option<NodeKind>, SubsetError> {
        Ok(self.nodes.read().await.get(path).map(Node::kind))
    }

    async fn create_group(&self, path: &NodePath) -> Result<(), SubsetError> {
        self.insert(
            path,
            Node::Group {
                attributes: Attributes::new(),
            },
        )
        .await
    }

    async fn create_dataset(
        &self,
        path: &NodePath,
        meta: &DatasetMeta,
    ) -> Result<(), SubsetError> {
        self.insert(
            path,
            Node::Dataset {
                attributes: Attributes::new(),
                data: ArrayData::zeros(meta.dtype, &meta.shape),
            },
        )
        .await
    }

    async fn dataset_meta(&self, path: &NodePath) -> Result<DatasetMeta, SubsetError> {
        match self.nodes.read().await.get(path) {
            Some(Node::Dataset { data, .. }) => Ok(data.meta()),
            Some(Node::Group { .. }) => Err(SubsetError::NotADataset {
                path: path.to_string(),
            }),
            None => Err(not_found(path)),
        }
    }

    async fn attributes(&self, path: &NodePath) -> Result<Attributes, SubsetError> {
        match self.nodes.read().await.get(path) {
            Some(Node::Group { attributes }) | Some(Node::Dataset { attributes, .. }) => {
                Ok(attributes.clone())
            }
            None => Err(not_found(path)),
        }
    }

    async fn set_attribute(
        &self,
        path: &NodePath,
        name: &str,
        value: &AttrValue,
    ) -> Result<(), SubsetError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.get_mut(path).ok_or_else(|| not_found(path))?;
        node.attributes_mut().insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn read(&self, path: &NodePath, selection: &Selection) -> Result<ArrayData, SubsetError> {
        match self.nodes.read().await.get(path) {
            Some(Node::Dataset { data, .. }) => data.slice(selection),
            Some(Node::Group { .. }) => Err(SubsetError::NotADataset {
                path: path.to_string(),
            }),
            None => Err(not_found(path)),
        }
    }

    async fn write(
        &self,
        path: &NodePath,
        selection: &Selection,
        data: &ArrayData,
    ) -> Result<(), SubsetError> {
        match self.nodes.write().await.get_mut(path) {
            Some(Node::Dataset { data: dest, .. }) => dest.assign(selection, data),
            Some(Node::Group { .. }) => Err(SubsetError::NotADataset {
                path: path.to_string(),
            }),
            None => Err(not_found(path)),
        }
    }
}
