//! Batched operations over a set of structurally parallel groups or datasets.
//!
//! A [CollectionManager] holds an ordered list of handles into one [ArrayStore] and issues each
//! collection operation as a single batched store call. Operations taking a list of names accept
//! either one name, which is applied under every handle, or one name per handle. A manager with
//! a single handle applies every name under that handle.

use crate::array::ArrayData;
use crate::error::SubsetError;
use crate::metrics::record_collection_call;
use crate::models::{AttrValue, Attributes, DType, DatasetMeta, Selection};
use crate::store::{ArrayStore, AttributeRequest, NodeKind, NodePath, ReadRequest, WriteRequest};

use std::sync::Arc;
use tracing::debug;
use validator::Validate;

/// Ordered set of handles addressed as one unit.
#[derive(Clone, Debug)]
pub struct CollectionManager {
    store: Arc<dyn ArrayStore>,
    handles: Vec<NodePath>,
}

impl CollectionManager {
    /// Create a manager from a parent node and paths relative to it.
    ///
    /// With no paths the manager holds the parent itself. Every handle must exist.
    ///
    /// # Arguments
    ///
    /// * `store`: Store holding the nodes
    /// * `parent`: Node from which `paths` are resolved
    /// * `paths`: Relative paths, one per handle
    pub async fn new(
        store: Arc<dyn ArrayStore>,
        parent: &NodePath,
        paths: &[&str],
    ) -> Result<Self, SubsetError> {
        let handles = if paths.is_empty() {
            vec![parent.clone()]
        } else {
            paths.iter().map(|path| parent.join(path)).collect()
        };
        Self::existing(store, handles).await
    }

    /// Create a manager from the handles of another one.
    ///
    /// * No paths: the same handles
    /// * One path: that path resolved under every handle
    /// * One path per handle: each path resolved under its handle
    ///
    /// Any other number of paths is a [SubsetError::CountMismatch].
    pub async fn from_collection(
        collection: &CollectionManager,
        paths: &[&str],
    ) -> Result<Self, SubsetError> {
        if paths.is_empty() {
            return Ok(collection.clone());
        }
        let handles = if paths.len() == 1 {
            collection
                .handles
                .iter()
                .map(|handle| handle.join(paths[0]))
                .collect()
        } else if paths.len() == collection.count() {
            collection
                .handles
                .iter()
                .zip(paths)
                .map(|(handle, path)| handle.join(path))
                .collect()
        } else {
            return Err(SubsetError::CountMismatch {
                operation: "from_collection",
                expected: collection.count(),
                actual: paths.len(),
            });
        };
        Self::existing(collection.store.clone(), handles).await
    }

    /// Wrap handles after checking that they exist.
    async fn existing(
        store: Arc<dyn ArrayStore>,
        handles: Vec<NodePath>,
    ) -> Result<Self, SubsetError> {
        let kinds = store.node_kinds(&handles).await?;
        if let Some((handle, _)) = handles.iter().zip(&kinds).find(|(_, kind)| kind.is_none()) {
            return Err(SubsetError::NotFound {
                path: handle.to_string(),
            });
        }
        Ok(CollectionManager { store, handles })
    }

    /// Fully qualified path of each handle.
    pub fn names(&self) -> Vec<String> {
        self.handles.iter().map(NodePath::to_string).collect()
    }

    /// Number of handles.
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// The handles, in order.
    pub fn handles(&self) -> &[NodePath] {
        &self.handles
    }

    /// The store holding the handles.
    pub fn store(&self) -> &Arc<dyn ArrayStore> {
        &self.store
    }

    fn record(&self, operation: &'static str) {
        debug!(
            backend = self.store.backend(),
            operation,
            handles = self.count(),
            "collection call"
        );
        record_collection_call(self.store.backend(), operation, self.count());
    }

    /// Pair items with handles.
    ///
    /// One item, or a single handle, gives every combination in handle-major order. One item per
    /// handle pairs item `i` with handle `i`.
    fn pair<'a, T>(
        &'a self,
        operation: &'static str,
        items: &'a [T],
    ) -> Result<Vec<(&'a NodePath, &'a T)>, SubsetError> {
        if items.is_empty() {
            return Err(SubsetError::CountMismatch {
                operation,
                expected: self.count(),
                actual: 0,
            });
        }
        if items.len() == 1 || self.count() == 1 {
            Ok(self
                .handles
                .iter()
                .flat_map(|handle| items.iter().map(move |item| (handle, item)))
                .collect())
        } else if items.len() == self.count() {
            Ok(self.handles.iter().zip(items).collect())
        } else {
            Err(SubsetError::CountMismatch {
                operation,
                expected: self.count(),
                actual: items.len(),
            })
        }
    }

    /// Check that at least one entry per handle was given.
    fn check_entries(&self, operation: &'static str, entries: usize) -> Result<(), SubsetError> {
        if entries < self.count() {
            return Err(SubsetError::CountMismatch {
                operation,
                expected: self.count(),
                actual: entries,
            });
        }
        Ok(())
    }

    /// Kind of the node at each name under each handle, in handle-major order.
    ///
    /// Missing nodes are `None`.
    pub async fn child_kinds(&self, names: &[&str]) -> Result<Vec<Option<NodeKind>>, SubsetError> {
        self.record("child_kinds");
        let paths: Vec<NodePath> = self
            .handles
            .iter()
            .flat_map(|handle| names.iter().map(move |name| handle.join(name)))
            .collect();
        self.store.node_kinds(&paths).await
    }

    /// Create groups and return a manager over them.
    pub async fn create_groups(&self, names: &[&str]) -> Result<CollectionManager, SubsetError> {
        let paths: Vec<NodePath> = self
            .pair("create_groups", names)?
            .into_iter()
            .map(|(handle, name)| handle.join(name))
            .collect();
        self.record("create_groups");
        self.store.create_groups(&paths).await?;
        Ok(CollectionManager {
            store: self.store.clone(),
            handles: paths,
        })
    }

    /// Create datasets of one shape and element type and return a manager over them.
    pub async fn create_datasets(
        &self,
        names: &[&str],
        shape: &[usize],
        dtype: DType,
    ) -> Result<CollectionManager, SubsetError> {
        let meta = DatasetMeta::new(shape.to_vec(), dtype);
        let metas = vec![meta; names.len()];
        self.create_datasets_with(names, &metas).await
    }

    /// Create datasets, each with its own shape and element type, and return a manager over them.
    ///
    /// `metas[i]` describes `names[i]`.
    pub async fn create_datasets_with(
        &self,
        names: &[&str],
        metas: &[DatasetMeta],
    ) -> Result<CollectionManager, SubsetError> {
        if names.len() != metas.len() {
            return Err(SubsetError::CountMismatch {
                operation: "create_datasets",
                expected: names.len(),
                actual: metas.len(),
            });
        }
        let items: Vec<(&str, &DatasetMeta)> = names.iter().copied().zip(metas).collect();
        let requests: Vec<(NodePath, DatasetMeta)> = self
            .pair("create_datasets", &items)?
            .into_iter()
            .map(|(handle, (name, meta))| (handle.join(name), (*meta).clone()))
            .collect();
        self.record("create_datasets");
        self.store.create_datasets(&requests).await?;
        Ok(CollectionManager {
            store: self.store.clone(),
            handles: requests.into_iter().map(|(path, _)| path).collect(),
        })
    }

    /// Set attributes. `values[i]` is the value of `names[i]`.
    pub async fn set_attributes(
        &self,
        names: &[&str],
        values: &[AttrValue],
    ) -> Result<(), SubsetError> {
        if names.len() != values.len() {
            return Err(SubsetError::CountMismatch {
                operation: "set_attributes",
                expected: names.len(),
                actual: values.len(),
            });
        }
        let items: Vec<(&str, &AttrValue)> = names.iter().copied().zip(values).collect();
        let pairs = self.pair("set_attributes", &items)?;
        let requests: Vec<AttributeRequest> = pairs
            .into_iter()
            .map(|(path, (name, value))| AttributeRequest {
                path,
                name: *name,
                value: *value,
            })
            .collect();
        self.record("set_attributes");
        self.store.set_attributes(&requests).await
    }

    /// Read the named attributes of every handle.
    ///
    /// Returns one list per handle, in the order of `names`. Missing attributes are `None`.
    pub async fn get_attributes(
        &self,
        names: &[&str],
    ) -> Result<Vec<Vec<Option<AttrValue>>>, SubsetError> {
        self.record("get_attributes");
        if names.is_empty() {
            return Ok(vec![vec![]; self.count()]);
        }
        let requests: Vec<(NodePath, String)> = self
            .handles
            .iter()
            .flat_map(|handle| names.iter().map(move |name| (handle.clone(), name.to_string())))
            .collect();
        let values = self.store.get_attributes(&requests).await?;
        Ok(values.chunks(names.len()).map(<[_]>::to_vec).collect())
    }

    /// All attributes of every handle.
    pub async fn attribute_maps(&self) -> Result<Vec<Attributes>, SubsetError> {
        self.record("attribute_maps");
        futures::future::try_join_all(
            self.handles
                .iter()
                .map(|handle| self.store.attributes(handle)),
        )
        .await
    }

    /// Shape and element type of every handle. All handles must be datasets.
    pub async fn dataset_metas(&self) -> Result<Vec<DatasetMeta>, SubsetError> {
        self.record("dataset_metas");
        self.store.dataset_metas(&self.handles).await
    }

    /// Write `values[i]` into `selections[i]` of handle `i`.
    ///
    /// At least one selection and one value per handle are required. Extra entries are ignored.
    pub async fn write_selections(
        &self,
        selections: &[Selection],
        values: &[ArrayData],
    ) -> Result<(), SubsetError> {
        self.check_entries("write_selections", selections.len())?;
        self.check_entries("write_selections", values.len())?;
        check_strides(selections)?;
        let requests: Vec<WriteRequest> = self
            .handles
            .iter()
            .zip(selections)
            .zip(values)
            .map(|((path, selection), data)| WriteRequest {
                path,
                selection,
                data,
            })
            .collect();
        self.record("write_selections");
        self.store.write_selections(&requests).await
    }

    /// Read `selections[i]` of handle `i`.
    ///
    /// At least one selection per handle is required. Extra selections are ignored.
    pub async fn read_selections(
        &self,
        selections: &[Selection],
    ) -> Result<Vec<ArrayData>, SubsetError> {
        self.check_entries("read_selections", selections.len())?;
        check_strides(selections)?;
        let requests: Vec<ReadRequest> = self
            .handles
            .iter()
            .zip(selections)
            .map(|(path, selection)| ReadRequest { path, selection })
            .collect();
        self.record("read_selections");
        self.store.read_selections(&requests).await
    }

    /// Read every handle in full. Scalar datasets give `None`.
    pub async fn read_all(&self) -> Result<Vec<Option<ArrayData>>, SubsetError> {
        let metas = self.dataset_metas().await?;
        let all = Selection::all();
        let requests: Vec<ReadRequest> = self
            .handles
            .iter()
            .zip(&metas)
            .filter(|(_, meta)| meta.rank() > 0)
            .map(|(path, _)| ReadRequest {
                path,
                selection: &all,
            })
            .collect();
        self.record("read_all");
        let mut arrays = self.store.read_selections(&requests).await?.into_iter();
        Ok(metas
            .iter()
            .map(|meta| {
                if meta.rank() > 0 {
                    arrays.next()
                } else {
                    None
                }
            })
            .collect())
    }
}

/// Reject selections that the store could not apply, before any request is issued.
fn check_strides(selections: &[Selection]) -> Result<(), SubsetError> {
    selections
        .iter()
        .flat_map(Selection::slices)
        .try_for_each(Validate::validate)?;
    Ok(())
}
