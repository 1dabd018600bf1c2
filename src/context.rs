//! Per-call execution context
//!
//! A [`CallContext`] is an immutable chain of values rooted at the incoming
//! call metadata. Deriving a context never touches the parent, so a handler
//! can hold the original and the derived context side by side.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::Request;

/// Immutable key/value carrier associated with one call
#[derive(Clone)]
pub struct CallContext {
    node: Arc<Node>,
}

enum Node {
    Root {
        metadata: MetadataMap,
    },
    Value {
        parent: CallContext,
        key: TypeId,
        value: Arc<dyn Any + Send + Sync>,
    },
}

impl CallContext {
    /// Create a root context for a call carrying the given metadata
    pub fn new(metadata: MetadataMap) -> Self {
        Self {
            node: Arc::new(Node::Root { metadata }),
        }
    }

    /// Create a root context from a tonic request's metadata
    pub fn from_request<T>(request: &Request<T>) -> Self {
        Self::new(request.metadata().clone())
    }

    /// Incoming call metadata
    pub fn metadata(&self) -> &MetadataMap {
        let mut current = self;
        loop {
            match current.node.as_ref() {
                Node::Root { metadata } => return metadata,
                Node::Value { parent, .. } => current = parent,
            }
        }
    }

    /// Derive a new context binding `value` under the key type `K`
    ///
    /// Bindings under the same key shadow earlier ones.
    pub fn with_value<K: 'static, V: Any + Send + Sync>(&self, value: V) -> Self {
        Self {
            node: Arc::new(Node::Value {
                parent: self.clone(),
                key: TypeId::of::<K>(),
                value: Arc::new(value),
            }),
        }
    }

    /// Look up the nearest value bound under `K`
    ///
    /// Returns `None` when nothing is bound or the bound value is not a `V`.
    pub fn value<K: 'static, V: Any>(&self) -> Option<&V> {
        let wanted = TypeId::of::<K>();
        let mut current = self;
        loop {
            match current.node.as_ref() {
                Node::Root { .. } => return None,
                Node::Value { parent, key, value } => {
                    if *key == wanted {
                        return value.downcast_ref::<V>();
                    }
                    current = parent;
                }
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(MetadataMap::new())
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0usize;
        let mut current = self;
        while let Node::Value { parent, .. } = current.node.as_ref() {
            depth += 1;
            current = parent;
        }
        f.debug_struct("CallContext")
            // Metadata carries credentials, so only its size is shown
            .field("metadata_entries", &self.metadata().len())
            .field("values", &depth)
            .finish()
    }
}
