//! The resource backend boundary.
//!
//! A [`ResourceBackend`] exposes a hierarchical namespace of resources -
//! collections and plain entities - to the protocol engine. The engine
//! never touches storage directly: everything it knows about a resource
//! comes through [`resolve`](ResourceBackend::resolve) and the metadata on
//! the returned [`Resource`].

use std::fmt::Debug;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dyn_clone::DynClone;
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;

use crate::davheaders::ETag;
use crate::davpath::DavPath;
use crate::propstore::PropName;
use crate::typedvalue::TypedValue;
use crate::util::DavMethodSet;

/// Errors a backend operation can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
    InsufficientStorage,
    TooLarge,
}

impl std::error::Error for BackendError {}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
pub type BackendFuture<'a, T> = BoxFuture<'a, BackendResult<T>>;

/// A stream of entity-body bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// Collection or plain entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Collection,
    NonCollection,
}

/// Entity metadata carried by every resolved resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceMeta {
    /// Entity length; collections have none.
    pub len: Option<u64>,
    /// Last modification instant, whole seconds, UTC.
    pub modified: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created: Option<DateTime<Utc>>,
    /// The current entity tag.
    pub etag: Option<ETag>,
    /// Media type of the entity body.
    pub content_type: Option<String>,
}

/// A resolved resource: canonical path, kind, and metadata.
#[derive(Debug, Clone)]
pub struct Resource {
    pub path: DavPath,
    pub kind: ResourceKind,
    pub meta: ResourceMeta,
}

impl Resource {
    pub fn is_collection(&self) -> bool {
        self.kind == ResourceKind::Collection
    }
}

/// The backing resource model, plugged in by the embedder.
///
/// All I/O methods are async; the engine treats every call as a potential
/// suspension point and holds no shared-state locks across them.
pub trait ResourceBackend: Debug + Send + Sync + DynClone {
    /// Resolve a path to a resource. `None` for unmapped paths.
    fn resolve<'a>(&'a self, path: &'a DavPath) -> BackendFuture<'a, Option<Resource>>;

    /// Rewrite a request path into its canonical form. The default is the
    /// identity; backends with case-insensitive namespaces override this.
    fn canonicalize(&self, path: &DavPath) -> DavPath {
        path.clone()
    }

    /// The methods the backend supports for this resource (or for an
    /// unmapped path when `resource` is `None`).
    fn options(&self, resource: Option<&Resource>) -> DavMethodSet {
        let _ = resource;
        DavMethodSet::WEBDAV_RW
    }

    /// Open the entity body for reading.
    fn read<'a>(&'a self, resource: &'a Resource) -> BackendFuture<'a, ByteStream>;

    /// Create or replace the entity at `path` from a byte stream.
    /// Returns the resulting resource (with fresh metadata).
    fn write<'a>(&'a self, path: &'a DavPath, body: ByteStream) -> BackendFuture<'a, Resource>;

    /// Create a collection. `NotFound` if the parent does not exist,
    /// `Exists` if the path is already mapped.
    fn make_collection<'a>(&'a self, path: &'a DavPath) -> BackendFuture<'a, ()>;

    /// Delete a single resource. Collections must be empty by the time
    /// this is called; the engine recurses bottom-up.
    fn delete<'a>(&'a self, path: &'a DavPath) -> BackendFuture<'a, ()>;

    /// Copy a single non-collection entity.
    fn copy_file<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> BackendFuture<'a, ()>;

    /// Atomically rename a resource (with its subtree). Only called when
    /// [`supports_rename`](ResourceBackend::supports_rename) is true.
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> BackendFuture<'a, ()> {
        let _ = (from, to);
        Box::pin(async { Err(BackendError::NotImplemented) })
    }

    /// Whether [`rename`](ResourceBackend::rename) is atomic within this
    /// backend. When false, MOVE falls back to copy-then-delete.
    fn supports_rename(&self) -> bool {
        false
    }

    /// The members of a collection. Finite, possibly unordered.
    fn list_children<'a>(&'a self, resource: &'a Resource) -> BackendFuture<'a, Vec<Resource>>;

    /// Extra live properties beyond the DAV: minimum set the engine
    /// computes itself.
    fn live_properties<'a>(
        &'a self,
        resource: &'a Resource,
    ) -> BackendFuture<'a, Vec<(PropName, TypedValue)>> {
        let _ = resource;
        Box::pin(async { Ok(Vec::new()) })
    }
}

dyn_clone::clone_trait_object!(ResourceBackend);
