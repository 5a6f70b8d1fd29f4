//! ## WebDAV protocol engine
//!
//! [`WebDAV`] (RFC 4918) is HTTP plus hierarchical collections, arbitrary
//! typed properties (RFC 4316), and resource locks. This crate is the
//! protocol CORE of a WebDAV class 1/2 server: it turns `http::Request`s
//! for the WebDAV method set into standards-conformant responses, and
//! leaves storage, transport, and authentication to its collaborators.
//!
//! ## Boundary interfaces.
//!
//! - you supply a [resource backend][ResourceBackend] for storage; an
//!   in-memory implementation ([`MemBackend`]) is included.
//! - the built-in [lock manager][LockManager] keeps active locks in
//!   memory; a [`LockStore`] hook lets you persist them across restarts.
//! - dead properties go through a [`PropertyStore`]; an in-memory one
//!   ([`MemPropStore`]) is included.
//! - an [`AuthorizationFilter`] chain can allow, deny, or mask resources
//!   per request; the principal itself comes from your authentication
//!   layer via [`DavConfig::principal`].
//!
//! The handler works with the standard types from the `http` and
//! `http_body` crates, so it plugs straight into hyper, axum, warp, and
//! friends.
//!
//! ## Example.
//!
//! ```
//! use dav_core::{DavHandler, LockManager, MemBackend, MemPropStore};
//!
//! let handler = DavHandler::builder()
//!     .backend(MemBackend::new())
//!     .lock_manager(LockManager::new())
//!     .property_store(MemPropStore::new())
//!     .build_handler();
//! # let _ = handler;
//! ```
//!
//! [`WebDAV`]: http://webdav.org/

#[macro_use]
extern crate log;

mod async_stream;
mod conditional;
mod davhandler;
mod davheaders;
mod davstatus;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_get;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod membackend;
mod multierror;
mod propstore;
mod typedvalue;
mod util;
mod xmltree_ext;

pub mod authz;
pub mod backend;
pub mod body;
pub mod davpath;
pub mod locks;

use crate::errors::DavError;

pub(crate) type DavResult<T> = Result<T, DavError>;

pub use crate::authz::{Authorization, AuthorizationFilter};
pub use crate::backend::{
    BackendError, BackendResult, ByteStream, Resource, ResourceBackend, ResourceKind, ResourceMeta,
};
pub use crate::body::Body;
pub use crate::davhandler::{DavConfig, DavHandler};
pub use crate::davheaders::ETag;
pub use crate::davpath::DavPath;
pub use crate::davstatus::ConditionCode;
pub use crate::locks::{
    ActiveLock, LockDepth, LockError, LockManager, LockStore, LockTypeName, MemLockStore,
};
pub use crate::membackend::MemBackend;
pub use crate::propstore::{MemPropStore, PropName, PropOp, PropertyStore, StoredProp};
pub use crate::typedvalue::{TypedValue, XsType};
pub use crate::util::{DavMethod, DavMethodSet};
