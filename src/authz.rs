//! Authorization filters.
//!
//! A filter chain runs after path resolution and before precondition
//! evaluation. Filters see an already-identified principal; establishing
//! identity is the transport's job.

use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::davpath::DavPath;
use crate::util::DavMethod;

/// Verdict of one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    /// Refuse with 403.
    Deny,
    /// Refuse, but mask the resource's existence with a 404.
    DenyAs404,
}

/// One element of the authorization chain. The first non-`Allow` verdict
/// wins.
pub trait AuthorizationFilter: Debug + Send + Sync + DynClone {
    fn authorize(&self, principal: Option<&str>, path: &DavPath, method: DavMethod) -> Authorization;
}

dyn_clone::clone_trait_object!(AuthorizationFilter);
