//! DELETE, with per-member failure reporting.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::backend::{BackendError, Resource};
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davheaders::Depth;
use crate::errors::{backend_error_to_status, DavError};
use crate::multierror::MultiError;
use crate::DavResult;

// directory deletes map "still has entries" differently.
fn dir_status(e: BackendError) -> StatusCode {
    match e {
        BackendError::Exists => StatusCode::CONFLICT,
        e => backend_error_to_status(e),
    }
}

impl DavInner {
    // Recursively delete a subtree, recording one status per failed
    // resource. Children that fail keep their parent alive.
    pub(crate) fn delete_items<'a>(
        &'a self,
        me: &'a mut MultiError,
        depth: Depth,
        resource: &'a Resource,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            let path = &resource.path;
            if !resource.is_collection() {
                debug!("delete_items (file) {}", path);
                return match self.backend.delete(path).await {
                    Ok(()) => {
                        self.drop_meta(path);
                        Ok(())
                    }
                    Err(e) => {
                        me.add_status(path, backend_error_to_status(e));
                        Err(DavError::Backend(e))
                    }
                };
            }
            if depth == Depth::Zero {
                debug!("delete_items (dir, depth 0) {}", path);
                return match self.backend.delete(path).await {
                    Ok(()) => {
                        self.drop_meta(path);
                        Ok(())
                    }
                    Err(e) => {
                        me.add_status(path, dir_status(e));
                        Err(DavError::Backend(e))
                    }
                };
            }

            debug!("delete_items (recurse) {}", path);
            let children = match self.backend.list_children(resource).await {
                Ok(children) => children,
                Err(e) => {
                    me.add_status(path, backend_error_to_status(e));
                    return Err(DavError::Backend(e));
                }
            };

            // keep going on per-child errors; the last one is returned.
            let mut result = Ok(());
            for child in &children {
                if let Err(e) = self.delete_items(me, depth, child).await {
                    match e {
                        DavError::Backend(_) | DavError::Status(_) => result = Err(e),
                        _ => return Err(e),
                    }
                }
            }
            result?;

            match self.backend.delete(path).await {
                Ok(()) => {
                    self.drop_meta(path);
                    Ok(())
                }
                Err(e) => {
                    me.add_status(path, dir_status(e));
                    Err(DavError::Backend(e))
                }
            }
        }
        .boxed()
    }

    // a deleted resource loses its dead properties.
    fn drop_meta(&self, path: &crate::davpath::DavPath) {
        if let Some(ref store) = self.props {
            store.remove(path);
        }
    }

    pub(crate) async fn handle_delete(
        &self,
        req: &Request<()>,
        resource: Option<Resource>,
    ) -> DavResult<Response<Body>> {
        // RFC 4918 9.6.1: DELETE on a collection acts as if
        // Depth: infinity was used; we also accept an explicit 0.
        let depth = match req
            .headers()
            .typed_try_get::<Depth>()
            .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
        {
            Some(Depth::Infinity) | None => Depth::Infinity,
            Some(Depth::Zero) => Depth::Zero,
            Some(Depth::One) => return Err(StatusCode::BAD_REQUEST.into()),
        };

        let resource = resource.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;

        let mut me = MultiError::new(&resource.path);
        if self.delete_items(&mut me, depth, &resource).await.is_ok() {
            if let Some(ref locks) = self.locks {
                locks.remove_below(&resource.path);
            }
        }
        me.into_response(StatusCode::NO_CONTENT)
    }
}
