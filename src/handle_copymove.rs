//! The COPY/MOVE planner.
//!
//! The engine walks the source tree itself; the backend only copies one
//! entity at a time. Dead properties follow the resources: copied on
//! COPY, re-keyed on MOVE, and dropped from an overwritten destination
//! before anything lands there.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::backend::Resource;
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davheaders::{Depth, Destination, Overwrite};
use crate::davpath::DavPath;
use crate::davstatus::ConditionCode;
use crate::errors::{backend_error_to_status, DavError};
use crate::multierror::MultiError;
use crate::util::DavMethod;
use crate::DavResult;

impl DavInner {
    // Recursively copy a subtree, recording one status per failed
    // resource. Dead properties travel with each successfully copied
    // resource.
    fn do_copy<'a>(
        &'a self,
        source: &'a Resource,
        dest: &'a DavPath,
        depth: Depth,
        me: &'a mut MultiError,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            debug!("do_copy {} {} depth {:?}", source.path, dest, depth);

            if !source.is_collection() {
                return match self.backend.copy_file(&source.path, dest).await {
                    Ok(()) => {
                        self.copy_props(&source.path, dest);
                        Ok(())
                    }
                    Err(e) => {
                        debug!("do_copy: copy_file error: {:?}", e);
                        me.add_status(dest, backend_error_to_status(e));
                        Err(DavError::Backend(e))
                    }
                };
            }

            if let Err(e) = self.backend.make_collection(dest).await {
                debug!("do_copy: make_collection error: {:?}", e);
                me.add_status(dest, backend_error_to_status(e));
                return Err(DavError::Backend(e));
            }
            self.copy_props(&source.path, dest);

            // Depth: 0 copies just the (empty) collection.
            if depth == Depth::Zero {
                return Ok(());
            }

            let children = match self.backend.list_children(source).await {
                Ok(children) => children,
                Err(e) => {
                    me.add_status(&source.path, backend_error_to_status(e));
                    return Err(DavError::Backend(e));
                }
            };

            // record per-child errors and keep going.
            let mut result = Ok(());
            for child in &children {
                let mut ndest = dest.clone();
                ndest.push_segment(child.path.file_name_bytes());
                ndest.add_slash_if(child.is_collection());
                if let Err(e) = self.do_copy(child, &ndest, depth, me).await {
                    result = Err(e);
                }
            }
            result
        }
        .boxed()
    }

    fn copy_props(&self, from: &DavPath, to: &DavPath) {
        if let Some(ref store) = self.props {
            store.copy(from, to);
        }
    }

    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        method: DavMethod,
        resource: Option<Resource>,
        submitted: Vec<String>,
    ) -> DavResult<Response<Body>> {
        let resource = resource.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;
        let path = resource.path.clone();
        let bad = |_e| DavError::Status(StatusCode::BAD_REQUEST);

        let overwrite = req
            .headers()
            .typed_try_get::<Overwrite>()
            .map_err(bad)?
            .map_or(true, |o| o.0);

        let depth = req.headers().typed_try_get::<Depth>().map_err(bad)?;
        let depth = match (depth, resource.is_collection(), method) {
            // on a non-collection 0 and infinity are equivalent.
            (Some(Depth::Zero), false, _) => Depth::Zero,
            (Some(Depth::Infinity) | None, false, _) => Depth::Zero,
            // MOVE of a collection is always whole-tree.
            (Some(Depth::Infinity) | None, true, DavMethod::Move) => Depth::Infinity,
            (Some(Depth::Zero), true, DavMethod::Copy) => Depth::Zero,
            (Some(Depth::Infinity) | None, true, DavMethod::Copy) => Depth::Infinity,
            _ => return Err(StatusCode::BAD_REQUEST.into()),
        };

        let dest = req
            .headers()
            .typed_try_get::<Destination>()
            .map_err(bad)?
            .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;
        let mut dest = DavPath::from_str_and_prefix(&dest.0, path.prefix())?;
        dest = self.backend.canonicalize(&dest);
        dest.add_slash_if(resource.is_collection());

        // same resource, or a destination inside the source tree.
        if path == dest || path.is_ancestor_of(&dest) {
            return Err(StatusCode::FORBIDDEN.into());
        }

        // the destination's parent must exist.
        if !self.has_parent(&dest).await {
            return Err(StatusCode::CONFLICT.into());
        }

        let dest_res = self.backend.resolve(&dest).await?;
        let exists = dest_res.is_some();
        if exists && !overwrite {
            return Err(StatusCode::PRECONDITION_FAILED.into());
        }

        // the destination side needs its lock tokens submitted; the
        // source side was already checked by the dispatcher for MOVE.
        if let Some(ref locks) = self.locks {
            if locks
                .check_submitted(&dest, true, &submitted, self.principal.as_deref())
                .is_err()
            {
                return Err(ConditionCode::LockTokenSubmitted.into());
            }
        }

        let mut me = MultiError::new(&path);

        // overwrite semantics: the destination is deleted first, along
        // with its locks and dead properties.
        if let Some(dest_res) = dest_res {
            if self.delete_items(&mut me, Depth::Infinity, &dest_res).await.is_err() {
                return me.into_response(StatusCode::NO_CONTENT);
            }
            if let Some(ref locks) = self.locks {
                locks.remove_below(&dest);
            }
        }

        if method == DavMethod::Copy {
            let _ = self.do_copy(&resource, &dest, depth, &mut me).await;
            return me.into_response(success_status(exists));
        }

        // MOVE: atomic rename when the backend has one, otherwise
        // copy-then-delete. Partial copy failures leave the source alone.
        if self.backend.supports_rename() {
            if let Err(e) = self.backend.rename(&path, &dest).await {
                me.add_status(&path, backend_error_to_status(e));
                return me.into_response(success_status(exists));
            }
            if let Some(ref store) = self.props {
                store.rename(&path, &dest);
            }
        } else {
            if self.do_copy(&resource, &dest, Depth::Infinity, &mut me).await.is_err()
                || !me.is_empty()
            {
                return me.into_response(success_status(exists));
            }
            self.delete_items(&mut me, Depth::Infinity, &resource).await.ok();
        }
        if let Some(ref locks) = self.locks {
            locks.remove_below(&path);
        }
        me.into_response(success_status(exists))
    }
}

// 201 when the destination did not exist before, 204 when it did.
fn success_status(existed: bool) -> StatusCode {
    if existed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    }
}
