//! PUT: create or replace an entity from the request body stream.

use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::backend::{ByteStream, Resource};
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davpath::DavPath;
use crate::DavResult;

impl DavInner {
    pub(crate) async fn handle_put(
        &self,
        path: DavPath,
        resource: Option<Resource>,
        body: ByteStream,
    ) -> DavResult<Response<Body>> {
        if resource.as_ref().map(|r| r.is_collection()) == Some(true) {
            return Err(StatusCode::METHOD_NOT_ALLOWED.into());
        }

        // the parent collection must exist.
        if !self.has_parent(&path).await {
            return Err(StatusCode::CONFLICT.into());
        }

        let exists = resource.is_some();
        let written = self.backend.write(&path, body).await?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if exists {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        if let Some(ref etag) = written.meta.etag {
            res.headers_mut().typed_insert(etag.clone());
        }
        Ok(res)
    }
}
