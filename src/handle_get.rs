//! GET and HEAD. The core only dispatches: the entity body comes
//! straight from the backend, range handling and content negotiation are
//! backend concerns.

use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::backend::Resource;
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::errors::DavError;
use crate::util::datetime_to_httpdate;
use crate::DavResult;

impl DavInner {
    pub(crate) async fn handle_get(
        &self,
        resource: Option<Resource>,
        head: bool,
    ) -> DavResult<Response<Body>> {
        let resource = resource.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::OK;
        entity_headers(&mut res, &resource);

        if head {
            return Ok(res);
        }

        let stream = self.backend.read(&resource).await?;
        *res.body_mut() = Body::from(crate::async_stream::AsyncStream::new(|mut tx| async move {
            use futures_util::StreamExt;
            let mut stream = stream;
            while let Some(chunk) = stream.next().await {
                tx.send(chunk?).await;
            }
            Ok(())
        }));
        Ok(res)
    }
}

pub(crate) fn entity_headers(res: &mut Response<Body>, resource: &Resource) {
    if let Some(ref etag) = resource.meta.etag {
        res.headers_mut().typed_insert(etag.clone());
    }
    if let Some(ref modified) = resource.meta.modified {
        if let Ok(value) = datetime_to_httpdate(modified).parse() {
            res.headers_mut().insert("last-modified", value);
        }
    }
    if let Some(ref ct) = resource.meta.content_type {
        if let Ok(value) = ct.parse() {
            res.headers_mut().insert("content-type", value);
        }
    }
    if let Some(len) = resource.meta.len {
        res.headers_mut().insert("content-length", len.into());
    }
}

// a bodyless 304 with the current ETag echoed.
pub(crate) fn not_modified(etag: Option<crate::davheaders::ETag>) -> Response<Body> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = StatusCode::NOT_MODIFIED;
    if let Some(etag) = etag {
        res.headers_mut().typed_insert(etag);
    }
    res
}
