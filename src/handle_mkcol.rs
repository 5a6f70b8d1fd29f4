//! MKCOL.

use http::{Response, StatusCode};

use crate::backend::BackendError;
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::DavResult;

impl DavInner {
    pub(crate) async fn handle_mkcol(&self, path: DavPath) -> DavResult<Response<Body>> {
        match self.backend.make_collection(&path).await {
            // RFC 4918 9.3.1 MKCOL status codes.
            Err(BackendError::Exists) => Err(StatusCode::METHOD_NOT_ALLOWED.into()),
            Err(BackendError::NotFound) => Err(StatusCode::CONFLICT.into()),
            Err(e) => Err(DavError::Backend(e)),
            Ok(()) => {
                let mut res = Response::new(Body::empty());
                *res.status_mut() = StatusCode::CREATED;
                Ok(res)
            }
        }
    }
}
