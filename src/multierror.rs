//! Per-resource status collection for COPY/MOVE/DELETE, and the
//! streaming `207 Multi-Status` response built from it.
//!
//! Handlers record one `(path, status)` pair per failed resource. If the
//! whole operation boils down to a single status for the request path,
//! a plain response is emitted instead of a multistatus.

use http::{Response, StatusCode};
use xml::writer::XmlEvent as XmlWEvent;

use crate::async_stream::AsyncStream;
use crate::body::Body;
use crate::davpath::DavPath;
use crate::util::MemBuffer;
use crate::xmltree_ext;
use crate::DavResult;

pub(crate) struct MultiError {
    req_path: DavPath,
    items: Vec<(DavPath, StatusCode)>,
}

impl MultiError {
    pub fn new(req_path: &DavPath) -> MultiError {
        MultiError {
            req_path: req_path.clone(),
            items: Vec::new(),
        }
    }

    /// Record a status for one resource. Duplicate reports for the same
    /// path keep the first status.
    pub fn add_status(&mut self, path: &DavPath, status: StatusCode) {
        if !self.items.iter().any(|(p, _)| p == path) {
            self.items.push((path.clone(), status));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Build the final response: `success` when nothing was recorded, a
    /// plain status when only the request path itself was, and a
    /// streamed 207 otherwise.
    pub fn into_response(self, success: StatusCode) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());
        match self.items.as_slice() {
            [] => {
                *res.status_mut() = success;
                return Ok(res);
            }
            [(path, status)] if *path == self.req_path => {
                *res.status_mut() = *status;
                return Ok(res);
            }
            _ => {}
        }

        let ct = "application/xml; charset=utf-8".parse().unwrap();
        res.headers_mut().insert("content-type", ct);
        *res.status_mut() = StatusCode::MULTI_STATUS;

        let items = self.items;
        *res.body_mut() = Body::from(AsyncStream::new(|mut tx| async move {
            let result: DavResult<()> = async {
                let mut xw = xmltree_ext::emitter(MemBuffer::new())?;
                xw.write(XmlWEvent::start_element("multistatus").default_ns("DAV:"))?;
                tx.send(xw.inner_mut().take()).await;

                for (path, status) in items {
                    xw.write(XmlWEvent::start_element("response"))?;
                    xw.write(XmlWEvent::start_element("href"))?;
                    xw.write(XmlWEvent::characters(&path.as_url_string_with_prefix()))?;
                    xw.write(XmlWEvent::end_element())?;
                    xw.write(XmlWEvent::start_element("status"))?;
                    xw.write(XmlWEvent::characters(&status_line(status)))?;
                    xw.write(XmlWEvent::end_element())?;
                    xw.write(XmlWEvent::end_element())?;
                    tx.send(xw.inner_mut().take()).await;
                }

                xw.write(XmlWEvent::end_element())?;
                tx.send(xw.inner_mut().take()).await;
                Ok(())
            }
            .await;
            result.map_err(std::io::Error::from)
        }));
        Ok(res)
    }
}

pub(crate) fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP/1.1 {} {}", status.as_u16(), reason),
        None => format!("HTTP/1.1 {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn path(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    async fn body_string(mut res: Response<Body>) -> String {
        let mut out = Vec::new();
        let body = res.body_mut();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn empty_yields_success_status() {
        let me = MultiError::new(&path("/x"));
        let res = me.into_response(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn single_request_path_failure_is_plain() {
        let mut me = MultiError::new(&path("/x"));
        me.add_status(&path("/x"), StatusCode::LOCKED);
        let res = me.into_response(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(res.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn multiple_failures_become_multistatus() {
        let mut me = MultiError::new(&path("/x/"));
        me.add_status(&path("/x/a"), StatusCode::FORBIDDEN);
        me.add_status(&path("/x/b"), StatusCode::CONFLICT);
        // duplicate is dropped
        me.add_status(&path("/x/a"), StatusCode::NOT_FOUND);
        let res = me.into_response(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(res.status(), StatusCode::MULTI_STATUS);
        let body = body_string(res).await;
        assert_eq!(body.matches("<response>").count(), 2);
        assert!(body.contains("HTTP/1.1 403 Forbidden"));
        assert!(body.contains("HTTP/1.1 409 Conflict"));
        assert!(body.contains(r#"xmlns="DAV:""#));
    }
}
