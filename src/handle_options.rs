//! OPTIONS, and the Allow/DAV headers shared with 405 responses.

use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::backend::Resource;
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::util::DavMethod;
use crate::DavResult;

impl DavInner {
    pub(crate) async fn handle_options(
        &self,
        path: &DavPath,
        resource: Option<&Resource>,
    ) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::OK;
        self.dav_headers(res.headers_mut(), path, resource);
        res.headers_mut().insert("content-length", 0.into());
        Ok(res)
    }

    /// Set the `DAV:` compliance-class header and the `Allow` header for
    /// this resource. Also used on `405 Method Not Allowed` responses.
    pub(crate) fn dav_headers(
        &self,
        headers: &mut http::HeaderMap,
        path: &DavPath,
        resource: Option<&Resource>,
    ) {
        let class = if self.locks.is_some() { "1, 2" } else { "1" };
        headers.typed_insert(davheaders::Dav(class.to_string()));

        let allow = self
            .allowed_methods(path, resource)
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = allow.parse() {
            headers.insert("allow", value);
        }
    }

    // the methods valid on this resource, filtered through the backend's
    // capabilities and the configured method set.
    pub(crate) fn allowed_methods(
        &self,
        path: &DavPath,
        resource: Option<&Resource>,
    ) -> Vec<DavMethod> {
        use DavMethod::*;

        let backend_set = self.backend.options(resource);
        let mut v = Vec::new();
        let mut add = |m: DavMethod| {
            let locking = matches!(m, Lock | Unlock);
            if (!locking || self.locks.is_some())
                && backend_set.contains(m)
                && self.allow.map_or(true, |a| a.contains(m))
            {
                v.push(m);
            }
        };

        match resource {
            // unmapped: only the creating methods apply.
            None if !path.is_star() => {
                for m in [Options, Put, MkCol, Lock] {
                    add(m);
                }
            }
            _ => {
                let is_file = resource.map_or(true, |r| !r.is_collection());
                if is_file {
                    for m in [Head, Get, Put] {
                        add(m);
                    }
                }
                for m in [Options, PropFind, PropPatch, Copy] {
                    add(m);
                }
                if path.as_bytes() != b"/" {
                    for m in [Move, Delete] {
                        add(m);
                    }
                }
                for m in [Lock, Unlock] {
                    add(m);
                }
            }
        }
        v
    }
}
