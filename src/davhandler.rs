//! The method dispatcher: the main entry point of the library.
//!
//! One request flows through a fixed sequence: parse method and path,
//! resolve the resource, run the authorization chain, evaluate
//! preconditions, check lock-token submission for writes, then invoke the
//! method handler. Any failure along the way short-circuits into an error
//! response; handler panics are the only thing that can escape, and
//! handlers do not panic.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use bytes::Buf;
use futures_util::StreamExt;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::authz::{Authorization, AuthorizationFilter};
use crate::backend::{ByteStream, ResourceBackend};
use crate::body::Body;
use crate::conditional::{self, Eval};
use crate::davheaders;
use crate::davpath::DavPath;
use crate::davstatus::ConditionCode;
use crate::errors::DavError;
use crate::handle_get::not_modified;
use crate::locks::LockManager;
use crate::propstore::PropertyStore;
use crate::util::{dav_method, dav_text_error, dav_xml_error, DavMethod, DavMethodSet};
use crate::DavResult;

// requests with XML bodies are buffered; cap them.
const MAX_XML_BODY: usize = 65536;

/// The webdav handler. Cheap to clone; configuration is shared.
#[derive(Clone)]
pub struct DavHandler {
    config: Arc<DavConfig>,
}

/// Configuration of the handler, builder-style.
#[derive(Default)]
pub struct DavConfig {
    /// URL prefix to strip before resolving paths.
    pub prefix: Option<String>,
    /// The resource backend. Mandatory.
    pub backend: Option<Box<dyn ResourceBackend>>,
    /// Lock manager; without one, class 2 (locking) is disabled.
    pub locks: Option<LockManager>,
    /// Dead-property store; without one, PROPPATCH of dead properties
    /// fails with 403.
    pub props: Option<Box<dyn PropertyStore>>,
    /// Authorization filter chain, run in order.
    pub authz: Vec<Box<dyn AuthorizationFilter>>,
    /// Set of allowed methods (None means "all").
    pub allow: Option<DavMethodSet>,
    /// The already-authenticated principal, used as lock owner.
    pub principal: Option<String>,
    /// Include error details (I/O messages) in 5xx bodies.
    pub show_sensitive_errors: bool,
    /// Refuse `PROPFIND` with `Depth: infinity` on collections.
    pub reject_propfind_infinite: bool,
}

impl DavConfig {
    pub fn new() -> DavConfig {
        DavConfig::default()
    }

    pub fn build_handler(self) -> DavHandler {
        DavHandler {
            config: Arc::new(self),
        }
    }

    /// Prefix to be stripped off the request path.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the resource backend.
    pub fn backend(mut self, backend: Box<dyn ResourceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the lock manager.
    pub fn lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Set the dead-property store.
    pub fn property_store(mut self, props: Box<dyn PropertyStore>) -> Self {
        self.props = Some(props);
        self
    }

    /// Append an authorization filter to the chain.
    pub fn authorization(mut self, filter: Box<dyn AuthorizationFilter>) -> Self {
        self.authz.push(filter);
        self
    }

    /// Which methods to allow (default is all).
    pub fn allow_methods(mut self, allow: DavMethodSet) -> Self {
        self.allow = Some(allow);
        self
    }

    /// The principal new locks are owned by.
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Disclose backend error details in 5xx responses.
    pub fn show_sensitive_errors(mut self, show: bool) -> Self {
        self.show_sensitive_errors = show;
        self
    }

    /// Refuse infinite-depth PROPFIND with `DAV:propfind-finite-depth`.
    pub fn reject_propfind_infinite(mut self, reject: bool) -> Self {
        self.reject_propfind_infinite = reject;
        self
    }
}

// Per-request state, cloned out of the shared config.
pub(crate) struct DavInner {
    pub prefix: String,
    pub backend: Box<dyn ResourceBackend>,
    pub locks: Option<LockManager>,
    pub props: Option<Box<dyn PropertyStore>>,
    pub authz: Vec<Box<dyn AuthorizationFilter>>,
    pub allow: Option<DavMethodSet>,
    pub principal: Option<String>,
    pub show_sensitive_errors: bool,
    pub reject_propfind_infinite: bool,
}

impl Clone for DavInner {
    fn clone(&self) -> Self {
        DavInner {
            prefix: self.prefix.clone(),
            backend: self.backend.clone(),
            locks: self.locks.clone(),
            props: self.props.clone(),
            authz: self.authz.clone(),
            allow: self.allow,
            principal: self.principal.clone(),
            show_sensitive_errors: self.show_sensitive_errors,
            reject_propfind_infinite: self.reject_propfind_infinite,
        }
    }
}

impl From<&DavConfig> for DavInner {
    fn from(cfg: &DavConfig) -> Self {
        DavInner {
            prefix: cfg.prefix.clone().unwrap_or_default(),
            backend: cfg.backend.clone().expect("DavConfig without a backend"),
            locks: cfg.locks.clone(),
            props: cfg.props.clone(),
            authz: cfg.authz.clone(),
            allow: cfg.allow,
            principal: cfg.principal.clone(),
            show_sensitive_errors: cfg.show_sensitive_errors,
            reject_propfind_infinite: cfg.reject_propfind_infinite,
        }
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder() -> DavConfig {
        DavConfig::new()
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: http_body::Body<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        if self.config.backend.is_none() {
            return unconfigured();
        }
        let inner = DavInner::from(&*self.config);
        inner.handle(req).await
    }

    /// Handle a webdav request, overriding parts of the configuration.
    /// Typically used to set the `principal` after authentication.
    pub async fn handle_with<ReqBody, ReqData, ReqError>(
        &self,
        config: DavConfig,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: http_body::Body<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        let orig = &*self.config;
        let newconf = DavConfig {
            prefix: config.prefix.or_else(|| orig.prefix.clone()),
            backend: config.backend.or_else(|| orig.backend.clone()),
            locks: config.locks.or_else(|| orig.locks.clone()),
            props: config.props.or_else(|| orig.props.clone()),
            authz: if config.authz.is_empty() {
                orig.authz.clone()
            } else {
                config.authz
            },
            allow: config.allow.or(orig.allow),
            principal: config.principal.or_else(|| orig.principal.clone()),
            show_sensitive_errors: config.show_sensitive_errors || orig.show_sensitive_errors,
            reject_propfind_infinite: config.reject_propfind_infinite
                || orig.reject_propfind_infinite,
        };
        if newconf.backend.is_none() {
            return unconfigured();
        }
        let inner = DavInner::from(&newconf);
        inner.handle(req).await
    }
}

// a handler without a backend serves nothing.
fn unconfigured() -> Response<Body> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = StatusCode::NOT_FOUND;
    res
}

impl DavInner {
    // helper: does the parent collection of `path` exist?
    pub(crate) async fn has_parent(&self, path: &DavPath) -> bool {
        match self.backend.resolve(&path.parent()).await {
            Ok(Some(res)) => res.is_collection(),
            _ => false,
        }
    }

    // turn the incoming http_body into a plain byte stream.
    fn byte_stream<ReqBody, ReqData, ReqError>(body: ReqBody) -> ByteStream
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: http_body::Body<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        let stream = http_body_util::BodyStream::new(body).filter_map(|res| async move {
            match res {
                Ok(frame) => match frame.into_data() {
                    Ok(mut data) => Some(Ok(data.copy_to_bytes(data.remaining()))),
                    Err(_) => None, // trailers
                },
                Err(e) => Some(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    e.to_string(),
                ))),
            }
        });
        Box::pin(stream)
    }

    // buffer a request body, capped.
    async fn read_request(&self, body: &mut ByteStream, max_size: usize) -> DavResult<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > max_size {
                return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    async fn handle<ReqBody, ReqData, ReqError>(self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: http_body::Body<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        let (parts, body) = req.into_parts();
        let method_str = parts.method.to_string();
        let path_str = parts.uri.path().to_string();
        let req = Request::from_parts(parts, ());
        let body = Self::byte_stream(body);

        let show_sensitive = self.show_sensitive_errors;
        match self.handle2(&req, body).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK ({})", resp.status());
                resp
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                error_response(&method_str, &path_str, &err, show_sensitive)
            }
        }
    }

    async fn handle2(self, req: &Request<()>, mut body: ByteStream) -> DavResult<Response<Body>> {
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(_) => {
                // an unrecognized method still gets a 405 that names the
                // methods which would have worked on this resource.
                debug!("refusing method {} request {}", req.method(), req.uri());
                let path = DavPath::from_uri_and_prefix(req.uri(), &self.prefix)?;
                let resource = self.backend.resolve(&path).await?;
                let mut res = Response::new(Body::empty());
                *res.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
                self.dav_headers(res.headers_mut(), &path, resource.as_ref());
                return Ok(res);
            }
        };

        // the method must be in the configured set.
        if let Some(ref allow) = self.allow {
            if !allow.contains(method) {
                debug!("method {} not allowed on request {}", req.method(), req.uri());
                return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
            }
        }

        let path = DavPath::from_uri_and_prefix(req.uri(), &self.prefix)?;

        // requests must not arrive content-encoded; the core does not
        // decode entity bodies.
        if let Some(enc) = req.headers().get("content-encoding") {
            if enc.as_bytes() != b"identity" {
                return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
            }
        }

        // PUT streams its body; everything else gets a buffered Vec.
        let (body, body_data) = match method {
            DavMethod::Put => (Some(body), Vec::new()),
            _ => {
                let data = self.read_request(&mut body, MAX_XML_BODY).await?;
                (None, data)
            }
        };

        // not all methods accept a body.
        match method {
            DavMethod::Put | DavMethod::PropFind | DavMethod::PropPatch | DavMethod::Lock => {}
            _ => {
                if !body_data.is_empty() {
                    return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
                }
            }
        }

        debug!("== START REQUEST {:?} {}", method, path);

        // OPTIONS * short-circuits resolution.
        if path.is_star() {
            return if method == DavMethod::Options {
                self.handle_options(&path, None).await
            } else {
                Err(StatusCode::BAD_REQUEST.into())
            };
        }

        // resolve the resource; the canonical path from the backend
        // (trailing slash included) replaces the request path.
        let path = self.backend.canonicalize(&path);
        let resource = self.backend.resolve(&path).await?;
        let (path, fixed_location) = match resource {
            Some(ref r) if r.path.as_bytes() != path.as_bytes() => {
                // e.g. a collection requested without its trailing slash.
                (r.path.clone(), Some(r.path.as_url_string_with_prefix()))
            }
            Some(ref r) => (r.path.clone(), None),
            None => (path, None),
        };

        // authorization chain: first non-allow verdict wins.
        for filter in &self.authz {
            match filter.authorize(self.principal.as_deref(), &path, method) {
                Authorization::Allow => {}
                Authorization::Deny => return Err(StatusCode::FORBIDDEN.into()),
                Authorization::DenyAs404 => return Err(StatusCode::NOT_FOUND.into()),
            }
        }

        // unmapped paths are only good for the creating methods.
        if resource.is_none() {
            match method {
                DavMethod::Put | DavMethod::MkCol | DavMethod::Lock | DavMethod::Options => {}
                _ => return Err(StatusCode::NOT_FOUND.into()),
            }
        }

        // conditional headers, RFC 7232 ones first, then the DAV If.
        let (eval, submitted) = conditional::evaluate(
            req,
            method,
            resource.as_ref(),
            &*self.backend,
            self.locks.as_ref(),
            &path,
        )
        .await?;
        match eval {
            Eval::Pass => {}
            Eval::NotModified(etag) => {
                return if method == DavMethod::Get || method == DavMethod::Head {
                    Ok(not_modified(etag))
                } else {
                    Err(StatusCode::PRECONDITION_FAILED.into())
                };
            }
            Eval::PreconditionFailed => return Err(StatusCode::PRECONDITION_FAILED.into()),
        }

        // writes against locked resources need their tokens submitted.
        if method.is_write() {
            if let Some(ref locks) = self.locks {
                let deep = matches!(method, DavMethod::Delete | DavMethod::Move);
                if locks
                    .check_submitted(&path, deep, &submitted, self.principal.as_deref())
                    .is_err()
                {
                    return Err(ConditionCode::LockTokenSubmitted.into());
                }
            }
        }

        let res = match method {
            DavMethod::Options => self.handle_options(&path, resource.as_ref()).await,
            DavMethod::Head => self.handle_get(resource, true).await,
            DavMethod::Get => self.handle_get(resource, false).await,
            DavMethod::Put => self.handle_put(path, resource, body.unwrap()).await,
            DavMethod::PropFind => self.handle_propfind(req, resource, body_data).await,
            DavMethod::PropPatch => self.handle_proppatch(req, path, resource, body_data).await,
            DavMethod::MkCol => self.handle_mkcol(path).await,
            DavMethod::Delete => self.handle_delete(req, resource).await,
            DavMethod::Copy | DavMethod::Move => {
                self.handle_copymove(req, method, resource, submitted).await
            }
            DavMethod::Lock => {
                self.handle_lock(req, path, resource, body_data, submitted)
                    .await
            }
            DavMethod::Unlock => self.handle_unlock(req, path).await,
            DavMethod::Post | DavMethod::Trace => {
                // recognized, never served; answer with the methods that
                // would have worked.
                let mut res = Response::new(Body::empty());
                *res.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
                self.dav_headers(res.headers_mut(), &path, resource.as_ref());
                Ok(res)
            }
        };

        // point the client at the canonical location when the request
        // path was fixed up.
        let mut res = res?;
        if let Some(location) = fixed_location {
            res.headers_mut()
                .typed_insert(davheaders::ContentLocation(location));
        }
        Ok(res)
    }
}

// Build the error response: plain text by default, the `DAV:error`
// document when the condition code defines an XML element.
fn error_response(
    method: &str,
    path: &str,
    err: &DavError,
    show_sensitive: bool,
) -> Response<Body> {
    let status = err.statuscode();
    let code = err.condition();
    let mut res = Response::new(Body::empty());
    *res.status_mut() = status;
    if err.must_close() {
        res.headers_mut()
            .insert("connection", "close".parse().unwrap());
    }

    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return res;
    }

    if let Some(elem) = code.xml_error() {
        let ct = "application/xml; charset=utf-8".parse().unwrap();
        res.headers_mut().insert("content-type", ct);
        *res.body_mut() = dav_xml_error(elem);
        return res;
    }

    let message = if status.is_server_error() && show_sensitive {
        err.to_string()
    } else {
        code.message().to_string()
    };
    let ct = "text/plain; charset=utf-8".parse().unwrap();
    res.headers_mut().insert("content-type", ct);
    *res.body_mut() = dav_text_error(method, path, status.as_u16(), &message);
    res
}
