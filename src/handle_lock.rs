//! LOCK and UNLOCK.

use std::io::Cursor;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xmltree::Element;

use crate::backend::Resource;
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davheaders::{self, DavTimeout, Depth};
use crate::davpath::DavPath;
use crate::davstatus::ConditionCode;
use crate::errors::DavError;
use crate::locks::{ActiveLock, LockDepth, LockError, LockManager, LockTypeName};
use crate::util::MemBuffer;
use crate::xmltree_ext::{self, ElementExt};
use crate::DavResult;

impl DavInner {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        path: DavPath,
        resource: Option<Resource>,
        xmldata: Vec<u8>,
        submitted: Vec<String>,
    ) -> DavResult<Response<Body>> {
        let locks = match self.locks {
            Some(ref locks) => locks,
            None => return Err(StatusCode::METHOD_NOT_ALLOWED.into()),
        };
        let principal = self.principal.as_deref();

        // an empty body means "refresh".
        if xmldata.is_empty() {
            if submitted.len() != 1 {
                return Err(StatusCode::BAD_REQUEST.into());
            }
            let timeout = requested_timeout(req)?;
            let lock = locks
                .refresh_lock(&submitted[0], &path, principal, timeout)
                .map_err(|_| DavError::Status(StatusCode::PRECONDITION_FAILED))?;
            return lock_response(&lock, StatusCode::OK);
        }

        let deep = match req
            .headers()
            .typed_try_get::<Depth>()
            .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
        {
            Some(Depth::Infinity) | None => LockDepth::Infinity,
            Some(Depth::Zero) => LockDepth::Zero,
            Some(Depth::One) => return Err(StatusCode::BAD_REQUEST.into()),
        };

        // parse the lockinfo body.
        let tree = xmltree_ext::parse_xml(Cursor::new(&xmldata))?;
        if tree.name != "lockinfo" || tree.namespace.as_deref() != Some("DAV:") {
            return Err(DavError::XmlParseError);
        }

        let mut exclusive: Option<bool> = None;
        let mut owner: Option<Element> = None;
        let mut locktype = false;
        for elem in &tree.children {
            match elem.name.as_str() {
                "lockscope" if elem.children.len() == 1 => {
                    match elem.children[0].name.as_str() {
                        "exclusive" => exclusive = Some(true),
                        "shared" => exclusive = Some(false),
                        _ => return Err(DavError::XmlParseError),
                    }
                }
                "locktype" if elem.children.len() == 1 => {
                    match elem.children[0].name.as_str() {
                        "write" => locktype = true,
                        _ => return Err(DavError::XmlParseError),
                    }
                }
                // preserved verbatim, xml:lang and all.
                "owner" => owner = Some(elem.clone()),
                _ => return Err(DavError::XmlParseError),
            }
        }
        let exclusive = match (exclusive, locktype) {
            (Some(e), true) => e,
            _ => return Err(DavError::XmlParseError),
        };

        let timeout = requested_timeout(req)?;
        let lock = match locks.add_lock(
            &path,
            LockTypeName::write(),
            exclusive,
            deep,
            timeout,
            owner.as_ref(),
            principal,
        ) {
            Ok(lock) => lock,
            Err(LockError::Conflict(_)) => return Err(ConditionCode::NoConflictingLock.into()),
            Err(LockError::LimitReached) => {
                return Err(StatusCode::INSUFFICIENT_STORAGE.into());
            }
        };

        // a LOCK on an unmapped URL registers the lock; the resource
        // stays unmapped until a write creates it.
        let status = if resource.is_none() {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        let mut res = lock_response(&lock, status)?;
        res.headers_mut()
            .typed_insert(davheaders::LockToken(lock.token.clone()));
        Ok(res)
    }

    pub(crate) async fn handle_unlock(
        &self,
        req: &Request<()>,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        let locks = match self.locks {
            Some(ref locks) => locks,
            None => return Err(StatusCode::METHOD_NOT_ALLOWED.into()),
        };

        let token = req
            .headers()
            .typed_try_get::<davheaders::LockToken>()
            .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
            .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;

        match locks.remove_lock(&token.0, &path, self.principal.as_deref()) {
            Ok(()) => {
                let mut res = Response::new(Body::empty());
                *res.status_mut() = StatusCode::NO_CONTENT;
                Ok(res)
            }
            Err(()) => Err(StatusCode::CONFLICT.into()),
        }
    }
}

// The first Timeout value we are willing to honor; the manager clamps
// further. 0 means "no expiration".
fn requested_timeout(req: &Request<()>) -> DavResult<u64> {
    let hdr = req
        .headers()
        .typed_try_get::<davheaders::Timeout>()
        .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?;
    match hdr {
        Some(davheaders::Timeout(ref v)) if !v.is_empty() => match v[0] {
            DavTimeout::Infinite => Ok(0),
            DavTimeout::Seconds(n) => Ok(n as u64),
        },
        _ => Ok(0),
    }
}

fn lock_response(lock: &ActiveLock, status: StatusCode) -> DavResult<Response<Body>> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = status;
    let ct = "application/xml; charset=utf-8".parse().unwrap();
    res.headers_mut().insert("content-type", ct);

    let mut xw = xmltree_ext::emitter(MemBuffer::new())?;
    let prop = lock_prop(lock);
    prop.write_ev(&mut xw)?;
    *res.body_mut() = Body::from(xw.inner_mut().take());
    Ok(res)
}

// <prop><lockdiscovery><activelock>...</activelock></lockdiscovery></prop>
fn lock_prop(lock: &ActiveLock) -> Element {
    let mut ldis = Element::new("lockdiscovery");
    ldis.push(build_lock_elem(lock));
    let mut prop = Element::new("prop").ns("", "DAV:");
    prop.push(ldis);
    prop
}

pub(crate) fn build_lock_elem(lock: &ActiveLock) -> Element {
    let mut actlock = Element::new("activelock");

    let mut elem = Element::new("lockscope");
    elem.push(Element::new(if lock.exclusive { "exclusive" } else { "shared" }));
    actlock.push(elem);

    let mut elem = Element::new("locktype");
    elem.push(Element::new(&lock.lock_type.name));
    actlock.push(elem);

    actlock.push(Element::new("depth").text(match lock.depth {
        LockDepth::Zero => "0",
        LockDepth::Infinity => "infinity",
    }));

    actlock.push(Element::new("timeout").text(match lock.timeout_seconds {
        0 => "Infinite".to_string(),
        n => format!("Second-{}", n),
    }));

    let mut tok = Element::new("locktoken");
    tok.push(Element::new("href").text(lock.token.clone()));
    actlock.push(tok);

    let mut root = Element::new("lockroot");
    root.push(Element::new("href").text(lock.lock_path.as_url_string_with_prefix()));
    actlock.push(root);

    if let Some(ref o) = lock.owner {
        actlock.push(o.clone());
    }

    actlock
}

pub(crate) fn list_lockdiscovery(locks: Option<&LockManager>, path: &DavPath) -> Element {
    let mut elem = Element::new("lockdiscovery");
    let locks = match locks {
        Some(locks) => locks,
        None => return elem,
    };
    for lock in locks.get_locks(path, true, false, None) {
        elem.push(build_lock_elem(&lock));
    }
    elem
}

pub(crate) fn list_supportedlock(locks: Option<&LockManager>) -> Element {
    let mut elem = Element::new("supportedlock");
    if locks.is_none() {
        return elem;
    }
    for scope in ["exclusive", "shared"] {
        let mut entry = Element::new("lockentry");
        let mut lockscope = Element::new("lockscope");
        lockscope.push(Element::new(scope));
        entry.push(lockscope);
        let mut locktype = Element::new("locktype");
        locktype.push(Element::new("write"));
        entry.push(locktype);
        elem.push(entry);
    }
    elem
}
