//! Conditional request evaluation: RFC 7232 `If-*` headers plus the
//! WebDAV tagged `If` header (RFC 4918 10.4).
//!
//! The evaluator is deterministic: given the same headers and resource
//! state it always produces the same outcome. Besides pass/fail it also
//! gathers every lock token mentioned in the `If` header - the "submitted
//! tokens" the write path later checks against the lock manager.

use headers::HeaderMapExt;
use http::{Request, StatusCode};

use crate::backend::{Resource, ResourceBackend};
use crate::davheaders::{self, ETag, ETagList, If, IfItem};
use crate::davpath::DavPath;
use crate::locks::LockManager;
use crate::util::DavMethod;
use crate::DavResult;

/// Outcome of precondition evaluation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Eval {
    Pass,
    /// Only produced for GET/HEAD; carries the ETag to echo.
    NotModified(Option<ETag>),
    PreconditionFailed,
}

pub(crate) fn etaglist_match(tags: &ETagList, exists: bool, tag: Option<&ETag>, strong: bool) -> bool {
    match tags {
        ETagList::Star => exists,
        ETagList::Tags(t) => match tag {
            Some(tag) => t
                .iter()
                .any(|x| if strong { x.strong_eq(tag) } else { x.weak_eq(tag) }),
            None => false,
        },
    }
}

// whole-second comparison; HTTP-dates have no subseconds.
fn unmodified_since(modified: &chrono::DateTime<chrono::Utc>, date: &davheaders::HttpDate) -> bool {
    modified.timestamp() <= date.0.timestamp()
}

/// Evaluate all conditional headers for a request: the RFC 7232 headers
/// first, then the WebDAV `If`. Returns the outcome plus the submitted
/// lock tokens.
pub(crate) async fn evaluate(
    req: &Request<()>,
    method: DavMethod,
    resource: Option<&Resource>,
    backend: &dyn ResourceBackend,
    locks: Option<&LockManager>,
    path: &DavPath,
) -> DavResult<(Eval, Vec<String>)> {
    let exists = resource.is_some();
    let etag = resource.and_then(|r| r.meta.etag.clone());
    let modified = resource.and_then(|r| r.meta.modified);
    let is_read = method == DavMethod::Get || method == DavMethod::Head;
    let bad = |_e| StatusCode::BAD_REQUEST;

    // 1 + 2: If-Match. strong comparison; any value fails on an
    // unmapped resource.
    if let Some(r) = req
        .headers()
        .typed_try_get::<davheaders::IfMatch>()
        .map_err(bad)?
    {
        if !exists || !etaglist_match(&r.0, exists, etag.as_ref(), true) {
            trace!("precondition fail: If-Match {:?}", r);
            return Ok((Eval::PreconditionFailed, Vec::new()));
        }
    }

    // 3: If-Unmodified-Since.
    if let Some(r) = req
        .headers()
        .typed_try_get::<davheaders::IfUnmodifiedSince>()
        .map_err(bad)?
    {
        if let Some(m) = modified {
            if !unmodified_since(&m, &r.0) {
                trace!("precondition fail: If-Unmodified-Since {:?}", r);
                return Ok((Eval::PreconditionFailed, Vec::new()));
            }
        }
    }

    // 4: If-None-Match. weak comparison.
    if let Some(r) = req
        .headers()
        .typed_try_get::<davheaders::IfNoneMatch>()
        .map_err(bad)?
    {
        if exists && etaglist_match(&r.0, exists, etag.as_ref(), false) {
            trace!("precondition: If-None-Match matched {:?}", r);
            return if is_read {
                Ok((Eval::NotModified(etag), Vec::new()))
            } else {
                Ok((Eval::PreconditionFailed, Vec::new()))
            };
        }
    }

    // 5: If-Modified-Since, GET/HEAD only.
    if is_read {
        if let Some(r) = req
            .headers()
            .typed_try_get::<davheaders::IfModifiedSince>()
            .map_err(bad)?
        {
            if let Some(m) = modified {
                if unmodified_since(&m, &r.0) {
                    trace!("not modified: If-Modified-Since {:?}", r);
                    return Ok((Eval::NotModified(etag), Vec::new()));
                }
            }
        }
    }

    // 6: the WebDAV If header.
    let ifheader = match req.headers().typed_try_get::<If>().map_err(bad)? {
        Some(h) => h,
        None => return Ok((Eval::Pass, Vec::new())),
    };
    let (ok, tokens) = dav_if_match(&ifheader, backend, locks, path).await;
    if !ok {
        trace!("precondition fail: If {:?}", ifheader);
        return Ok((Eval::PreconditionFailed, tokens));
    }
    Ok((Eval::Pass, tokens))
}

// Evaluate the RFC 4918 If header: the request passes if any list
// evaluates true; a list is true when all of its conditions are.
// Every state token encountered is collected, pass or fail.
async fn dav_if_match(
    ifheader: &If,
    backend: &dyn ResourceBackend,
    locks: Option<&LockManager>,
    req_path: &DavPath,
) -> (bool, Vec<String>) {
    let mut tokens: Vec<String> = Vec::new();
    let mut any_list_ok = false;

    for iflist in ifheader.0.iter() {
        for cond in iflist.conditions.iter() {
            if let IfItem::StateToken(ref t) = cond.item {
                if !tokens.iter().any(|x| x == t) {
                    tokens.push(t.to_owned());
                }
            }
        }

        if any_list_ok {
            continue;
        }

        // the resource this list is tagged with; untagged lists apply to
        // the request URI.
        let mut anchor: Option<DavPath> = None;
        let (target, valid) = match iflist.resource_tag {
            Some(ref url) => match DavPath::from_str_and_prefix(url.path(), req_path.prefix()) {
                Ok(p) => (&*anchor.insert(p), true),
                Err(_) => (req_path, false),
            },
            None => (req_path, true),
        };

        let mut list_ok = false;
        for cond in iflist.conditions.iter() {
            let cond_ok = match cond.item {
                IfItem::StateToken(ref s) => {
                    // tokens in the DAV: namespace always evaluate to
                    // false (RFC 4918 10.4.8).
                    if !valid || s.starts_with("DAV:") {
                        false
                    } else {
                        match locks {
                            Some(locks) => locks.get_lock(s, Some(target)).is_some(),
                            None => false,
                        }
                    }
                }
                IfItem::ETag(ref tag) => {
                    if !valid {
                        false
                    } else {
                        match backend.resolve(target).await {
                            Ok(Some(res)) => match res.meta.etag {
                                Some(ref mtag) => tag.strong_eq(mtag),
                                None => false,
                            },
                            _ => false,
                        }
                    }
                }
            };
            if cond_ok == cond.not {
                list_ok = false;
                break;
            }
            list_ok = true;
        }
        if list_ok {
            any_list_ok = true;
        }
    }
    (any_list_ok, tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn tag(s: &str) -> ETag {
        ETag::from_str(s).unwrap()
    }

    #[test]
    fn star_matches_only_existing() {
        assert!(etaglist_match(&ETagList::Star, true, None, true));
        assert!(!etaglist_match(&ETagList::Star, false, None, true));
    }

    #[test]
    fn strong_vs_weak_matching() {
        let list = ETagList::Tags(vec![tag(r#"W/"x""#)]);
        let current = tag(r#""x""#);
        assert!(!etaglist_match(&list, true, Some(&current), true));
        assert!(etaglist_match(&list, true, Some(&current), false));
    }
}
