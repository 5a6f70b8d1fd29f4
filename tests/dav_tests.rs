use dav_core::{
    body::Body, Authorization, AuthorizationFilter, DavHandler, DavMethod, DavPath, LockManager,
    MemBackend, MemPropStore,
};
use http::{Request, Response, StatusCode};

fn setup() -> DavHandler {
    DavHandler::builder()
        .backend(MemBackend::new())
        .lock_manager(LockManager::new())
        .property_store(MemPropStore::new())
        .principal("alice")
        .build_handler()
}

async fn resp_to_string(mut resp: Response<Body>) -> String {
    use futures_util::StreamExt;

    let mut data = Vec::new();
    let body = resp.body_mut();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => data.extend_from_slice(&bytes),
            Err(e) => panic!("error reading body stream: {}", e),
        }
    }
    String::from_utf8(data).unwrap_or_default()
}

fn req(method: &str, uri: &str) -> http::request::Builder {
    Request::builder().method(method).uri(uri)
}

async fn put(server: &DavHandler, uri: &str, data: &str) -> Response<Body> {
    let r = req("PUT", uri).body(Body::from(data.to_string())).unwrap();
    server.handle(r).await
}

async fn mkcol(server: &DavHandler, uri: &str) -> Response<Body> {
    let r = req("MKCOL", uri).body(Body::empty()).unwrap();
    server.handle(r).await
}

const LOCKINFO_EXCLUSIVE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>http://example.com/~alice</D:href></D:owner>
</D:lockinfo>"#;

#[tokio::test]
async fn test_lock_unmapped_then_put() {
    let server = setup();

    // LOCK on an unmapped URL registers the lock and reports 201.
    let r = req("LOCK", "/a")
        .header("Depth", "0")
        .header("Timeout", "Second-60")
        .body(Body::from(LOCKINFO_EXCLUSIVE))
        .unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let token = resp
        .headers()
        .get("lock-token")
        .expect("Lock-Token header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(token.starts_with("<urn:uuid:"));
    assert!(token.ends_with('>'));
    let body = resp_to_string(resp).await;
    assert!(body.contains("lockdiscovery"));
    assert!(body.contains("locktoken"));
    assert!(body.contains("Second-60"));

    // the resource is still unmapped.
    let r = req("GET", "/a").body(Body::empty()).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NOT_FOUND);

    // PUT without the token is refused.
    let resp = put(&server, "/a", "hello").await;
    assert_eq!(resp.status(), StatusCode::LOCKED);
    let body = resp_to_string(resp).await;
    assert!(body.contains("lock-token-submitted"));

    // PUT with the token in an If header creates the resource.
    let iftoken = format!("({})", token);
    let r = req("PUT", "/a")
        .header("If", iftoken)
        .body(Body::from("hello"))
        .unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // and UNLOCK with the exact token releases it.
    let r = req("UNLOCK", "/a")
        .header("Lock-Token", token)
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NO_CONTENT);
    let resp = put(&server, "/a", "free again").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_propfind_depth_one() {
    let server = setup();
    assert_eq!(mkcol(&server, "/c/").await.status(), StatusCode::CREATED);
    for name in ["x", "y", "z"] {
        let resp = put(&server, &format!("/c/{}", name), "data").await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:">
          <D:prop><D:displayname/><D:nonexistent/></D:prop>
        </D:propfind>"#;
    let r = req("PROPFIND", "/c/")
        .header("Depth", "1")
        .body(Body::from(body))
        .unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = resp_to_string(resp).await;

    // one response per resource: the collection plus three members.
    assert_eq!(text.matches("<response>").count(), 4);
    // each carries displayname under 200 and nonexistent under 404.
    assert_eq!(text.matches("<displayname>").count(), 4);
    assert_eq!(text.matches("<nonexistent").count(), 4);
    assert_eq!(text.matches("HTTP/1.1 404 Not Found").count(), 4);
    assert!(text.contains("HTTP/1.1 200 OK"));
}

#[tokio::test]
async fn test_allprop_include_reports_each_property_once() {
    let server = setup();
    assert_eq!(put(&server, "/r", "data").await.status(), StatusCode::CREATED);

    // plain allprop hides lockdiscovery.
    let r = req("PROPFIND", "/r")
        .header("Depth", "0")
        .body(Body::empty())
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert!(!text.contains("<lockdiscovery"));
    assert_eq!(text.matches("<displayname>").count(), 1);

    // include may add hidden properties, and naming a default property
    // must not report it twice.
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:">
          <D:allprop/>
          <D:include><D:lockdiscovery/><D:displayname/></D:include>
        </D:propfind>"#;
    let r = req("PROPFIND", "/r")
        .header("Depth", "0")
        .body(Body::from(body))
        .unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = resp_to_string(resp).await;
    assert_eq!(text.matches("<lockdiscovery>").count(), 1);
    assert_eq!(text.matches("<displayname>").count(), 1);
    assert_eq!(text.matches("<getetag>").count(), 1);
}

#[tokio::test]
async fn test_proppatch_atomicity() {
    let server = setup();
    assert_eq!(put(&server, "/r", "data").await.status(), StatusCode::CREATED);

    // one well-formed set, one set whose typed value cannot parse.
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propertyupdate xmlns:D="DAV:" xmlns:X="urn:example:props"
                          xmlns:xs="http://www.w3.org/2001/XMLSchema"
                          xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
          <D:set><D:prop><X:v1>1</X:v1></D:prop></D:set>
          <D:set><D:prop><X:v2 xsi:type="xs:int">notanint</X:v2></D:prop></D:set>
        </D:propertyupdate>"#;
    let r = req("PROPPATCH", "/r").body(Body::from(body)).unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = resp_to_string(resp).await;
    assert!(text.contains("HTTP/1.1 422 Unprocessable Entity"));
    assert!(text.contains("HTTP/1.1 424 Failed Dependency"));

    // nothing was stored.
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:prop><X:v1/><X:v2/></D:prop>
        </D:propfind>"#;
    let r = req("PROPFIND", "/r")
        .header("Depth", "0")
        .body(Body::from(body))
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert_eq!(text.matches("HTTP/1.1 404 Not Found").count(), 1);
    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 0);
}

#[tokio::test]
async fn test_proppatch_set_then_propfind() {
    let server = setup();
    assert_eq!(put(&server, "/r", "data").await.status(), StatusCode::CREATED);

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propertyupdate xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:set><D:prop><X:color>green</X:color></D:prop></D:set>
        </D:propertyupdate>"#;
    let r = req("PROPPATCH", "/r").body(Body::from(body)).unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = resp_to_string(resp).await;
    assert!(text.contains("HTTP/1.1 200 OK"));

    // the stored value comes back, on PROPFIND by name and via allprop.
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:prop><X:color/></D:prop>
        </D:propfind>"#;
    let r = req("PROPFIND", "/r")
        .header("Depth", "0")
        .body(Body::from(body))
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert!(text.contains("green"));
    assert!(text.contains("HTTP/1.1 200 OK"));

    let r = req("PROPFIND", "/r")
        .header("Depth", "0")
        .body(Body::empty())
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert!(text.contains("green"));

    // removing it makes it 404 again.
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propertyupdate xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:remove><D:prop><X:color/></D:prop></D:remove>
        </D:propertyupdate>"#;
    let r = req("PROPPATCH", "/r").body(Body::from(body)).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::MULTI_STATUS);

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:prop><X:color/></D:prop>
        </D:propfind>"#;
    let r = req("PROPFIND", "/r")
        .header("Depth", "0")
        .body(Body::from(body))
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert!(text.contains("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn test_move_into_own_subtree() {
    let server = setup();
    assert_eq!(mkcol(&server, "/src/").await.status(), StatusCode::CREATED);
    let r = req("MOVE", "/src/")
        .header("Destination", "/src/child/")
        .header("Depth", "infinity")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_copy_overwrite_matrix() {
    let server = setup();
    assert_eq!(put(&server, "/a", "source").await.status(), StatusCode::CREATED);
    assert_eq!(put(&server, "/b", "dest").await.status(), StatusCode::CREATED);

    // destination present, Overwrite: F.
    let r = req("COPY", "/a")
        .header("Destination", "/b")
        .header("Overwrite", "F")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        server.handle(r).await.status(),
        StatusCode::PRECONDITION_FAILED
    );

    // Overwrite: T replaces it.
    let r = req("COPY", "/a")
        .header("Destination", "/b")
        .header("Overwrite", "T")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NO_CONTENT);
    let r = req("GET", "/b").body(Body::empty()).unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp_to_string(resp).await, "source");

    // absent destination is created.
    let r = req("COPY", "/a")
        .header("Destination", "/c")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_copy_collection_preserves_dead_props() {
    let server = setup();
    assert_eq!(mkcol(&server, "/col/").await.status(), StatusCode::CREATED);
    assert_eq!(put(&server, "/col/f", "x").await.status(), StatusCode::CREATED);
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propertyupdate xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:set><D:prop><X:tag>keep</X:tag></D:prop></D:set>
        </D:propertyupdate>"#;
    let r = req("PROPPATCH", "/col/f").body(Body::from(body)).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::MULTI_STATUS);

    let r = req("COPY", "/col/")
        .header("Destination", "/copy/")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::CREATED);

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:prop><X:tag/></D:prop>
        </D:propfind>"#;
    let r = req("PROPFIND", "/copy/f")
        .header("Depth", "0")
        .body(Body::from(body))
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert!(text.contains("keep"));
}

#[tokio::test]
async fn test_move_collection_requires_infinity() {
    let server = setup();
    assert_eq!(mkcol(&server, "/m/").await.status(), StatusCode::CREATED);
    let r = req("MOVE", "/m/")
        .header("Destination", "/n/")
        .header("Depth", "0")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::BAD_REQUEST);

    let r = req("MOVE", "/m/")
        .header("Destination", "/n/")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::CREATED);
    let r = req("GET", "/m/").body(Body::empty()).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_move_without_atomic_rename() {
    // no atomic rename: MOVE goes through the copy-then-delete planner.
    let server = DavHandler::builder()
        .backend(MemBackend::new().without_rename())
        .lock_manager(LockManager::new())
        .property_store(MemPropStore::new())
        .build_handler();
    assert_eq!(mkcol(&server, "/col/").await.status(), StatusCode::CREATED);
    assert_eq!(put(&server, "/col/f", "x").await.status(), StatusCode::CREATED);
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propertyupdate xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:set><D:prop><X:tag>moved</X:tag></D:prop></D:set>
        </D:propertyupdate>"#;
    let r = req("PROPPATCH", "/col/f").body(Body::from(body)).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::MULTI_STATUS);

    let r = req("MOVE", "/col/")
        .header("Destination", "/dst/")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::CREATED);

    let r = req("GET", "/dst/f").body(Body::empty()).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::OK);
    let r = req("GET", "/col/f").body(Body::empty()).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NOT_FOUND);

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:props">
          <D:prop><X:tag/></D:prop>
        </D:propfind>"#;
    let r = req("PROPFIND", "/dst/f")
        .header("Depth", "0")
        .body(Body::from(body))
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert!(text.contains("moved"));
}

#[tokio::test]
async fn test_conditional_get() {
    let server = setup();
    let resp = put(&server, "/r", "content").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let etag = resp
        .headers()
        .get("etag")
        .expect("etag on PUT")
        .to_str()
        .unwrap()
        .to_string();

    // If-None-Match with the current tag: 304 with the tag echoed.
    let r = req("GET", "/r")
        .header("If-None-Match", etag.clone())
        .body(Body::empty())
        .unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(resp.headers().get("etag").unwrap().to_str().unwrap(), etag);
    assert_eq!(resp_to_string(resp).await, "");

    // If-Modified-Since in the future: 304.
    let r = req("GET", "/r")
        .header("If-Modified-Since", "Fri, 01 Jan 2100 00:00:00 GMT")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NOT_MODIFIED);

    // If-Match with some other tag: 412.
    let r = req("GET", "/r")
        .header("If-Match", "\"other\"")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        server.handle(r).await.status(),
        StatusCode::PRECONDITION_FAILED
    );

    // If-Match with the right tag passes.
    let r = req("GET", "/r")
        .header("If-Match", etag)
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_options_advertises_class_2() {
    let server = setup();
    let r = req("OPTIONS", "/").body(Body::empty()).unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let dav = resp.headers().get("dav").unwrap().to_str().unwrap();
    assert_eq!(dav, "1, 2");
    let allow = resp.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("LOCK"));
    assert!(!allow.contains("TRACE"));
}

#[tokio::test]
async fn test_delete_collection_removes_locks_and_props() {
    let server = setup();
    assert_eq!(mkcol(&server, "/d/").await.status(), StatusCode::CREATED);
    assert_eq!(put(&server, "/d/f", "x").await.status(), StatusCode::CREATED);

    let r = req("DELETE", "/d/").body(Body::empty()).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NO_CONTENT);
    let r = req("GET", "/d/f").body(Body::empty()).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_depth_infinity_propfind_can_be_refused() {
    let server = DavHandler::builder()
        .backend(MemBackend::new())
        .reject_propfind_infinite(true)
        .build_handler();
    let r = req("PROPFIND", "/").body(Body::empty()).unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let text = resp_to_string(resp).await;
    assert!(text.contains("propfind-finite-depth"));
}

#[tokio::test]
async fn test_shared_locks_and_conflict_body() {
    let server = setup();
    assert_eq!(put(&server, "/s", "x").await.status(), StatusCode::CREATED);

    let shared = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:lockinfo xmlns:D="DAV:">
          <D:lockscope><D:shared/></D:lockscope>
          <D:locktype><D:write/></D:locktype>
        </D:lockinfo>"#;
    let r = req("LOCK", "/s").body(Body::from(shared)).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::OK);
    let r = req("LOCK", "/s").body(Body::from(shared)).unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::OK);

    // an exclusive lock on top is refused with no-conflicting-lock.
    let r = req("LOCK", "/s").body(Body::from(LOCKINFO_EXCLUSIVE)).unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);
    let text = resp_to_string(resp).await;
    assert!(text.contains("no-conflicting-lock"));
}

#[tokio::test]
async fn test_lockdiscovery_via_propfind() {
    let server = setup();
    assert_eq!(mkcol(&server, "/locked/").await.status(), StatusCode::CREATED);
    assert_eq!(
        put(&server, "/locked/f", "x").await.status(),
        StatusCode::CREATED
    );
    let r = req("LOCK", "/locked/")
        .body(Body::from(LOCKINFO_EXCLUSIVE))
        .unwrap();
    let resp = server.handle(r).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // the child inherits coverage; lockdiscovery on the child shows the
    // ancestor lock with its original lock root.
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:">
          <D:prop><D:lockdiscovery/></D:prop>
        </D:propfind>"#;
    let r = req("PROPFIND", "/locked/f")
        .header("Depth", "0")
        .body(Body::from(body))
        .unwrap();
    let text = resp_to_string(server.handle(r).await).await;
    assert!(text.contains("activelock"));
    assert!(text.contains("/locked/"));
    assert!(text.contains("urn:uuid:"));
}

#[tokio::test]
async fn test_unmapped_non_creating_methods_404() {
    let server = setup();
    for method in ["GET", "DELETE", "PROPFIND", "COPY", "MOVE"] {
        let mut r = req(method, "/nothing-here");
        if method == "COPY" || method == "MOVE" {
            r = r.header("Destination", "/elsewhere");
        }
        let resp = server.handle(r.body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "method {}", method);
    }
}

// denies everything below a prefix, either loudly or masked as 404.
#[derive(Debug, Clone)]
struct DenyPrefix {
    prefix: &'static str,
    as_404: bool,
}

impl AuthorizationFilter for DenyPrefix {
    fn authorize(&self, _principal: Option<&str>, path: &DavPath, _m: DavMethod) -> Authorization {
        if path.as_bytes().starts_with(self.prefix.as_bytes()) {
            if self.as_404 {
                Authorization::DenyAs404
            } else {
                Authorization::Deny
            }
        } else {
            Authorization::Allow
        }
    }
}

#[tokio::test]
async fn test_authorization_chain() {
    let server = DavHandler::builder()
        .backend(MemBackend::new())
        .authorization(Box::new(DenyPrefix {
            prefix: "/private",
            as_404: false,
        }))
        .authorization(Box::new(DenyPrefix {
            prefix: "/hidden",
            as_404: true,
        }))
        .build_handler();

    assert_eq!(mkcol(&server, "/private/").await.status(), StatusCode::FORBIDDEN);
    // existence is masked for the hidden tree.
    assert_eq!(mkcol(&server, "/hidden/").await.status(), StatusCode::NOT_FOUND);
    // everything else still works.
    assert_eq!(mkcol(&server, "/public/").await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_bad_depth_is_rejected() {
    let server = setup();
    let r = req("PROPFIND", "/")
        .header("Depth", "2")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(r).await.status(), StatusCode::BAD_REQUEST);
}
