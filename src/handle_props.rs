//! PROPFIND and PROPPATCH.
//!
//! PROPFIND streams one `<response>` per resource, so memory stays
//! O(one response) no matter how big the subtree is. PROPPATCH validates
//! the whole batch before touching the property store; a single failing
//! instruction turns every other instruction into 424 and nothing is
//! written.

use std::collections::HashMap;
use std::io::Cursor;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xmltree::Element;

use crate::async_stream::{AsyncStream, Sender};
use crate::backend::{Resource, ResourceKind};
use crate::body::Body;
use crate::davhandler::DavInner;
use crate::davheaders::Depth;
use crate::davpath::DavPath;
use crate::davstatus::ConditionCode;
use crate::errors::DavError;
use crate::handle_lock::{list_lockdiscovery, list_supportedlock};
use crate::multierror::status_line;
use crate::propstore::{PropName, PropOp, StoredProp};
use crate::typedvalue::{TypedValue, XsType, NS_XSI_URI, NS_XS_URI};
use crate::util::{datetime_to_httpdate, datetime_to_rfc3339, MemBuffer};
use crate::xmltree_ext::{self, ElementExt};
use crate::DavResult;

const NS_DAV_URI: &str = "DAV:";

// the reserved live properties, computed from resource metadata.
const RESERVED_PROPS: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
    "lockdiscovery",
    "supportedlock",
];

// properties that PROPPATCH may never touch.
const PROTECTED_PROPS: &[&str] = &[
    "creationdate",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
    "lockdiscovery",
    "supportedlock",
];

// expensive / protected properties left out of allprop unless asked for.
const ALLPROP_HIDDEN: &[&str] = &["lockdiscovery", "supportedlock"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum FindMode {
    Prop,
    PropName,
    AllProp,
}

impl DavInner {
    pub(crate) async fn handle_propfind(
        self,
        req: &Request<()>,
        resource: Option<Resource>,
        xmldata: Vec<u8>,
    ) -> DavResult<Response<Body>> {
        let resource = resource.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;

        let mut res = Response::new(Body::empty());
        res.headers_mut()
            .typed_insert(headers::CacheControl::new().with_no_cache());
        res.headers_mut().typed_insert(headers::Pragma::no_cache());

        let depth = match req
            .headers()
            .typed_try_get::<Depth>()
            .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
        {
            Some(d) => d,
            // RFC 4918 9.1: default is infinity.
            None => Depth::Infinity,
        };
        if depth == Depth::Infinity && self.reject_propfind_infinite && resource.is_collection() {
            let mut res = Response::new(crate::util::dav_xml_error("propfind-finite-depth"));
            *res.status_mut() = ConditionCode::PropfindFiniteDepth.status();
            let ct = "application/xml; charset=utf-8".parse().unwrap();
            res.headers_mut().insert("content-type", ct);
            return Ok(res);
        }

        let (mode, props) = parse_propfind_body(&xmldata)?;
        trace!("propfind: {:?} with {} named props", mode, props.len());

        let mut pw = PropWriter::new(&mut res, mode, props, self.clone())?;
        *res.body_mut() = Body::from(AsyncStream::new(|tx| async move {
            let result: DavResult<()> = async {
                pw.set_tx(tx);
                pw.write_props(&resource).await?;
                pw.flush().await;
                if resource.is_collection() && depth != Depth::Zero {
                    self.propfind_directory(&resource, depth, &mut pw).await?;
                }
                pw.close().await?;
                Ok(())
            }
            .await;
            result.map_err(std::io::Error::from)
        }));
        Ok(res)
    }

    fn propfind_directory<'a>(
        &'a self,
        resource: &'a Resource,
        depth: Depth,
        pw: &'a mut PropWriter,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            let children = match self.backend.list_children(resource).await {
                Ok(children) => children,
                Err(e) => {
                    // unreadable collection: skip it, the parent itself
                    // was already reported.
                    error!("list_children error on {}: {}", resource.path, e);
                    return Ok(());
                }
            };
            for child in children {
                pw.write_props(&child).await?;
                pw.flush().await;
                if depth == Depth::Infinity && child.is_collection() {
                    self.propfind_directory(&child, depth, pw).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) async fn handle_proppatch(
        self,
        req: &Request<()>,
        path: DavPath,
        resource: Option<Resource>,
        xmldata: Vec<u8>,
    ) -> DavResult<Response<Body>> {
        let _resource = resource.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;

        // PROPPATCH takes Depth: 0 or no Depth at all.
        match req
            .headers()
            .typed_try_get::<Depth>()
            .map_err(|_| DavError::Status(StatusCode::BAD_REQUEST))?
        {
            None | Some(Depth::Zero) => {}
            Some(_) => return Err(StatusCode::BAD_REQUEST.into()),
        }

        trace!(target: "xml", "proppatch input:\n{}", String::from_utf8_lossy(&xmldata));

        let tree = xmltree_ext::parse_xml(Cursor::new(&xmldata))?;
        if tree.name != "propertyupdate" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
            return Err(DavError::XmlParseError);
        }

        // walk the instructions in document order, validating everything
        // up front.
        let mut seen: Vec<PropName> = Vec::new();
        let mut batch: Vec<PropOp> = Vec::new();
        let mut failed: Vec<(StatusCode, Element)> = Vec::new();
        let mut ok_names: Vec<Element> = Vec::new();

        for instr in &tree.children {
            let is_set = match instr.name.as_str() {
                "set" => true,
                "remove" => false,
                _ => continue,
            };
            for prop in instr
                .children
                .iter()
                .filter(|e| e.name == "prop")
                .flat_map(|e| e.children.iter())
            {
                let name = prop_name(prop);
                // property names must be unique across the request.
                if seen.iter().any(|n| n.same_name(&name)) {
                    return Err(StatusCode::BAD_REQUEST.into());
                }
                seen.push(name.clone());

                let verdict = if is_set {
                    self.validate_set(prop)
                } else {
                    self.validate_remove(prop)
                };
                match verdict {
                    StatusCode::OK => {
                        ok_names.push(prop_ref_elem(prop));
                        let op = if is_set {
                            PropOp::Set(StoredProp {
                                name,
                                xml: xmltree_ext::element_to_xml(prop),
                            })
                        } else {
                            PropOp::Remove(name)
                        };
                        batch.push(op);
                    }
                    status => failed.push((status, prop_ref_elem(prop))),
                }
            }
        }

        // atomic: any failure means nothing is applied and everything
        // that would have succeeded reports 424.
        let mut by_status: HashMap<StatusCode, Vec<Element>> = HashMap::new();
        if failed.is_empty() {
            if !batch.is_empty() {
                match self.props {
                    Some(ref store) => store.apply(&path, &batch),
                    None => return Err(StatusCode::FORBIDDEN.into()),
                }
            }
            for elem in ok_names {
                by_status.entry(StatusCode::OK).or_default().push(elem);
            }
        } else {
            for (status, elem) in failed {
                by_status.entry(status).or_default().push(elem);
            }
            for elem in ok_names {
                by_status
                    .entry(StatusCode::FAILED_DEPENDENCY)
                    .or_default()
                    .push(elem);
            }
        }

        let mut res = Response::new(Body::empty());
        let mut pw = PropWriter::new(&mut res, FindMode::PropName, Vec::new(), self.clone())?;
        *res.body_mut() = Body::from(AsyncStream::new(|tx| async move {
            let result: DavResult<()> = async {
                pw.set_tx(tx);
                pw.write_propresponse(&path, by_status)?;
                pw.close().await?;
                Ok(())
            }
            .await;
            result.map_err(std::io::Error::from)
        }));
        Ok(res)
    }

    // Can this property be set? 200 here means "goes into the batch".
    fn validate_set(&self, prop: &Element) -> StatusCode {
        if prop.namespace.as_deref() == Some(NS_DAV_URI)
            && PROTECTED_PROPS.contains(&prop.name.as_str())
        {
            return ConditionCode::CannotModifyProtectedProperty.status();
        }
        if self.props.is_none() {
            return StatusCode::FORBIDDEN;
        }
        // a typed value must match the type's lexical form.
        if let Some(xs) = declared_xs_type(prop) {
            let text = prop.text.as_deref().unwrap_or("");
            if !prop.children.is_empty() || !xs.check(text) {
                return StatusCode::UNPROCESSABLE_ENTITY;
            }
        }
        StatusCode::OK
    }

    fn validate_remove(&self, prop: &Element) -> StatusCode {
        if prop.namespace.as_deref() == Some(NS_DAV_URI)
            && PROTECTED_PROPS.contains(&prop.name.as_str())
        {
            return ConditionCode::CannotModifyProtectedProperty.status();
        }
        if self.props.is_none() {
            return StatusCode::FORBIDDEN;
        }
        // removing a non-existent property is a no-op that succeeds.
        StatusCode::OK
    }
}

// the xsi:type attribute, resolved to an XML Schema type. `None` when
// absent or when the value's prefix does not map to the XML Schema
// namespace. The parser keys the attribute by its own namespace, so an
// unrelated attribute that merely has the local name "type" never
// matches here.
fn declared_xs_type(prop: &Element) -> Option<XsType> {
    let tval = prop.attributes.get(xmltree_ext::XSI_TYPE_ATTR)?;
    let (prefix, local) = tval.split_once(':')?;
    let ns = prop.namespaces.as_ref()?.get(prefix)?;
    if ns != NS_XS_URI {
        return None;
    }
    XsType::from_name(local)
}

fn prop_name(elem: &Element) -> PropName {
    PropName {
        namespace: elem.namespace.clone(),
        prefix: elem.prefix.clone(),
        name: elem.name.clone(),
    }
}

// an empty element naming a property, for status reporting. non-DAV
// namespaces are declared on the element itself.
fn prop_ref_elem(elem: &Element) -> Element {
    let mut e = Element::new(&elem.name);
    match elem.namespace {
        Some(ref ns) if ns != NS_DAV_URI => {
            let pfx = elem.prefix.clone().unwrap_or_else(|| "v".to_string());
            e = e.ns(pfx.as_str(), ns.as_str());
            e.prefix = Some(pfx);
            e.namespace = Some(ns.clone());
        }
        _ => {}
    }
    e
}

fn parse_propfind_body(xmldata: &[u8]) -> DavResult<(FindMode, Vec<Element>)> {
    if xmldata.is_empty() {
        // empty body means allprop.
        return Ok((FindMode::AllProp, Vec::new()));
    }
    let mut root = xmltree_ext::parse_xml(Cursor::new(xmldata))?;
    if root.name != "propfind" || root.namespace.as_deref() != Some(NS_DAV_URI) {
        return Err(DavError::XmlParseError);
    }
    let include = root
        .take_child("include")
        .map(|e| e.children)
        .unwrap_or_default();
    for elem in root.children.into_iter() {
        match elem.name.as_str() {
            "propname" => return Ok((FindMode::PropName, Vec::new())),
            "prop" => return Ok((FindMode::Prop, elem.children)),
            "allprop" => return Ok((FindMode::AllProp, include)),
            _ => {}
        }
    }
    Err(DavError::XmlParseError)
}

struct StatusElement {
    status: StatusCode,
    element: Element,
}

type Tx = Sender<bytes::Bytes>;

pub(crate) struct PropWriter {
    emitter: EventWriter<MemBuffer>,
    tx: Option<Tx>,
    mode: FindMode,
    props: Vec<Element>,
    // namespace uri -> allocated prefix, for namespaces named in the
    // request. DAV: is always the default namespace.
    ns_prefix: HashMap<String, String>,
    inner: DavInner,
}

impl PropWriter {
    fn new(
        res: &mut Response<Body>,
        mode: FindMode,
        props: Vec<Element>,
        inner: DavInner,
    ) -> DavResult<PropWriter> {
        let ct = "application/xml; charset=utf-8".parse().unwrap();
        res.headers_mut().insert("content-type", ct);
        *res.status_mut() = StatusCode::MULTI_STATUS;

        // allocate short prefixes for the non-DAV namespaces the request
        // names: a..z, then ns30, ns31, ...
        let mut ns_prefix = HashMap::new();
        for prop in &props {
            if let Some(ref ns) = prop.namespace {
                if ns != NS_DAV_URI
                    && ns != NS_XS_URI
                    && ns != NS_XSI_URI
                    && !ns_prefix.contains_key(ns)
                {
                    let n = ns_prefix.len();
                    let prefix = if n < 26 {
                        ((b'a' + n as u8) as char).to_string()
                    } else {
                        format!("ns{}", n + 4)
                    };
                    ns_prefix.insert(ns.clone(), prefix);
                }
            }
        }

        let mut emitter = xmltree_ext::emitter(MemBuffer::new())?;
        let mut ev = XmlWEvent::start_element("multistatus").default_ns(NS_DAV_URI);
        if mode != FindMode::PropName {
            ev = ev.ns("xs", NS_XS_URI).ns("xsi", NS_XSI_URI);
        }
        for (ns, prefix) in &ns_prefix {
            ev = ev.ns(prefix.as_str(), ns.as_str());
        }
        emitter.write(ev)?;

        Ok(PropWriter {
            emitter,
            tx: None,
            mode,
            props,
            ns_prefix,
            inner,
        })
    }

    fn set_tx(&mut self, tx: Tx) {
        self.tx = Some(tx);
    }

    // whether the request's prop/include list names this property.
    fn is_requested(&self, namespace: Option<&str>, name: &str) -> bool {
        self.props
            .iter()
            .any(|p| p.namespace.as_deref() == namespace && p.name == name)
    }

    // an element for a response property, with the right prefixing.
    fn resp_elem(&self, name: &str, namespace: Option<&str>) -> Element {
        let mut elem = Element::new(name);
        match namespace {
            None | Some(NS_DAV_URI) => {}
            Some(ns) => match self.ns_prefix.get(ns) {
                Some(prefix) => elem.prefix = Some(prefix.clone()),
                None => {
                    // a namespace first seen mid-stream: declare it on
                    // the element itself.
                    elem = elem.ns("v", ns);
                    elem.prefix = Some("v".to_string());
                }
            },
        }
        elem
    }

    fn text_elem(&self, name: &str, namespace: Option<&str>, text: String) -> Element {
        let mut elem = self.resp_elem(name, namespace);
        if self.mode != FindMode::PropName && !text.is_empty() {
            elem.text = Some(text);
        }
        elem
    }

    fn typed_elem(&self, name: &str, namespace: Option<&str>, value: &TypedValue) -> Element {
        let mut elem = self.text_elem(name, namespace, value.to_text());
        if self.mode != FindMode::PropName {
            if let Some(xs) = value.xs_type() {
                elem.attributes.insert(
                    xmltree_ext::XSI_TYPE_ATTR.to_string(),
                    format!("xs:{}", xs.name()),
                );
            }
        }
        elem
    }

    // build one reserved live property. None when undefined for this
    // resource.
    fn live_prop(&self, name: &str, resource: &Resource) -> Option<Element> {
        let dav = |text: String| Some(self.text_elem(name, None, text));
        match name {
            "creationdate" => {
                let t = resource.meta.created?;
                dav(datetime_to_rfc3339(&t))
            }
            "displayname" => {
                // a stored dead displayname wins over the path segment.
                if let Some(store) = self.inner.props.as_ref() {
                    if let Some(xml) = store.get_prop(&resource.path, &PropName::dav("displayname"))
                    {
                        if let Ok(e) = xmltree_ext::parse_xml(Cursor::new(xml)) {
                            return dav(e.text.unwrap_or_default());
                        }
                    }
                }
                dav(resource.path.file_name().unwrap_or("").to_string())
            }
            "getcontentlength" => {
                let len = resource.meta.len?;
                dav(len.to_string())
            }
            "getcontenttype" => match resource.kind {
                ResourceKind::Collection => dav("httpd/unix-directory".to_string()),
                ResourceKind::NonCollection => {
                    dav(resource.meta.content_type.clone().unwrap_or_else(|| {
                        "application/octet-stream".to_string()
                    }))
                }
            },
            "getetag" => {
                let etag = resource.meta.etag.as_ref()?;
                dav(etag.to_string())
            }
            "getlastmodified" => {
                let t = resource.meta.modified?;
                dav(datetime_to_httpdate(&t))
            }
            "resourcetype" => {
                let mut elem = self.resp_elem(name, None);
                if resource.is_collection() && self.mode != FindMode::PropName {
                    elem.push(Element::new("collection"));
                }
                Some(elem)
            }
            "lockdiscovery" => Some(reparent(
                self.resp_elem(name, None),
                list_lockdiscovery(self.inner.locks.as_ref(), &resource.path),
            )),
            "supportedlock" => Some(reparent(
                self.resp_elem(name, None),
                list_supportedlock(self.inner.locks.as_ref()),
            )),
            _ => None,
        }
    }

    // build one requested property, live or dead. always produces an
    // element; the status says whether the property is defined.
    fn build_prop(
        &self,
        prop: &Element,
        resource: &Resource,
        extras: &[(PropName, TypedValue)],
        dead: &[StoredProp],
    ) -> StatusElement {
        let ns = prop.namespace.as_deref();

        if ns == Some(NS_DAV_URI) && RESERVED_PROPS.contains(&prop.name.as_str()) {
            if let Some(element) = self.live_prop(&prop.name, resource) {
                return StatusElement {
                    status: StatusCode::OK,
                    element,
                };
            }
            return StatusElement {
                status: StatusCode::NOT_FOUND,
                element: self.resp_elem(&prop.name, ns),
            };
        }

        let name = prop_name(prop);
        if let Some((_, value)) = extras.iter().find(|(n, _)| n.same_name(&name)) {
            return StatusElement {
                status: StatusCode::OK,
                element: self.typed_elem(&prop.name, ns, value),
            };
        }

        if let Some(stored) = dead.iter().find(|p| p.name.same_name(&name)) {
            if let Ok(element) = xmltree_ext::parse_xml(Cursor::new(&stored.xml)) {
                return StatusElement {
                    status: StatusCode::OK,
                    element,
                };
            }
        }

        StatusElement {
            status: StatusCode::NOT_FOUND,
            element: self.resp_elem(&prop.name, ns),
        }
    }

    async fn write_props(&mut self, resource: &Resource) -> DavResult<()> {
        let extras = self
            .inner
            .backend
            .live_properties(resource)
            .await
            .unwrap_or_default();
        let dead = match self.inner.props.as_ref() {
            Some(store) => store.get(&resource.path),
            None => Vec::new(),
        };

        let mut by_status: HashMap<StatusCode, Vec<Element>> = HashMap::new();
        let mut add = |status: StatusCode, elem: Element| {
            by_status.entry(status).or_default().push(elem);
        };

        match self.mode {
            FindMode::Prop => {
                for prop in &self.props {
                    let built = self.build_prop(prop, resource, &extras, &dead);
                    add(built.status, built.element);
                }
            }
            FindMode::PropName | FindMode::AllProp => {
                // <include> additions first, with the full per-name
                // treatment. The enumeration below skips anything the
                // request already named, so no property is ever reported
                // in two propstat groups of the same response.
                for (i, prop) in self.props.iter().enumerate() {
                    let earlier = self.props[..i]
                        .iter()
                        .any(|p| p.namespace == prop.namespace && p.name == prop.name);
                    if earlier {
                        continue;
                    }
                    let built = self.build_prop(prop, resource, &extras, &dead);
                    add(built.status, built.element);
                }
                for name in RESERVED_PROPS {
                    if self.mode == FindMode::AllProp && ALLPROP_HIDDEN.contains(name) {
                        continue;
                    }
                    if self.is_requested(Some(NS_DAV_URI), name) {
                        continue;
                    }
                    if let Some(elem) = self.live_prop(name, resource) {
                        add(StatusCode::OK, elem);
                    }
                }
                for (name, value) in &extras {
                    if self.is_requested(name.namespace.as_deref(), &name.name) {
                        continue;
                    }
                    add(
                        StatusCode::OK,
                        self.typed_elem(&name.name, name.namespace.as_deref(), value),
                    );
                }
                for stored in &dead {
                    // dead DAV: properties shadowed by a live one (e.g.
                    // displayname) are already reported above.
                    if stored.name.namespace.as_deref() == Some(NS_DAV_URI)
                        && RESERVED_PROPS.contains(&stored.name.name.as_str())
                    {
                        continue;
                    }
                    if self.is_requested(stored.name.namespace.as_deref(), &stored.name.name) {
                        continue;
                    }
                    match self.mode {
                        FindMode::PropName => add(
                            StatusCode::OK,
                            self.resp_elem(&stored.name.name, stored.name.namespace.as_deref()),
                        ),
                        _ => {
                            if let Ok(elem) = xmltree_ext::parse_xml(Cursor::new(&stored.xml)) {
                                add(StatusCode::OK, elem);
                            }
                        }
                    }
                }
            }
        }

        self.write_propresponse(&resource.path, by_status)
    }

    fn write_propresponse(
        &mut self,
        path: &DavPath,
        props: HashMap<StatusCode, Vec<Element>>,
    ) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element("response"))?;
        self.emitter.write(XmlWEvent::start_element("href"))?;
        self.emitter
            .write(XmlWEvent::characters(&path.as_url_string_with_prefix()))?;
        self.emitter.write(XmlWEvent::end_element())?;

        let mut keys: Vec<&StatusCode> = props.keys().collect();
        keys.sort();
        for status in keys {
            self.emitter.write(XmlWEvent::start_element("propstat"))?;
            self.emitter.write(XmlWEvent::start_element("prop"))?;
            for elem in &props[status] {
                elem.write_ev(&mut self.emitter)?;
            }
            self.emitter.write(XmlWEvent::end_element())?;
            self.emitter.write(XmlWEvent::start_element("status"))?;
            self.emitter.write(XmlWEvent::characters(&status_line(*status)))?;
            self.emitter.write(XmlWEvent::end_element())?;
            self.emitter.write(XmlWEvent::end_element())?;
        }

        self.emitter.write(XmlWEvent::end_element())?; // response
        Ok(())
    }

    async fn flush(&mut self) {
        let buffer = self.emitter.inner_mut().take();
        if let Some(tx) = self.tx.as_mut() {
            tx.send(buffer).await;
        }
    }

    async fn close(&mut self) -> DavResult<()> {
        self.emitter.write(XmlWEvent::end_element())?; // multistatus
        self.flush().await;
        Ok(())
    }
}

// wrap the children of `content` under the response element `shell`.
fn reparent(mut shell: Element, content: Element) -> Element {
    shell.children = content.children;
    shell
}
