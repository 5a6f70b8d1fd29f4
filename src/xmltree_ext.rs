//! Helpers on top of `xmltree::Element` for parsing request bodies and
//! emitting response fragments through an `xml-rs` event writer.
//!
//! Request bodies are parsed with [`parse_xml`], a thin reader on top of
//! the `xml-rs` event stream. It exists instead of `Element::parse`
//! because xmltree keys attributes by bare local name, which erases the
//! attribute's own namespace - and `xsi:type` (RFC 4316) must be
//! recognized by namespace, not by an attribute that happens to be named
//! "type". Namespaced attributes are therefore keyed in Clark notation,
//! `{namespace-uri}local`, and [`attr_name`] maps the well-known ones
//! back to a prefixed form on emission.
//!
//! The reader never resolves external entities (xml-rs has no support
//! for them, document type declarations are accepted but inert),
//! processing instructions and comments are dropped, and the caller has
//! already capped the body size.

use std::borrow::Cow;
use std::io::{Cursor, Read, Write};

use xml::common::XmlVersion;
use xml::name::OwnedName;
use xml::reader::{EventReader, XmlEvent as XmlREvent};
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xml::{EmitterConfig, ParserConfig};
use xmltree::{self, Element};

use crate::errors::DavError;
use crate::typedvalue::NS_XSI_URI;
use crate::DavResult;

const NS_XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

pub(crate) trait ElementExt {
    fn ns<S: Into<String>>(self, prefix: S, namespace: S) -> Self;
    fn text<T: Into<String>>(self, t: T) -> Self;
    fn push(&mut self, e: Element);
    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()>;
}

impl ElementExt for Element {
    fn ns<S: Into<String>>(mut self, prefix: S, namespace: S) -> Element {
        let mut ns = self.namespaces.unwrap_or_else(xmltree::Namespace::empty);
        ns.force_put(prefix.into(), namespace.into());
        self.namespaces = Some(ns);
        self
    }

    fn text<S: Into<String>>(mut self, t: S) -> Element {
        self.text = Some(t.into());
        self
    }

    fn push(&mut self, e: Element) {
        self.children.push(e);
    }

    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()> {
        use xml::attribute::Attribute;
        use xml::name::Name;
        use xml::namespace::Namespace;

        let mut name = Name::local(&self.name);
        if let Some(ref ns) = self.namespace {
            name.namespace = Some(ns);
        }
        if let Some(ref p) = self.prefix {
            name.prefix = Some(p);
        }

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for (k, v) in &self.attributes {
            attributes.push(Attribute {
                name: attr_name(k),
                value: v,
            });
        }

        let empty_ns = Namespace::empty();
        let namespace = match self.namespaces {
            Some(ref ns) => ns,
            None => &empty_ns,
        };

        emitter.write(XmlWEvent::StartElement {
            name,
            attributes: Cow::Owned(attributes),
            namespace: Cow::Borrowed(namespace),
        })?;
        if let Some(ref t) = self.text {
            emitter.write(XmlWEvent::Characters(t))?;
        }
        for elem in &self.children {
            elem.write_ev(emitter)?;
        }
        emitter.write(XmlWEvent::EndElement { name: Some(name) })
    }
}

/// The attribute key [`parse_xml`] stores `xsi:type` under.
pub(crate) const XSI_TYPE_ATTR: &str = "{http://www.w3.org/2001/XMLSchema-instance}type";

// attribute key as stored by parse_xml: Clark notation for namespaced
// attributes, bare local name otherwise.
fn attr_key(name: &OwnedName) -> String {
    match name.namespace {
        Some(ref ns) => format!("{{{}}}{}", ns, name.local_name),
        None => name.local_name.clone(),
    }
}

// map a stored attribute key back to an emittable name. The well-known
// namespaces get their conventional prefixes (`xsi` is declared by the
// emitting document, `xml` is predeclared); anything else degrades to
// the bare local name.
fn attr_name(key: &str) -> xml::name::Name<'_> {
    if let Some(rest) = key.strip_prefix('{') {
        if let Some((ns, local)) = rest.split_once('}') {
            return match ns {
                NS_XSI_URI => xml::name::Name::prefixed(local, "xsi"),
                NS_XML_URI => xml::name::Name::prefixed(local, "xml"),
                _ => xml::name::Name::local(local),
            };
        }
    }
    xml::name::Name::local(key)
}

/// Parse an XML request body into an element tree.
pub(crate) fn parse_xml<R: Read>(r: R) -> DavResult<Element> {
    let config = ParserConfig::new()
        .ignore_comments(true)
        .cdata_to_characters(true);
    let mut reader = EventReader::new_with_config(r, config);
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let event = reader.next().map_err(|e| match e.kind() {
            xml::reader::ErrorKind::Io(_) => DavError::XmlReadError,
            _ => DavError::XmlParseError,
        })?;
        match event {
            XmlREvent::StartElement {
                name,
                attributes,
                namespace,
            } => {
                let mut elem = Element::new(&name.local_name);
                elem.prefix = name.prefix;
                elem.namespace = name.namespace;
                elem.namespaces = Some(namespace);
                for attr in attributes {
                    elem.attributes.insert(attr_key(&attr.name), attr.value);
                }
                stack.push(elem);
            }
            XmlREvent::EndElement { .. } => {
                let elem = stack.pop().ok_or(DavError::XmlParseError)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(elem),
                    // the root element is complete.
                    None => return Ok(elem),
                }
            }
            XmlREvent::Characters(text) => {
                if let Some(elem) = stack.last_mut() {
                    match elem.text {
                        Some(ref mut t) => t.push_str(&text),
                        None => elem.text = Some(text),
                    }
                }
            }
            XmlREvent::EndDocument => return Err(DavError::XmlParseError),
            // start-document, whitespace, processing instructions,
            // comments and doctypes carry nothing we keep.
            _ => {}
        }
    }
}

/// Serialize a single element to standalone XML bytes (no declaration),
/// used for dead-property storage.
pub(crate) fn element_to_xml(elem: &Element) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let mut emitter = EventWriter::new_with_config(
        &mut cursor,
        EmitterConfig {
            write_document_declaration: false,
            normalize_empty_elements: false,
            perform_indent: false,
            ..Default::default()
        },
    );
    // emitting into a Vec cannot fail.
    elem.write_ev(&mut emitter).ok();
    cursor.into_inner()
}

/// Start an event writer for a full XML document body.
pub(crate) fn emitter<W: Write>(w: W) -> DavResult<EventWriter<W>> {
    let mut emitter = EventWriter::new_with_config(
        w,
        EmitterConfig {
            normalize_empty_elements: false,
            perform_indent: false,
            indent_string: Cow::Borrowed(""),
            ..Default::default()
        },
    );
    emitter.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    Ok(emitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_reserialize() {
        let src = br#"<x:prop xmlns:x="urn:example">value</x:prop>"#;
        let elem = parse_xml(Cursor::new(&src[..])).unwrap();
        assert_eq!(elem.name, "prop");
        assert_eq!(elem.namespace.as_deref(), Some("urn:example"));
        let out = element_to_xml(&elem);
        let elem2 = parse_xml(Cursor::new(out)).unwrap();
        assert_eq!(elem2.name, "prop");
        assert_eq!(elem2.text.as_deref(), Some("value"));
    }

    #[test]
    fn reject_malformed() {
        assert!(parse_xml(Cursor::new(b"<a><b></a>".to_vec())).is_err());
        assert!(parse_xml(Cursor::new(b"".to_vec())).is_err());
    }

    #[test]
    fn attribute_namespaces_are_kept() {
        let src = br#"<v xmlns="urn:example"
            xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
            xmlns:o="urn:other" xsi:type="xs:int" o:type="bogus">1</v>"#;
        let elem = parse_xml(Cursor::new(&src[..])).unwrap();
        // the real xsi:type is under its Clark key; the impostor is not.
        assert_eq!(elem.attributes.get(XSI_TYPE_ATTR).map(|s| s.as_str()), Some("xs:int"));
        assert_eq!(
            elem.attributes.get("{urn:other}type").map(|s| s.as_str()),
            Some("bogus")
        );
        assert!(elem.attributes.get("type").is_none());
    }

    #[test]
    fn xsi_type_round_trips() {
        let src = br#"<v xmlns="urn:example"
            xmlns:xs="http://www.w3.org/2001/XMLSchema"
            xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
            xsi:type="xs:dateTime">1996-12-19T16:39:57Z</v>"#;
        let elem = parse_xml(Cursor::new(&src[..])).unwrap();
        let out = element_to_xml(&elem);
        let elem2 = parse_xml(Cursor::new(out)).unwrap();
        assert_eq!(
            elem2.attributes.get(XSI_TYPE_ATTR).map(|s| s.as_str()),
            Some("xs:dateTime")
        );
    }
}
