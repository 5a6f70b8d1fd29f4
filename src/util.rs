use std::io::{Cursor, Write};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::method::InvalidMethod;

use crate::body::Body;
use crate::DavResult;
use crate::errors::DavError;

/// HTTP methods supported by [`DavHandler`](crate::DavHandler).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u32)]
pub enum DavMethod {
    Head = 0x0001,
    Get = 0x0002,
    Put = 0x0004,
    Post = 0x0008,
    Options = 0x0010,
    PropFind = 0x0020,
    PropPatch = 0x0040,
    MkCol = 0x0080,
    Copy = 0x0100,
    Move = 0x0200,
    Delete = 0x0400,
    Lock = 0x0800,
    Unlock = 0x1000,
    Trace = 0x2000,
}

impl DavMethod {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            DavMethod::Head => "HEAD",
            DavMethod::Get => "GET",
            DavMethod::Put => "PUT",
            DavMethod::Post => "POST",
            DavMethod::Options => "OPTIONS",
            DavMethod::PropFind => "PROPFIND",
            DavMethod::PropPatch => "PROPPATCH",
            DavMethod::MkCol => "MKCOL",
            DavMethod::Copy => "COPY",
            DavMethod::Move => "MOVE",
            DavMethod::Delete => "DELETE",
            DavMethod::Lock => "LOCK",
            DavMethod::Unlock => "UNLOCK",
            DavMethod::Trace => "TRACE",
        }
    }

    /// Does this method modify the target resource (and so require
    /// submission of any covering lock tokens).
    pub(crate) fn is_write(&self) -> bool {
        matches!(
            self,
            DavMethod::Put
                | DavMethod::PropPatch
                | DavMethod::MkCol
                | DavMethod::Delete
                | DavMethod::Move
        )
    }
}

// translate an HTTP method into our own enum that has the webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::Head,
        http::Method::GET => DavMethod::Get,
        http::Method::PUT => DavMethod::Put,
        http::Method::POST => DavMethod::Post,
        http::Method::DELETE => DavMethod::Delete,
        http::Method::OPTIONS => DavMethod::Options,
        http::Method::TRACE => DavMethod::Trace,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "MKCOL" => DavMethod::MkCol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => return Err(DavError::UnknownDavMethod),
        },
    };
    Ok(m)
}

// for external use.
impl std::convert::TryFrom<&http::Method> for DavMethod {
    type Error = InvalidMethod;

    fn try_from(value: &http::Method) -> Result<Self, Self::Error> {
        // A trick to get at the value of http::method::InvalidMethod.
        dav_method(value).map_err(|_| http::Method::from_bytes(b"").unwrap_err())
    }
}

/// A set of allowed [`DavMethod`]s.
#[derive(Clone, Copy, Debug)]
pub struct DavMethodSet(u32);

impl DavMethodSet {
    pub const HTTP_RO: DavMethodSet =
        DavMethodSet(DavMethod::Get as u32 | DavMethod::Head as u32 | DavMethod::Options as u32);
    pub const HTTP_RW: DavMethodSet = DavMethodSet(Self::HTTP_RO.0 | DavMethod::Put as u32);
    pub const WEBDAV_RO: DavMethodSet = DavMethodSet(Self::HTTP_RO.0 | DavMethod::PropFind as u32);
    pub const WEBDAV_RW: DavMethodSet = DavMethodSet(0xffffffff & !(DavMethod::Trace as u32 | DavMethod::Post as u32));

    /// New set, all WebDAV methods allowed.
    pub fn all() -> DavMethodSet {
        Self::WEBDAV_RW
    }

    /// New empty set.
    pub fn none() -> DavMethodSet {
        DavMethodSet(0)
    }

    /// Add a method.
    pub fn add(&mut self, m: DavMethod) -> &Self {
        self.0 |= m as u32;
        self
    }

    /// Remove a method.
    pub fn remove(&mut self, m: DavMethod) -> &Self {
        self.0 &= !(m as u32);
        self
    }

    /// Check if a method is in the set.
    pub fn contains(&self, m: DavMethod) -> bool {
        self.0 & (m as u32) > 0
    }
}

// RFC 3339 / ISO 8601 with Z suffix and whole seconds, for DAV:creationdate
// and xs:dateTime values.
pub(crate) fn datetime_to_rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// IMF-fixdate (RFC 7231 7.1.1.1), for DAV:getlastmodified and Last-Modified.
pub(crate) fn datetime_to_httpdate(t: &DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// A plain-text error body: "METHOD PATH\nCODE MESSAGE\n".
pub(crate) fn dav_text_error(method: &str, path: &str, code: u16, message: &str) -> Body {
    Body::from(format!("{} {}\n{} {}\n", method, path, code, message))
}

// An RFC 4918 8.2 <D:error> body.
pub(crate) fn dav_xml_error(element: &str) -> Body {
    let xml = format!(
        "{}\n{}<D:{}/>{}\n",
        r#"<?xml version="1.0" encoding="utf-8" ?>"#,
        r#"<D:error xmlns:D="DAV:">"#,
        element,
        r#"</D:error>"#
    );
    Body::from(xml)
}

// A buffer that implements "Write", so an xml EventWriter can emit
// into it and the result can be flushed out as Bytes chunks.
#[derive(Clone)]
pub(crate) struct MemBuffer(Cursor<Vec<u8>>);

impl MemBuffer {
    pub fn new() -> MemBuffer {
        MemBuffer(Cursor::new(Vec::new()))
    }

    pub fn take(&mut self) -> Bytes {
        let buf = std::mem::take(self.0.get_mut());
        self.0.set_position(0);
        Bytes::from(buf)
    }
}

impl Write for MemBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339() {
        let t = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(datetime_to_rfc3339(&t), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_httpdate() {
        let t = Utc.timestamp_opt(784111777, 0).unwrap();
        assert_eq!(datetime_to_httpdate(&t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn methodset() {
        let mut m = DavMethodSet::none();
        m.add(DavMethod::Get);
        assert!(m.contains(DavMethod::Get));
        assert!(!m.contains(DavMethod::Put));
        assert!(!DavMethodSet::all().contains(DavMethod::Trace));
    }
}
