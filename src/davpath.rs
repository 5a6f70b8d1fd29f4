//! Canonical resource paths.
//!
//! A `DavPath` is the percent-decoded, normalized form of the path part of
//! a request URL, with the configured routing prefix split off. Collections
//! keep their trailing slash, but two paths that differ only in the
//! trailing slash compare equal (they name the same resource).

use percent_encoding as pct;

use crate::errors::DavError;

// Encode all non-unreserved characters, except '/'.
// See RFC 3986, section 2.3.
const PATH_ENCODE_SET: &pct::AsciiSet = &pct::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// URL path, with hidden prefix.
#[derive(Clone)]
pub struct DavPath {
    fullpath: Vec<u8>,
    pfxlen: usize,
}

/// Error returned by the `DavPath` constructors.
#[derive(Debug)]
pub enum ParseError {
    /// cannot parse
    InvalidPath,
    /// outside of prefix
    PrefixMismatch,
    /// too many dotdots
    ForbiddenPath,
}

impl std::error::Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<ParseError> for DavError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::InvalidPath => DavError::InvalidPath,
            ParseError::PrefixMismatch => DavError::IllegalPath,
            ParseError::ForbiddenPath => DavError::ForbiddenPath,
        }
    }
}

// a decoded segment can contain any value except '/' or '\0'
fn valid_segment(src: &[u8]) -> Result<(), ParseError> {
    let mut p = pct::percent_decode(src);
    if p.any(|x| x == 0 || x == b'/') {
        return Err(ParseError::InvalidPath);
    }
    Ok(())
}

fn encode_path(src: &[u8]) -> String {
    pct::percent_encode(src, PATH_ENCODE_SET).to_string()
}

// normalize a raw request path:
// - printable ascii only, absolute, no fragment, query stripped
// - merge consecutive slashes, resolve . and ..
// - percent-decode, reject NUL or '/' inside a segment
fn normalize_path(rp: &[u8]) -> Result<Vec<u8>, ParseError> {
    if rp.iter().any(|&x| !(32..127).contains(&x)) {
        return Err(ParseError::InvalidPath);
    }

    let mut rawpath = rp;
    if let Some(pos) = rawpath.iter().position(|&x| x == b'?' || x == b'#') {
        if rawpath[pos] == b'#' {
            return Err(ParseError::InvalidPath);
        }
        rawpath = &rawpath[..pos];
    }

    if rawpath.is_empty() || rawpath[0] != b'/' {
        return Err(ParseError::InvalidPath);
    }

    let isdir = rawpath.ends_with(b"/");
    let mut v: Vec<&[u8]> = Vec::new();
    for segment in rawpath.split(|c| *c == b'/') {
        match segment {
            b"." | b"" => {}
            b".." => {
                if v.is_empty() {
                    return Err(ParseError::ForbiddenPath);
                }
                v.pop();
            }
            s => {
                valid_segment(s)?;
                v.push(s);
            }
        }
    }

    let mut path = Vec::with_capacity(rawpath.len());
    for seg in &v {
        path.push(b'/');
        path.extend(pct::percent_decode(seg));
    }
    if isdir || v.is_empty() {
        path.push(b'/');
    }
    Ok(path)
}

/// Comparison ignores any trailing slash, so /foo == /foo/
impl PartialEq for DavPath {
    fn eq(&self, rhs: &DavPath) -> bool {
        trim_slash(&self.fullpath) == trim_slash(&rhs.fullpath)
    }
}

impl Eq for DavPath {}

fn trim_slash(p: &[u8]) -> &[u8] {
    if p.len() > 1 && p.ends_with(b"/") {
        &p[..p.len() - 1]
    } else {
        p
    }
}

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.path_bytes()))
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.pfxlen > 0 {
            write!(
                f,
                "{}[{}]",
                String::from_utf8_lossy(self.prefix_bytes()),
                String::from_utf8_lossy(self.path_bytes())
            )
        } else {
            write!(f, "{}", String::from_utf8_lossy(self.path_bytes()))
        }
    }
}

impl DavPath {
    /// From an URL-encoded path.
    pub fn new(src: &str) -> Result<DavPath, ParseError> {
        Ok(DavPath {
            fullpath: normalize_path(src.as_bytes())?,
            pfxlen: 0,
        })
    }

    /// From an URL-encoded path and a non-encoded prefix.
    pub fn from_str_and_prefix(src: &str, prefix: &str) -> Result<DavPath, ParseError> {
        let mut path = DavPath::new(src)?;
        path.set_prefix(prefix)?;
        Ok(path)
    }

    /// From a request URI and a non-encoded prefix.
    pub(crate) fn from_uri_and_prefix(uri: &http::uri::Uri, prefix: &str) -> Result<Self, ParseError> {
        match uri.path() {
            "*" => Ok(DavPath {
                fullpath: b"*".to_vec(),
                pfxlen: 0,
            }),
            path if path.starts_with('/') => DavPath::from_str_and_prefix(path, prefix),
            _ => Err(ParseError::InvalidPath),
        }
    }

    /// Strip the routing prefix off the front of the path.
    pub fn set_prefix(&mut self, prefix: &str) -> Result<(), ParseError> {
        let prefix = prefix.as_bytes();
        if !self.fullpath.starts_with(prefix) {
            return Err(ParseError::PrefixMismatch);
        }
        let mut pfxlen = prefix.len();
        if prefix.ends_with(b"/") {
            pfxlen -= 1;
            if self.fullpath[pfxlen] != b'/' {
                return Err(ParseError::PrefixMismatch);
            }
        } else if self.fullpath.len() == pfxlen {
            self.fullpath.push(b'/');
        }
        self.pfxlen = pfxlen;
        Ok(())
    }

    fn prefix_bytes(&self) -> &[u8] {
        &self.fullpath[..self.pfxlen]
    }

    fn path_bytes(&self) -> &[u8] {
        &self.fullpath[self.pfxlen..]
    }

    /// The URL prefix this path was routed through.
    pub fn prefix(&self) -> &str {
        std::str::from_utf8(self.prefix_bytes()).unwrap_or("")
    }

    /// Raw decoded bytes of the path, without the prefix.
    pub fn as_bytes(&self) -> &[u8] {
        self.path_bytes()
    }

    /// The decoded path bytes with any trailing slash removed. This is the
    /// form paths are compared and keyed by.
    pub fn key_bytes(&self) -> &[u8] {
        let b = trim_slash(self.path_bytes());
        if b == b"/" {
            b""
        } else {
            b
        }
    }

    /// As percent-encoded string, without the prefix.
    pub fn as_url_string(&self) -> String {
        encode_path(self.path_bytes())
    }

    /// As percent-encoded string, with the prefix.
    pub fn as_url_string_with_prefix(&self) -> String {
        encode_path(&self.fullpath)
    }

    /// Does the path end in `/`.
    pub fn is_collection(&self) -> bool {
        self.path_bytes().ends_with(b"/")
    }

    // is this a "star" request (only used with OPTIONS)
    pub(crate) fn is_star(&self) -> bool {
        self.fullpath == b"*"
    }

    /// True if `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &DavPath) -> bool {
        let key = self.key_bytes();
        let other = other.key_bytes();
        other.len() > key.len() && other.starts_with(key) && other[key.len()] == b'/'
    }

    /// Add a slash to the end of the path, if not already present.
    pub(crate) fn add_slash(&mut self) {
        if !self.is_collection() {
            self.fullpath.push(b'/');
        }
    }

    pub(crate) fn add_slash_if(&mut self, b: bool) {
        if b {
            self.add_slash();
        }
    }

    /// Append one (decoded) segment to the path.
    pub(crate) fn push_segment(&mut self, b: &[u8]) {
        if !self.is_collection() {
            self.fullpath.push(b'/');
        }
        self.fullpath.extend_from_slice(b);
    }

    /// The parent collection (always ends in a slash).
    pub fn parent(&self) -> DavPath {
        let path = trim_slash(self.path_bytes());
        let end = path.iter().rposition(|&c| c == b'/').unwrap_or(0);
        let mut fullpath = self.prefix_bytes().to_vec();
        fullpath.extend_from_slice(&path[..end + 1]);
        DavPath {
            fullpath,
            pfxlen: self.pfxlen,
        }
    }

    /// The last segment of the path. Empty for the root.
    pub fn file_name_bytes(&self) -> &[u8] {
        let path = trim_slash(self.path_bytes());
        match path.iter().rposition(|&c| c == b'/') {
            Some(pos) => &path[pos + 1..],
            None => b"",
        }
    }

    /// The last segment of the path, as UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        let name = self.file_name_bytes();
        if name.is_empty() {
            None
        } else {
            std::str::from_utf8(name).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        let p = DavPath::new("/a//b/./c/%41?q=1").unwrap();
        assert_eq!(p.as_bytes(), b"/a/b/c/A");
        assert_eq!(p.as_url_string(), "/a/b/c/A");
    }

    #[test]
    fn dotdot() {
        assert_eq!(DavPath::new("/a/b/../c").unwrap().as_bytes(), b"/a/c");
        assert!(DavPath::new("/../x").is_err());
    }

    #[test]
    fn trailing_slash_equality() {
        let a = DavPath::new("/a/b").unwrap();
        let b = DavPath::new("/a/b/").unwrap();
        assert_eq!(a, b);
        assert!(b.is_collection());
        assert!(!a.is_collection());
    }

    #[test]
    fn prefix() {
        let p = DavPath::from_str_and_prefix("/dav/x/y", "/dav").unwrap();
        assert_eq!(p.as_bytes(), b"/x/y");
        assert_eq!(p.as_url_string_with_prefix(), "/dav/x/y");
        assert!(DavPath::from_str_and_prefix("/other/x", "/dav").is_err());
    }

    #[test]
    fn parent_and_name() {
        let p = DavPath::new("/a/b/c/").unwrap();
        assert_eq!(p.parent().as_bytes(), b"/a/b/");
        assert_eq!(p.file_name(), Some("c"));
        assert_eq!(DavPath::new("/").unwrap().file_name(), None);
    }

    #[test]
    fn ancestry() {
        let root = DavPath::new("/a/").unwrap();
        let sub = DavPath::new("/a/b").unwrap();
        let sibling = DavPath::new("/ab").unwrap();
        assert!(root.is_ancestor_of(&sub));
        assert!(!root.is_ancestor_of(&sibling));
        assert!(!root.is_ancestor_of(&root.clone()));
    }
}
