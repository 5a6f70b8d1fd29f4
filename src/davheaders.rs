//! Typed WebDAV request/response headers.
//!
//! Everything here implements `headers::Header`, so the handlers read and
//! write them through `HeaderMapExt::typed_try_get` / `typed_insert`.
//! `typed_try_get` is used on the request side so that a syntactically
//! invalid header turns into a 400 instead of being silently ignored.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use headers::Header;
use http::header::{HeaderName, HeaderValue};

static DEPTH: HeaderName = HeaderName::from_static("depth");
static TIMEOUT: HeaderName = HeaderName::from_static("timeout");
static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
static DESTINATION: HeaderName = HeaderName::from_static("destination");
static ETAG: HeaderName = HeaderName::from_static("etag");
static IF_MATCH: HeaderName = HeaderName::from_static("if-match");
static IF_NONE_MATCH: HeaderName = HeaderName::from_static("if-none-match");
static IF_MODIFIED_SINCE: HeaderName = HeaderName::from_static("if-modified-since");
static IF_UNMODIFIED_SINCE: HeaderName = HeaderName::from_static("if-unmodified-since");
static IF: HeaderName = HeaderName::from_static("if");
static LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");
static DAV: HeaderName = HeaderName::from_static("dav");
static CONTENT_LOCATION: HeaderName = HeaderName::from_static("content-location");

// helper.
fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        Err(invalid())
    } else {
        Ok(v)
    }
}

// helper
fn invalid() -> headers::Error {
    headers::Error::invalid()
}

// helper
fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

macro_rules! string_header {
    ($tname:ident, $hname:ident) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $tname(pub String);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                one(values)?
                    .to_str()
                    .map(|x| $tname(x.to_owned()))
                    .map_err(map_invalid)
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                if let Ok(value) = HeaderValue::from_str(&self.0) {
                    values.extend(std::iter::once(value));
                }
            }
        }
    };
}

string_header!(Dav, DAV);
string_header!(ContentLocation, CONTENT_LOCATION);

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)?.as_bytes() {
            b"0" => Ok(Depth::Zero),
            b"1" => Ok(Depth::One),
            b"infinity" => Ok(Depth::Infinity),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// One Timeout header value: `Second-N` or `Infinite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavTimeout {
    Seconds(u32),
    Infinite,
}

/// Timeout: header, a preference-ordered list.
#[derive(Debug, Clone)]
pub struct Timeout(pub Vec<DavTimeout>);

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        let mut v = Vec::new();
        for word in value.to_str().map_err(map_invalid)?.split(',') {
            let word = word.trim();
            let w = match word {
                "Infinite" => DavTimeout::Infinite,
                _ => match word.strip_prefix("Second-") {
                    Some(num) => DavTimeout::Seconds(num.parse::<u32>().map_err(map_invalid)?),
                    None => return Err(invalid()),
                },
            };
            v.push(w);
        }
        if v.is_empty() {
            return Err(invalid());
        }
        Ok(Timeout(v))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = self
            .0
            .iter()
            .map(|s| match s {
                DavTimeout::Seconds(n) => format!("Second-{}", n),
                DavTimeout::Infinite => "Infinite".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&value) {
            values.extend(std::iter::once(value));
        }
    }
}

/// Destination: header, reduced to the path part.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?;
        if s.starts_with('/') {
            return Ok(Destination(s.to_string()));
        }
        let url = url::Url::parse(s).map_err(map_invalid)?;
        match url.scheme() {
            "http" | "https" => Ok(Destination(url.path().to_string())),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

/// Overwrite: header. `T` or `F`, case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)?.as_bytes() {
            b"F" => Ok(Overwrite(false)),
            b"T" => Ok(Overwrite(true)),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Lock-Token: header. The angle brackets are stripped on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct LockToken(pub String);

impl Header for LockToken {
    fn name() -> &'static HeaderName {
        &LOCK_TOKEN
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?.trim();
        match s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            Some(tok) if !tok.is_empty() => Ok(LockToken(tok.to_string())),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        if let Ok(value) = HeaderValue::from_str(&format!("<{}>", self.0)) {
            values.extend(std::iter::once(value));
        }
    }
}

/// An entity tag: opaque bytes plus a strong/weak flag.
#[derive(Debug, Clone)]
pub struct ETag {
    tag: String,
    weak: bool,
}

impl ETag {
    pub fn new(weak: bool, tag: impl Into<String>) -> ETag {
        ETag {
            tag: tag.into(),
            weak,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// Strong comparison: equal tags and neither side weak.
    pub fn strong_eq(&self, other: &ETag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }

    /// Weak comparison: equal tags, flags ignored.
    pub fn weak_eq(&self, other: &ETag) -> bool {
        self.tag == other.tag
    }
}

// `==` is the strong comparison.
impl PartialEq for ETag {
    fn eq(&self, other: &Self) -> bool {
        self.strong_eq(other)
    }
}

impl FromStr for ETag {
    type Err = headers::Error;

    fn from_str(t: &str) -> Result<Self, Self::Err> {
        let (tag, rest) = parse_etag(t.trim())?;
        if !rest.trim().is_empty() {
            return Err(invalid());
        }
        Ok(tag)
    }
}

impl Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.weak {
            write!(f, "W/")?;
        }
        write!(f, "\"")?;
        for c in self.tag.chars() {
            if c == '"' || c == '\\' {
                write!(f, "\\")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "\"")
    }
}

impl Header for ETag {
    fn name() -> &'static HeaderName {
        &ETAG
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        ETag::from_str(one(values)?.to_str().map_err(map_invalid)?)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        if let Ok(value) = HeaderValue::from_str(&self.to_string()) {
            values.extend(std::iter::once(value));
        }
    }
}

// parse one entity tag off the front of `s`, returning the rest.
// rejects unterminated quoted strings.
fn parse_etag(s: &str) -> Result<(ETag, &str), headers::Error> {
    let (weak, s) = match s.strip_prefix("W/") {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let s = s.strip_prefix('"').ok_or_else(invalid)?;
    let mut tag = String::new();
    let mut chars = s.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => return Ok((ETag { tag, weak }, &s[idx + 1..])),
            Some((_, '\\')) => match chars.next() {
                Some((_, c)) => tag.push(c),
                None => return Err(invalid()),
            },
            Some((_, c)) => tag.push(c),
            None => return Err(invalid()),
        }
    }
}

/// `If-Match` / `If-None-Match` value: `*` or a list of entity tags.
#[derive(Debug, Clone, PartialEq)]
pub enum ETagList {
    Tags(Vec<ETag>),
    Star,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfMatch(pub ETagList);

#[derive(Debug, Clone, PartialEq)]
pub struct IfNoneMatch(pub ETagList);

fn decode_etaglist<'i, I>(values: &mut I) -> Result<ETagList, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let mut v = Vec::new();
    let mut seen = false;
    for value in values {
        seen = true;
        let mut s = value.to_str().map_err(map_invalid)?.trim();
        if s == "*" {
            return Ok(ETagList::Star);
        }
        while !s.is_empty() {
            let (tag, rest) = parse_etag(s)?;
            v.push(tag);
            s = rest.trim_start();
            if let Some(rest) = s.strip_prefix(',') {
                s = rest.trim_start();
            } else if !s.is_empty() {
                return Err(invalid());
            }
        }
    }
    if seen {
        Ok(ETagList::Tags(v))
    } else {
        Err(invalid())
    }
}

fn encode_etaglist<E>(m: &ETagList, values: &mut E)
where
    E: Extend<HeaderValue>,
{
    let value = match m {
        ETagList::Star => "*".to_string(),
        ETagList::Tags(t) => t
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<String>>()
            .join(", "),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        values.extend(std::iter::once(value));
    }
}

impl Header for IfMatch {
    fn name() -> &'static HeaderName {
        &IF_MATCH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(IfMatch(decode_etaglist(values)?))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_etaglist(&self.0, values)
    }
}

impl Header for IfNoneMatch {
    fn name() -> &'static HeaderName {
        &IF_NONE_MATCH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(IfNoneMatch(decode_etaglist(values)?))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_etaglist(&self.0, values)
    }
}

/// An HTTP-date, accepting the three formats of RFC 7231 7.1.1.1 and
/// normalized to UTC with whole-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpDate(pub DateTime<Utc>);

impl FromStr for HttpDate {
    type Err = headers::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // preferred: IMF-fixdate, RFC 5322 style.
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S GMT") {
            return Ok(HttpDate(Utc.from_utc_datetime(&dt)));
        }
        // obsolete: ANSI C asctime().
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%a %b %e %H:%M:%S %Y") {
            return Ok(HttpDate(Utc.from_utc_datetime(&dt)));
        }
        // obsolete: RFC 850, with a two-digit year. The year is picked
        // inside a 50-year rolling window around the current year.
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%A, %d-%b-%y %H:%M:%S GMT") {
            let yy = dt.year() % 100;
            let cur = Utc::now().year();
            let mut year = cur - cur % 100 + yy;
            if year - cur > 50 {
                year -= 100;
            } else if cur - year >= 50 {
                year += 100;
            }
            let date = NaiveDate::from_ymd_opt(year, dt.month(), dt.day())
                .ok_or_else(invalid)?
                .and_time(dt.time());
            return Ok(HttpDate(Utc.from_utc_datetime(&date)));
        }
        Err(invalid())
    }
}

impl Display for HttpDate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%a, %d %b %Y %H:%M:%S GMT"))
    }
}

macro_rules! date_header {
    ($tname:ident, $hname:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $tname(pub HttpDate);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                let s = one(values)?.to_str().map_err(map_invalid)?;
                Ok($tname(HttpDate::from_str(s)?))
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                if let Ok(value) = HeaderValue::from_str(&self.0.to_string()) {
                    values.extend(std::iter::once(value));
                }
            }
        }
    };
}

date_header!(IfModifiedSince, IF_MODIFIED_SINCE);
date_header!(IfUnmodifiedSince, IF_UNMODIFIED_SINCE);

// The "If" header contains IfLists, of which the results are ORed.
#[derive(Debug, Clone, PartialEq)]
pub struct If(pub Vec<IfList>);

// An IfList contains Conditions, of which the results are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct IfList {
    pub resource_tag: Option<url::Url>,
    pub conditions: Vec<IfCondition>,
}

impl IfList {
    fn new() -> IfList {
        IfList {
            resource_tag: None,
            conditions: Vec::new(),
        }
    }
    fn add(&mut self, not: bool, item: IfItem) {
        self.conditions.push(IfCondition { not, item });
    }
}

// Single condition is [Not] State-Token | ETag.
#[derive(Debug, Clone, PartialEq)]
pub struct IfCondition {
    pub not: bool,
    pub item: IfItem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IfItem {
    StateToken(String),
    ETag(ETag),
}

// Tokenizer for the If header.
#[derive(Debug, Clone, PartialEq)]
enum IfToken {
    ListOpen,
    ListClose,
    Not,
    Pointy(String),
    ETag(ETag),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum IfState {
    Start,
    RTag,
    List,
    Not,
    Bad,
}

fn get_token(buf: &str) -> Result<(IfToken, &str), headers::Error> {
    let buf = buf.trim_start();
    let mut chars = buf.chars();
    match chars.next() {
        None => Ok((IfToken::End, buf)),
        Some('(') => Ok((IfToken::ListOpen, &buf[1..])),
        Some(')') => Ok((IfToken::ListClose, &buf[1..])),
        Some('N') if buf.starts_with("Not") => Ok((IfToken::Not, &buf[3..])),
        Some('<') => {
            let end = buf.find('>').ok_or_else(invalid)?;
            let tok = &buf[1..end];
            if tok.is_empty() || tok.contains(char::is_whitespace) {
                return Err(invalid());
            }
            Ok((IfToken::Pointy(tok.to_string()), &buf[end + 1..]))
        }
        Some('[') => {
            let end = buf.find(']').ok_or_else(invalid)?;
            let etag = ETag::from_str(&buf[1..end])?;
            Ok((IfToken::ETag(etag), &buf[end + 1..]))
        }
        _ => Err(invalid()),
    }
}

impl Header for If {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        // one big state machine.
        let mut if_lists = If(Vec::new());
        let mut cur_list = IfList::new();

        let mut state = IfState::Start;
        let mut input = one(values)?.to_str().map_err(map_invalid)?;

        loop {
            let (tok, rest) = get_token(input)?;
            input = rest;
            state = match state {
                IfState::Start => match tok {
                    IfToken::ListOpen => IfState::List,
                    IfToken::Pointy(url) => {
                        let u = url::Url::parse(&url).map_err(map_invalid)?;
                        cur_list.resource_tag = Some(u);
                        IfState::RTag
                    }
                    IfToken::End => {
                        if !if_lists.0.is_empty() {
                            break;
                        }
                        IfState::Bad
                    }
                    _ => IfState::Bad,
                },
                IfState::RTag => match tok {
                    IfToken::ListOpen => IfState::List,
                    _ => IfState::Bad,
                },
                IfState::List | IfState::Not => {
                    let not = state == IfState::Not;
                    match tok {
                        IfToken::Not => {
                            if not {
                                IfState::Bad
                            } else {
                                IfState::Not
                            }
                        }
                        IfToken::Pointy(stok) => {
                            cur_list.add(not, IfItem::StateToken(stok));
                            IfState::List
                        }
                        IfToken::ETag(etag) => {
                            cur_list.add(not, IfItem::ETag(etag));
                            IfState::List
                        }
                        IfToken::ListClose => {
                            if not || cur_list.conditions.is_empty() {
                                IfState::Bad
                            } else {
                                if_lists.0.push(cur_list);
                                cur_list = IfList::new();
                                IfState::Start
                            }
                        }
                        _ => IfState::Bad,
                    }
                }
                IfState::Bad => return Err(invalid()),
            };
        }
        Ok(if_lists)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let mut out = String::new();
        for (i, list) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            if let Some(ref url) = list.resource_tag {
                out.push('<');
                out.push_str(url.as_str());
                out.push_str("> ");
            }
            out.push('(');
            for (j, cond) in list.conditions.iter().enumerate() {
                if j > 0 {
                    out.push(' ');
                }
                if cond.not {
                    out.push_str("Not ");
                }
                match cond.item {
                    IfItem::StateToken(ref t) => {
                        out.push('<');
                        out.push_str(t);
                        out.push('>');
                    }
                    IfItem::ETag(ref t) => {
                        out.push('[');
                        out.push_str(&t.to_string());
                        out.push(']');
                    }
                }
            }
            out.push(')');
        }
        if let Ok(value) = HeaderValue::from_str(&out) {
            values.extend(std::iter::once(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one<H: Header>(s: &'static str) -> Result<H, headers::Error> {
        let val = HeaderValue::from_static(s);
        let mut iter = std::iter::once(&val);
        H::decode(&mut iter)
    }

    #[test]
    fn depth_values() {
        assert_eq!(decode_one::<Depth>("0").unwrap(), Depth::Zero);
        assert_eq!(decode_one::<Depth>("infinity").unwrap(), Depth::Infinity);
        assert!(decode_one::<Depth>("2").is_err());
        assert!(decode_one::<Depth>("Infinity").is_err());
    }

    #[test]
    fn overwrite_is_case_sensitive() {
        assert_eq!(decode_one::<Overwrite>("T").unwrap(), Overwrite(true));
        assert_eq!(decode_one::<Overwrite>("F").unwrap(), Overwrite(false));
        assert!(decode_one::<Overwrite>("t").is_err());
    }

    #[test]
    fn timeout_list() {
        let t = decode_one::<Timeout>("Second-600, Infinite").unwrap();
        assert_eq!(t.0, vec![DavTimeout::Seconds(600), DavTimeout::Infinite]);
        assert!(decode_one::<Timeout>("Second-x").is_err());
    }

    #[test]
    fn etag_comparisons() {
        let t1 = ETag::from_str(r#"W/"12345""#).unwrap();
        let t2 = ETag::from_str(r#"W/"12345""#).unwrap();
        let t3 = ETag::from_str(r#""12346""#).unwrap();
        let t4 = ETag::from_str(r#""12346""#).unwrap();
        assert!(!t1.strong_eq(&t2));
        assert!(t1.weak_eq(&t2));
        assert!(t3.strong_eq(&t4));
    }

    #[test]
    fn etag_round_trip() {
        for (tag, weak) in [("simple", false), ("we\\ird\"x", true), ("", false)] {
            let t = ETag::new(weak, tag);
            let parsed = ETag::from_str(&t.to_string()).unwrap();
            assert_eq!(parsed.tag(), tag);
            assert_eq!(parsed.is_weak(), weak);
        }
    }

    #[test]
    fn etag_unterminated() {
        assert!(ETag::from_str(r#""never-closed"#).is_err());
        assert!(decode_one::<IfMatch>(r#""a", "b"#).is_err());
    }

    #[test]
    fn etag_list() {
        let m = decode_one::<IfMatch>(r#" "a" , W/"b" "#).unwrap();
        match m.0 {
            ETagList::Tags(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v[0].tag(), "a");
                assert!(v[1].is_weak());
            }
            _ => panic!("expected tags"),
        }
        assert_eq!(decode_one::<IfNoneMatch>("*").unwrap().0, ETagList::Star);
    }

    #[test]
    fn http_date_three_formats() {
        let want = HttpDate::from_str("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        let rfc850 = HttpDate::from_str("Sunday, 06-Nov-94 08:49:37 GMT").unwrap();
        let asctime = HttpDate::from_str("Sun Nov  6 08:49:37 1994").unwrap();
        assert_eq!(want, rfc850);
        assert_eq!(want, asctime);
        assert_eq!(want.0.timestamp_subsec_nanos(), 0);
        assert!(HttpDate::from_str("yesterday").is_err());
    }

    #[test]
    fn if_header_round_trip() {
        let hdr = decode_one::<If>(r#"<http://x.yz/r> ([W/"etag"] Not <urn:x>) (Not <urn:y> ["t"])"#)
            .unwrap();
        let mut encoded = Vec::new();
        hdr.encode(&mut encoded);
        let mut iter = encoded.iter();
        let hdr2 = If::decode(&mut iter).unwrap();
        assert_eq!(hdr, hdr2);
    }

    #[test]
    fn if_header_rejects_garbage() {
        assert!(decode_one::<If>("()").is_err());
        assert!(decode_one::<If>("plain").is_err());
        assert!(decode_one::<If>("(<urn:x>").is_err());
    }
}
