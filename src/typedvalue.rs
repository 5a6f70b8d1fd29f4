//! Typed property values (RFC 4316).
//!
//! A property element may carry an `xsi:type` attribute naming an XML
//! Schema datatype. On PROPPATCH the value text is validated against the
//! type's lexical form; on PROPFIND, live values computed by a backend are
//! serialized with the matching `xsi:type` attribute.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

pub const NS_XS_URI: &str = "http://www.w3.org/2001/XMLSchema";
pub const NS_XSI_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// The XML Schema datatypes the engine knows how to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XsType {
    String,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Integer,
    UnsignedByte,
    UnsignedShort,
    UnsignedInt,
    UnsignedLong,
    Decimal,
    Float,
    Double,
    Date,
    DateTime,
    Duration,
    AnyUri,
    Base64Binary,
    HexBinary,
}

impl XsType {
    /// Look up a type by its local name in the XML Schema namespace.
    pub fn from_name(name: &str) -> Option<XsType> {
        let t = match name {
            "string" => XsType::String,
            "boolean" => XsType::Boolean,
            "byte" => XsType::Byte,
            "short" => XsType::Short,
            "int" => XsType::Int,
            "long" => XsType::Long,
            "integer" => XsType::Integer,
            "unsignedByte" => XsType::UnsignedByte,
            "unsignedShort" => XsType::UnsignedShort,
            "unsignedInt" => XsType::UnsignedInt,
            "unsignedLong" => XsType::UnsignedLong,
            "decimal" => XsType::Decimal,
            "float" => XsType::Float,
            "double" => XsType::Double,
            "date" => XsType::Date,
            "dateTime" => XsType::DateTime,
            "duration" => XsType::Duration,
            "anyURI" => XsType::AnyUri,
            "base64Binary" => XsType::Base64Binary,
            "hexBinary" => XsType::HexBinary,
            _ => return None,
        };
        Some(t)
    }

    /// The local name, for the `xsi:type` attribute value.
    pub fn name(&self) -> &'static str {
        match self {
            XsType::String => "string",
            XsType::Boolean => "boolean",
            XsType::Byte => "byte",
            XsType::Short => "short",
            XsType::Int => "int",
            XsType::Long => "long",
            XsType::Integer => "integer",
            XsType::UnsignedByte => "unsignedByte",
            XsType::UnsignedShort => "unsignedShort",
            XsType::UnsignedInt => "unsignedInt",
            XsType::UnsignedLong => "unsignedLong",
            XsType::Decimal => "decimal",
            XsType::Float => "float",
            XsType::Double => "double",
            XsType::Date => "date",
            XsType::DateTime => "dateTime",
            XsType::Duration => "duration",
            XsType::AnyUri => "anyURI",
            XsType::Base64Binary => "base64Binary",
            XsType::HexBinary => "hexBinary",
        }
    }

    /// Validate a value against the type's lexical form. The whitespace
    /// facet for these types is "collapse", so surrounding whitespace is
    /// ignored.
    pub fn check(&self, value: &str) -> bool {
        let v = value.trim();
        match self {
            XsType::String | XsType::AnyUri => true,
            XsType::Boolean => matches!(v, "true" | "false" | "1" | "0"),
            XsType::Byte => v.parse::<i8>().is_ok(),
            XsType::Short => v.parse::<i16>().is_ok(),
            XsType::Int => v.parse::<i32>().is_ok(),
            XsType::Long => v.parse::<i64>().is_ok(),
            XsType::Integer => check_integer(v),
            XsType::UnsignedByte => v.parse::<u8>().is_ok(),
            XsType::UnsignedShort => v.parse::<u16>().is_ok(),
            XsType::UnsignedInt => v.parse::<u32>().is_ok(),
            XsType::UnsignedLong => v.parse::<u64>().is_ok(),
            XsType::Decimal => check_decimal(v),
            XsType::Float | XsType::Double => check_float(v),
            XsType::Date => check_date(v),
            XsType::DateTime => check_datetime(v),
            XsType::Duration => check_duration(v),
            XsType::Base64Binary => check_base64(v),
            XsType::HexBinary => v.len() % 2 == 0 && v.bytes().all(|b| b.is_ascii_hexdigit()),
        }
    }
}

// xs:integer has no magnitude limit; any optionally-signed digit string.
fn check_integer(v: &str) -> bool {
    let digits = v.strip_prefix(['+', '-']).unwrap_or(v);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

// xs:decimal: optional sign, digits, optional fraction. No exponent.
fn check_decimal(v: &str) -> bool {
    let v = v.strip_prefix(['+', '-']).unwrap_or(v);
    let (int, frac) = match v.split_once('.') {
        Some((i, f)) => (i, f),
        None => (v, ""),
    };
    (!int.is_empty() || !frac.is_empty())
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

// xs:float / xs:double: decimal with optional exponent, or the specials.
fn check_float(v: &str) -> bool {
    if matches!(v, "INF" | "-INF" | "NaN") {
        return true;
    }
    let (mantissa, exp) = match v.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (v, None),
    };
    if !check_decimal(mantissa) {
        return false;
    }
    match exp {
        Some(e) => {
            let e = e.strip_prefix(['+', '-']).unwrap_or(e);
            !e.is_empty() && e.bytes().all(|b| b.is_ascii_digit())
        }
        None => true,
    }
}

fn strip_tz(v: &str) -> &str {
    if let Some(rest) = v.strip_suffix('Z') {
        return rest;
    }
    // a +hh:mm / -hh:mm suffix; careful not to eat the date's own dashes.
    if v.len() > 6 {
        let (head, tail) = v.split_at(v.len() - 6);
        if (tail.starts_with('+') || tail.starts_with('-')) && tail.as_bytes()[3] == b':' {
            return head;
        }
    }
    v
}

fn check_date(v: &str) -> bool {
    NaiveDate::parse_from_str(strip_tz(v), "%Y-%m-%d").is_ok()
}

fn check_datetime(v: &str) -> bool {
    if DateTime::parse_from_rfc3339(v).is_ok() {
        return true;
    }
    let v = strip_tz(v);
    NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

// ISO 8601 duration: -?PnYnMnDTnHnMnS with at least one component, and
// a T only when time components follow.
fn check_duration(v: &str) -> bool {
    let v = v.strip_prefix('-').unwrap_or(v);
    let v = match v.strip_prefix('P') {
        Some(rest) => rest,
        None => return false,
    };
    let (date_part, time_part) = match v.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (v, None),
    };
    if time_part == Some("") {
        return false;
    }
    let mut components = 0;
    if !check_duration_fields(date_part, &['Y', 'M', 'D'], false, &mut components) {
        return false;
    }
    if let Some(t) = time_part {
        if !check_duration_fields(t, &['H', 'M', 'S'], true, &mut components) {
            return false;
        }
    }
    components > 0
}

fn check_duration_fields(mut v: &str, designators: &[char], frac_last: bool, count: &mut u32) -> bool {
    let mut allowed = 0;
    while !v.is_empty() {
        let end = match v.find(|c: char| !c.is_ascii_digit() && c != '.') {
            Some(e) => e,
            None => return false,
        };
        let num = &v[..end];
        let des = v.as_bytes()[end] as char;
        let pos = match designators[allowed..].iter().position(|&d| d == des) {
            Some(p) => allowed + p,
            None => return false,
        };
        let is_frac_ok = frac_last && des == *designators.last().unwrap();
        let valid_num = if is_frac_ok {
            check_decimal(num) && !num.is_empty()
        } else {
            !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit())
        };
        if !valid_num {
            return false;
        }
        allowed = pos + 1;
        *count += 1;
        v = &v[end + 1..];
    }
    true
}

fn check_base64(v: &str) -> bool {
    let chars: Vec<u8> = v.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if chars.len() % 4 != 0 {
        return false;
    }
    let pad = chars.iter().rev().take_while(|&&b| b == b'=').count();
    if pad > 2 {
        return false;
    }
    chars[..chars.len() - pad]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// A typed value produced by live-property computation.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Decimal(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// An already-valid xs:duration lexical value.
    Duration(String),
    Uri(String),
    /// An already-valid base64 lexical value.
    Base64(String),
    /// An already-valid hex lexical value.
    Hex(String),
}

impl TypedValue {
    /// The schema type to put in `xsi:type`. Plain strings carry no type
    /// attribute at all.
    pub fn xs_type(&self) -> Option<XsType> {
        match self {
            TypedValue::String(_) => None,
            TypedValue::Boolean(_) => Some(XsType::Boolean),
            TypedValue::Integer(_) => Some(XsType::Long),
            TypedValue::Unsigned(_) => Some(XsType::UnsignedLong),
            TypedValue::Decimal(_) => Some(XsType::Double),
            TypedValue::Date(_) => Some(XsType::Date),
            TypedValue::DateTime(_) => Some(XsType::DateTime),
            TypedValue::Duration(_) => Some(XsType::Duration),
            TypedValue::Uri(_) => Some(XsType::AnyUri),
            TypedValue::Base64(_) => Some(XsType::Base64Binary),
            TypedValue::Hex(_) => Some(XsType::HexBinary),
        }
    }

    /// The canonical lexical form of the value.
    pub fn to_text(&self) -> String {
        match self {
            TypedValue::String(s) => s.clone(),
            TypedValue::Boolean(b) => b.to_string(),
            TypedValue::Integer(i) => i.to_string(),
            TypedValue::Unsigned(u) => u.to_string(),
            TypedValue::Decimal(d) => d.to_string(),
            TypedValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            TypedValue::DateTime(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
            TypedValue::Duration(s) | TypedValue::Uri(s) => s.clone(),
            TypedValue::Base64(s) | TypedValue::Hex(s) => s.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn integer_family() {
        assert!(XsType::Int.check("42"));
        assert!(XsType::Int.check("-42"));
        assert!(!XsType::Int.check("notanint"));
        assert!(!XsType::Int.check("4294967296"));
        assert!(XsType::UnsignedByte.check("255"));
        assert!(!XsType::UnsignedByte.check("256"));
        assert!(XsType::Integer.check("99999999999999999999999999"));
        assert!(!XsType::Integer.check(""));
    }

    #[test]
    fn decimal_and_float() {
        assert!(XsType::Decimal.check("3.14"));
        assert!(XsType::Decimal.check("-.5"));
        assert!(!XsType::Decimal.check("1e3"));
        assert!(XsType::Double.check("1e3"));
        assert!(XsType::Double.check("-INF"));
        assert!(!XsType::Double.check("e3"));
    }

    #[test]
    fn boolean_forms() {
        for v in ["true", "false", "1", "0"] {
            assert!(XsType::Boolean.check(v));
        }
        assert!(!XsType::Boolean.check("TRUE"));
    }

    #[test]
    fn dates() {
        assert!(XsType::Date.check("2004-02-29"));
        assert!(!XsType::Date.check("2003-02-29"));
        assert!(XsType::DateTime.check("1996-12-19T16:39:57Z"));
        assert!(XsType::DateTime.check("1996-12-19T16:39:57-08:00"));
        assert!(XsType::DateTime.check("1996-12-19T16:39:57"));
        assert!(!XsType::DateTime.check("1996-12-19"));
    }

    #[test]
    fn durations() {
        assert!(XsType::Duration.check("P1Y2M3DT4H5M6S"));
        assert!(XsType::Duration.check("PT0.5S"));
        assert!(XsType::Duration.check("-P7D"));
        assert!(!XsType::Duration.check("P"));
        assert!(!XsType::Duration.check("P1S"));
        assert!(!XsType::Duration.check("P1YT"));
    }

    #[test]
    fn binary() {
        assert!(XsType::Base64Binary.check("aGVsbG8="));
        assert!(!XsType::Base64Binary.check("aGVsbG8"));
        assert!(XsType::HexBinary.check("deadBEEF"));
        assert!(!XsType::HexBinary.check("abc"));
    }

    #[test]
    fn typed_value_serialization() {
        let v = TypedValue::DateTime(Utc.timestamp_opt(851020797, 0).unwrap());
        assert_eq!(v.xs_type(), Some(XsType::DateTime));
        assert_eq!(v.to_text(), "1996-12-19T16:39:57Z");
        assert_eq!(TypedValue::String("x".into()).xs_type(), None);
    }
}
