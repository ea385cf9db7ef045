//! Retrieve and process the WebDAV request headers.
//!
//! Everything here is a pure function of the request's header map.
//! Evaluating the conditional headers against a resource is up to the
//! method handler; this module only parses them.

use std::fmt;
use std::str::FromStr;

use headers::{Header, HeaderName, HeaderValue};
use http::header::{HeaderMap, LOCATION};
use http::Response;

use crate::errors::DavError;
use crate::DavResult;

lazy_static! {
    static ref DEPTH: HeaderName = HeaderName::from_static("depth");
    static ref BRIEF: HeaderName = HeaderName::from_static("brief");
    static ref PREFER: HeaderName = HeaderName::from_static("prefer");
    static ref IF: HeaderName = HeaderName::from_static("if");
    static ref IF_SCHEDULE_TAG_MATCH: HeaderName =
        HeaderName::from_static("if-schedule-tag-match");
    static ref X_HTTP_METHOD_OVERRIDE: HeaderName =
        HeaderName::from_static("x-http-method-override");
}

// First value of a header as a string. A value that is not visible
// ASCII is a malformed request.
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> DavResult<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .map(Some)
            .map_err(|_| DavError::bad_request(format!("Invalid {name} header"))),
    }
}

// Same, but unreadable values count as absent.
fn header_string(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Value of the `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl FromStr for Depth {
    type Err = DavError;

    fn from_str(s: &str) -> DavResult<Depth> {
        match s {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            "infinity" => Ok(Depth::Infinity),
            _ => Err(DavError::bad_request(format!("Invalid Depth header: {s}"))),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        })
    }
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        values
            .next()
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(headers::Error::invalid)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(HeaderValue::from_static(match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        })));
    }
}

/// Get the depth header.
///
/// Returns `default` if the header is absent. Verbs that need an
/// explicit depth pass `None`, the others `Some(Depth::Infinity)`.
pub fn depth(headers: &HeaderMap, default: Option<Depth>) -> DavResult<Option<Depth>> {
    match header_str(headers, &DEPTH)? {
        None => Ok(default),
        Some(s) => s.parse().map(Some),
    }
}

/// True if we have a (MS) `Brief: T` header, or a `Prefer` header
/// with `return-minimal`.
pub fn brief(headers: &HeaderMap) -> bool {
    if let Some(b) = header_string(headers, &BRIEF) {
        return b.eq_ignore_ascii_case("T");
    }
    match header_string(headers, &PREFER) {
        Some(p) => p
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case("return-minimal")),
        None => false,
    }
}

/// Set the `Location` header, verbatim.
pub fn make_location<B>(resp: &mut Response<B>, url: &str) -> DavResult<()> {
    let value = HeaderValue::from_str(url).map_err(DavError::other)?;
    resp.headers_mut().insert(LOCATION, value);
    Ok(())
}

/// One condition of an `If` header list.
///
/// An entity tag is surrounded by `[` and `]`, a state token by
/// `<` and `>`. The delimiters are not part of `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOrToken {
    /// True if value is an entity tag.
    pub entity_tag: bool,
    /// The condition was prefixed with `Not`.
    pub negated: bool,
    pub value: String,
}

/// Parsed `If` header (RFC4918 section 10.4).
///
/// ```text
///  If = "If" ":" ( 1*No-tag-list | 1*Tagged-list )
///  No-tag-list = List
///  Tagged-list = Resource-Tag 1*List
///  List = "(" 1*Condition ")"
///  Condition = ["Not"] (State-token | "[" entity-tag "]")
///  Resource-Tag = "<" Simple-ref ">"
/// ```
///
/// Only a single list is accepted. The order of the conditions is
/// kept as sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfHeader {
    /// `None` if there is no resource tag.
    pub resource_tag: Option<String>,
    pub tags_and_tokens: Vec<TagOrToken>,
}

impl FromStr for IfHeader {
    type Err = DavError;

    fn from_str(raw: &str) -> DavResult<IfHeader> {
        let invalid = || DavError::bad_request(format!("Invalid If header: {raw}"));

        let mut h = raw.trim();
        let mut ih = IfHeader::default();

        if let Some(rest) = h.strip_prefix('<') {
            let pos = rest.find('>').ok_or_else(invalid)?;
            ih.resource_tag = Some(rest[..pos].to_string());
            h = rest[pos + 1..].trim();
        }

        let list = h
            .strip_prefix('(')
            .and_then(|h| h.strip_suffix(')'))
            .ok_or_else(invalid)?;
        if list.trim().is_empty() {
            return Err(invalid());
        }

        let mut rest = list.trim_start();
        while !rest.is_empty() {
            let mut negated = false;
            if let Some(word) = rest.get(..3) {
                let after = &rest[3..];
                if word.eq_ignore_ascii_case("not")
                    && after.starts_with(|c: char| c.is_whitespace() || c == '<' || c == '[')
                {
                    negated = true;
                    rest = after.trim_start();
                }
            }
            let (entity_tag, end_delim) = match rest.chars().next() {
                Some('<') => (false, '>'),
                Some('[') => (true, ']'),
                _ => return Err(invalid()),
            };
            let end = rest[1..].find(end_delim).ok_or_else(invalid)? + 1;
            let value = &rest[1..end];
            if value.is_empty() {
                return Err(invalid());
            }
            ih.tags_and_tokens.push(TagOrToken {
                entity_tag,
                negated,
                value: value.to_string(),
            });
            rest = rest[end + 1..].trim_start();
        }

        Ok(ih)
    }
}

impl fmt::Display for IfHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.resource_tag {
            write!(f, "<{tag}> ")?;
        }
        f.write_str("(")?;
        for (i, t) in self.tags_and_tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if t.negated {
                f.write_str("Not ")?;
            }
            if t.entity_tag {
                write!(f, "[{}]", t.value)?;
            } else {
                write!(f, "<{}>", t.value)?;
            }
        }
        f.write_str(")")
    }
}

impl Header for IfHeader {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        values
            .next()
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(headers::Error::invalid)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        if let Ok(v) = HeaderValue::from_str(&self.to_string()) {
            values.extend(std::iter::once(v));
        }
    }
}

/// Parse the `If` header.
///
/// `Ok(None)` means there is no header, which is "no condition",
/// not an error.
pub fn test_if_header(headers: &HeaderMap) -> DavResult<Option<IfHeader>> {
    match header_str(headers, &IF)? {
        None => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

/// `If-None-Match: *`
pub fn if_none_match_any(headers: &HeaderMap) -> bool {
    header_string(headers, &http::header::IF_NONE_MATCH).as_deref() == Some("*")
}

pub fn if_none_match(headers: &HeaderMap) -> Option<String> {
    header_string(headers, &http::header::IF_NONE_MATCH)
}

pub fn if_match(headers: &HeaderMap) -> Option<String> {
    header_string(headers, &http::header::IF_MATCH)
}

/// RFC6638 `If-Schedule-Tag-Match`.
pub fn if_schedule_tag_match(headers: &HeaderMap) -> Option<String> {
    header_string(headers, &IF_SCHEDULE_TAG_MATCH)
}

/// `X-HTTP-Method-Override`.
pub fn method_override(headers: &HeaderMap) -> Option<String> {
    header_string(headers, &X_HTTP_METHOD_OVERRIDE)
}

/// The conditional headers of a request, collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfHeaders {
    /// Had `If-None-Match: *`.
    pub create: bool,
    /// Value of `If-Match`.
    pub if_etag: Option<String>,
    pub if_header: Option<IfHeader>,
}

pub fn process_if_headers(headers: &HeaderMap) -> DavResult<IfHeaders> {
    Ok(IfHeaders {
        create: if_none_match_any(headers),
        if_etag: if_match(headers),
        if_header: test_if_header(headers)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use headers::HeaderMapExt;
    use http::StatusCode;

    fn hdrs(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.append(*k, HeaderValue::from_static(*v));
        }
        h
    }

    #[test]
    fn depth_default_when_absent() {
        let h = HeaderMap::new();
        assert_eq!(depth(&h, None).unwrap(), None);
        assert_eq!(
            depth(&h, Some(Depth::Infinity)).unwrap(),
            Some(Depth::Infinity)
        );
    }

    #[test]
    fn depth_values() {
        for (s, d) in [("0", Depth::Zero), ("1", Depth::One), ("infinity", Depth::Infinity)] {
            let h = hdrs(&[("depth", s)]);
            assert_eq!(depth(&h, None).unwrap(), Some(d));
            assert_eq!(h.typed_get::<Depth>(), Some(d));
        }
    }

    #[test]
    fn depth_invalid() {
        let err = depth(&hdrs(&[("depth", "2")]), Some(Depth::Zero)).unwrap_err();
        assert_eq!(err.statuscode(), StatusCode::BAD_REQUEST);
        assert!(hdrs(&[("depth", "2")]).typed_get::<Depth>().is_none());
    }

    #[test]
    fn brief_header() {
        assert!(brief(&hdrs(&[("brief", "T")])));
        assert!(brief(&hdrs(&[("brief", "t")])));
        assert!(!brief(&hdrs(&[("brief", "F")])));
        // Brief wins over Prefer.
        assert!(!brief(&hdrs(&[("brief", "F"), ("prefer", "return-minimal")])));
    }

    #[test]
    fn prefer_header() {
        assert!(brief(&hdrs(&[("prefer", "return-minimal")])));
        assert!(brief(&hdrs(&[("prefer", "foo, return-minimal , bar")])));
        assert!(brief(&hdrs(&[("prefer", "Return-Minimal")])));
        assert!(!brief(&hdrs(&[("prefer", "return=representation")])));
        assert!(!brief(&HeaderMap::new()));
    }

    #[test]
    fn if_header_tagged_list() {
        let h = hdrs(&[("if", "<urn:x>(<urn:a> [etag1])")]);
        let ih = test_if_header(&h).unwrap().unwrap();
        assert_eq!(ih.resource_tag.as_deref(), Some("urn:x"));
        assert_eq!(
            ih.tags_and_tokens,
            vec![
                TagOrToken {
                    entity_tag: false,
                    negated: false,
                    value: "urn:a".into()
                },
                TagOrToken {
                    entity_tag: true,
                    negated: false,
                    value: "etag1".into()
                },
            ]
        );
    }

    #[test]
    fn if_header_not() {
        let ih: IfHeader = "(not <urn:a>)".parse().unwrap();
        assert_eq!(ih.resource_tag, None);
        assert_eq!(ih.tags_and_tokens.len(), 1);
        assert!(ih.tags_and_tokens[0].negated);
        assert_eq!(ih.tags_and_tokens[0].value, "urn:a");

        let ih: IfHeader = "(<urn:a> Not [\"x\"])".parse().unwrap();
        assert!(!ih.tags_and_tokens[0].negated);
        assert!(ih.tags_and_tokens[1].negated);
        assert_eq!(ih.tags_and_tokens[1].value, "\"x\"");
    }

    #[test]
    fn if_header_malformed() {
        for bad in [
            "<urn:x> (<urn:a>",
            "<urn:x (<urn:a>)",
            "(<urn:a)",
            "(urn:a)",
            "(<>)",
            "()",
            "<urn:x> ( )",
            "(<urn:a>) (<urn:b>)",
        ] {
            let err = bad.parse::<IfHeader>().unwrap_err();
            assert_eq!(err.statuscode(), StatusCode::BAD_REQUEST, "{bad}");
            assert!(err.message().unwrap().contains(bad), "{bad}");
        }
    }

    #[test]
    fn if_header_absent() {
        assert_eq!(test_if_header(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn if_header_display() {
        let ih: IfHeader = "<urn:x> (Not <urn:a> [e])".parse().unwrap();
        assert_eq!(ih.to_string(), "<urn:x> (Not <urn:a> [e])");
    }

    #[test]
    fn conditional_headers() {
        let h = hdrs(&[
            ("if-none-match", "*"),
            ("if-match", "\"abc\""),
            ("if-schedule-tag-match", "\"s1\""),
            ("if", "([\"abc\"])"),
        ]);
        assert!(if_none_match_any(&h));
        assert_eq!(if_none_match(&h).as_deref(), Some("*"));
        assert_eq!(if_schedule_tag_match(&h).as_deref(), Some("\"s1\""));
        let ih = process_if_headers(&h).unwrap();
        assert!(ih.create);
        assert_eq!(ih.if_etag.as_deref(), Some("\"abc\""));
        assert_eq!(ih.if_header.unwrap().tags_and_tokens[0].value, "\"abc\"");

        let none = process_if_headers(&HeaderMap::new()).unwrap();
        assert_eq!(none, IfHeaders::default());
    }

    #[test]
    fn location_is_verbatim() {
        let mut resp = Response::new(());
        make_location(&mut resp, "/dav/new%20item").unwrap();
        assert_eq!(resp.headers()["location"], "/dav/new%20item");
    }
}
