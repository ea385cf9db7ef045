//! Utility module to handle the path part of an URL as a resource path.

use std::fmt;

use percent_encoding::{percent_decode, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::DavError;
use crate::DavResult;

// Characters that are escaped when a path is turned back into an URL.
// `%` is absent: in a stored path it only starts an escape.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// URL path, with the prefix split off.
///
/// The path is stored decoded, except for `/` and `%` inside a segment,
/// which stay escaped as `%2F` and `%25`. `as_url_string` re-encodes it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    prefix: String,
    path: String,
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.with_prefix_string())
    }
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_url_string())
    }
}

// Split, then decode and normalize each segment: collapse "//", drop
// ".", refuse ".." that escapes the root.
fn normalize(raw: &str) -> DavResult<String> {
    if !raw.starts_with('/') && raw != "*" {
        return Err(DavError::bad_request(format!("Invalid path: {raw}")));
    }
    if raw == "*" {
        return Ok("*".to_string());
    }
    let mut segs: Vec<String> = Vec::new();
    for seg in raw.split('/') {
        let seg = percent_decode(seg.as_bytes())
            .decode_utf8()
            .map_err(|_| DavError::bad_request(format!("Invalid path encoding: {raw}")))?;
        match seg.as_ref() {
            "" | "." => {}
            ".." => {
                if segs.pop().is_none() {
                    return Err(DavError::bad_request(format!("Invalid path: {raw}")));
                }
            }
            s => {
                if s.contains('\0') {
                    return Err(DavError::bad_request(format!("Invalid path: {raw}")));
                }
                segs.push(s.replace('%', "%25").replace('/', "%2F"))
            }
        }
    }
    let mut path = String::from("/");
    path.push_str(&segs.join("/"));
    if raw.ends_with('/') && !segs.is_empty() {
        path.push('/');
    }
    Ok(path)
}

impl DavPath {
    /// Create from a raw path string (percent-encoded).
    pub fn new(src: &str) -> DavResult<DavPath> {
        Ok(DavPath {
            prefix: String::new(),
            path: normalize(src)?,
        })
    }

    /// Create from the request URI, stripping `prefix`.
    pub fn from_uri_and_prefix(uri: &http::Uri, prefix: &str) -> DavResult<DavPath> {
        let path = normalize(uri.path())?;
        if path == "*" {
            return Ok(DavPath {
                prefix: String::new(),
                path,
            });
        }
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Ok(DavPath {
                prefix: String::new(),
                path,
            });
        }
        match path.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => Ok(DavPath {
                prefix: prefix.to_string(),
                path: if rest.is_empty() {
                    "/".to_string()
                } else {
                    rest.to_string()
                },
            }),
            _ => Err(DavError::not_found().with_message(format!("{path} is outside {prefix}"))),
        }
    }

    /// Decoded path, without the prefix. A `/` or `%` that is part of a
    /// segment is still escaped.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Encoded path, without the prefix.
    pub fn as_url_string(&self) -> String {
        utf8_percent_encode(&self.path, PATH_SET).to_string()
    }

    fn with_prefix_string(&self) -> String {
        format!("{}{}", self.prefix, self.path)
    }

    /// Encoded path, including the prefix.
    pub fn with_prefix_url_string(&self) -> String {
        utf8_percent_encode(&self.with_prefix_string(), PATH_SET).to_string()
    }

    /// The request was `OPTIONS *`.
    pub fn is_star(&self) -> bool {
        self.path == "*"
    }

    /// Ends in a slash.
    pub fn is_collection(&self) -> bool {
        self.path.ends_with('/')
    }

    pub fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push('/');
        }
    }

    /// Last segment of the path, without a trailing slash. Escaped like
    /// `as_str`.
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Parent collection.
    pub fn parent(&self) -> DavPath {
        let trimmed = self.path.trim_end_matches('/');
        let parent = match trimmed.rfind('/') {
            Some(idx) => &trimmed[..=idx],
            None => "/",
        };
        DavPath {
            prefix: self.prefix.clone(),
            path: parent.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> http::Uri {
        s.parse().unwrap()
    }

    #[test]
    fn strips_prefix() {
        let p = DavPath::from_uri_and_prefix(&uri("/dav/principals/users/bob/"), "/dav/").unwrap();
        assert_eq!(p.as_str(), "/principals/users/bob/");
        assert!(p.is_collection());
        assert_eq!(p.file_name(), "bob");
        assert_eq!(p.parent().as_str(), "/principals/users/");
        assert_eq!(p.with_prefix_url_string(), "/dav/principals/users/bob/");
    }

    #[test]
    fn decodes_and_encodes() {
        let p = DavPath::new("/a%20b/./c//d").unwrap();
        assert_eq!(p.as_str(), "/a b/c/d");
        assert_eq!(p.as_url_string(), "/a%20b/c/d");
    }

    #[test]
    fn encoded_slash_stays_in_segment() {
        let p = DavPath::new("/a%2Fb").unwrap();
        assert_eq!(p.as_str(), "/a%2Fb");
        assert_eq!(p.file_name(), "a%2Fb");
        assert_eq!(p.parent().as_str(), "/");
        assert_eq!(p.as_url_string(), "/a%2Fb");
        assert_ne!(p, DavPath::new("/a/b").unwrap());

        let p = DavPath::new("/100%25/x").unwrap();
        assert_eq!(p.as_str(), "/100%25/x");
        assert_eq!(p.as_url_string(), "/100%25/x");
    }

    #[test]
    fn refuses_escaping_root() {
        assert!(DavPath::new("/../etc/passwd").is_err());
        assert!(DavPath::new("/%2E%2E/etc").is_err());
        assert!(DavPath::new("relative").is_err());
    }

    #[test]
    fn outside_prefix_is_not_found() {
        let err = DavPath::from_uri_and_prefix(&uri("/other/x"), "/dav").unwrap_err();
        assert_eq!(err.statuscode(), http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn star() {
        let p = DavPath::from_uri_and_prefix(&uri("*"), "/dav").unwrap();
        assert!(p.is_star());
    }
}
