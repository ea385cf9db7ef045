use std::io::{Cursor, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use bytes::Bytes;
use headers::Header;
use time::format_description::well_known::Rfc3339;
use time::macros::offset;

bitflags! {
    /// The standard verbs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DavMethod: u32 {
        const ACL = 0x0001;
        const COPY = 0x0002;
        const GET = 0x0004;
        const HEAD = 0x0008;
        const OPTIONS = 0x0010;
        const PROPFIND = 0x0020;
        const DELETE = 0x0040;
        const MKCOL = 0x0080;
        const MOVE = 0x0100;
        const POST = 0x0200;
        const PROPPATCH = 0x0400;
        const PUT = 0x0800;
        // Never registered by default.
        const LOCK = 0x1000;
        const UNLOCK = 0x2000;

        const HTTP_RO = Self::HEAD.bits() | Self::GET.bits() | Self::OPTIONS.bits();
        const WEBDAV_RO = Self::HTTP_RO.bits() | Self::ACL.bits() | Self::COPY.bits()
            | Self::PROPFIND.bits();
        const WEBDAV_MUTATING = Self::DELETE.bits() | Self::MKCOL.bits() | Self::MOVE.bits()
            | Self::POST.bits() | Self::PROPPATCH.bits() | Self::PUT.bits() | Self::LOCK.bits()
            | Self::UNLOCK.bits();
        const WEBDAV_RW = Self::WEBDAV_RO.bits() | Self::DELETE.bits() | Self::MKCOL.bits()
            | Self::MOVE.bits() | Self::POST.bits() | Self::PROPPATCH.bits() | Self::PUT.bits();
    }
}

/// A set of methods, e.g. `DavMethod::WEBDAV_RO`.
pub type DavMethodSet = DavMethod;

const METHOD_NAMES: &[(DavMethod, &str)] = &[
    (DavMethod::ACL, "ACL"),
    (DavMethod::COPY, "COPY"),
    (DavMethod::GET, "GET"),
    (DavMethod::HEAD, "HEAD"),
    (DavMethod::OPTIONS, "OPTIONS"),
    (DavMethod::PROPFIND, "PROPFIND"),
    (DavMethod::DELETE, "DELETE"),
    (DavMethod::MKCOL, "MKCOL"),
    (DavMethod::MOVE, "MOVE"),
    (DavMethod::POST, "POST"),
    (DavMethod::PROPPATCH, "PROPPATCH"),
    (DavMethod::PUT, "PUT"),
    (DavMethod::LOCK, "LOCK"),
    (DavMethod::UNLOCK, "UNLOCK"),
];

impl DavMethod {
    /// Translate a verb into a single method flag.
    /// Group names like `WEBDAV_RO` are not verbs.
    pub fn from_verb(verb: &str) -> Option<DavMethod> {
        METHOD_NAMES
            .iter()
            .find(|(_, n)| *n == verb)
            .map(|(m, _)| *m)
    }

    /// Verb name of a single method flag.
    pub fn name(&self) -> Option<&'static str> {
        METHOD_NAMES
            .iter()
            .find(|(m, _)| m == self)
            .map(|(_, n)| *n)
    }

    /// Changes server state. Used by namespaces for their own
    /// authorization bookkeeping, the engine does not enforce it.
    pub fn is_mutating(&self) -> bool {
        Self::WEBDAV_MUTATING.contains(*self)
    }
}

pub fn systemtime_to_offsetdatetime(t: SystemTime) -> time::OffsetDateTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(t) => match time::OffsetDateTime::from_unix_timestamp(t.as_secs() as i64) {
            Ok(tm) => tm.to_offset(offset!(UTC)),
            Err(_) => time::OffsetDateTime::UNIX_EPOCH.to_offset(offset!(UTC)),
        },
        Err(_) => time::OffsetDateTime::UNIX_EPOCH.to_offset(offset!(UTC)),
    }
}

pub fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    d.encode(&mut v);
    v.first()
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

pub fn systemtime_to_rfc3339(t: SystemTime) -> String {
    // 1996-12-19T16:39:57Z
    systemtime_to_offsetdatetime(t)
        .format(&Rfc3339)
        .unwrap_or_default()
}

// A buffer that implements "Write".
#[derive(Clone)]
pub struct MemBuffer(Cursor<Vec<u8>>);

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
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_rfc3339() {
        assert!(systemtime_to_rfc3339(UNIX_EPOCH) == "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_httpdate() {
        let t = UNIX_EPOCH + Duration::from_secs(784111777);
        assert_eq!(systemtime_to_httpdate(t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn method_names() {
        assert_eq!(DavMethod::from_verb("PROPFIND"), Some(DavMethod::PROPFIND));
        assert_eq!(DavMethod::from_verb("PATCH"), None);
        assert_eq!(DavMethod::from_verb("WEBDAV_RO"), None);
        assert_eq!(DavMethod::from_verb("propfind"), None);
        assert_eq!(DavMethod::MKCOL.name(), Some("MKCOL"));
        assert_eq!(DavMethod::WEBDAV_RO.name(), None);
    }

    #[test]
    fn read_only_and_mutating_groups() {
        for m in ["ACL", "COPY", "GET", "HEAD", "OPTIONS", "PROPFIND"] {
            assert!(!DavMethod::from_verb(m).unwrap().is_mutating(), "{m}");
        }
        for m in ["DELETE", "MKCOL", "MOVE", "POST", "PROPPATCH", "PUT"] {
            assert!(DavMethod::from_verb(m).unwrap().is_mutating(), "{m}");
        }
        assert!(!DavMethod::WEBDAV_RW.contains(DavMethod::LOCK));
    }
}
