//! Method handlers and the verb table.

use std::io;
use std::sync::Arc;

use bytes::Buf;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::OptionsMethod;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::ns::DavNamespace;
use crate::util::{DavMethod, DavMethodSet};
use crate::DavResult;

/// Future returned by handlers and namespaces.
pub type DavFuture<'a, T> = BoxFuture<'a, DavResult<T>>;

/// Default charset of request bodies.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Everything a handler gets besides the request.
pub struct MethodContext<'a> {
    pub ns: &'a dyn DavNamespace,
    /// Effective verb, after `X-HTTP-Method-Override`.
    pub method: &'a str,
    /// Request charset, `UTF-8` if the client did not say.
    pub charset: &'a str,
    pub prefix: &'a str,
    pub principal: Option<&'a str>,
}

impl<'a> MethodContext<'a> {
    /// The resource path of the request, prefix stripped.
    pub fn resource_path<B>(&self, req: &Request<B>) -> DavResult<DavPath> {
        DavPath::from_uri_and_prefix(req.uri(), self.prefix)
    }

    /// Drain the request body. More than `max_size` bytes is 413.
    pub async fn read_body(&self, body: Body, max_size: usize) -> DavResult<Vec<u8>> {
        let mut data = Vec::new();
        let mut body = body;
        while let Some(res) = body.next().await {
            let mut buf = res.map_err(|e| {
                DavError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, e))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }
}

/// Performs one verb.
pub trait MethodHandler: Send + Sync {
    fn do_method<'a>(
        &'a self,
        ctx: &'a MethodContext<'a>,
        req: Request<Body>,
    ) -> DavFuture<'a, Response<Body>>;
}

/// A handler plus its bookkeeping.
#[derive(Clone)]
pub struct MethodInfo {
    pub handler: Arc<dyn MethodHandler>,
    /// Changes server state. For the namespace's own authorization
    /// decisions, the engine does not enforce it.
    pub mutating: bool,
}

/// Verb name to handler, in registration order.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: Vec<(String, MethodInfo)>,
}

impl MethodTable {
    /// An empty table.
    pub fn new() -> MethodTable {
        MethodTable::default()
    }

    /// A table with the OPTIONS handler.
    ///
    /// LOCK and UNLOCK are deliberately absent.
    pub fn standard() -> MethodTable {
        MethodTable::new().register("OPTIONS", false, Arc::new(OptionsMethod))
    }

    /// Add a handler, or replace the handler of a verb that is
    /// already in the table (keeping its position).
    pub fn register(
        mut self,
        name: impl Into<String>,
        mutating: bool,
        handler: Arc<dyn MethodHandler>,
    ) -> Self {
        let name = name.into();
        let info = MethodInfo { handler, mutating };
        match self.methods.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = info,
            None => self.methods.push((name, info)),
        }
        self
    }

    /// Add a handler for a standard verb; `mutating` follows the verb.
    pub fn register_standard(self, method: DavMethod, handler: Arc<dyn MethodHandler>) -> Self {
        match method.name() {
            Some(name) => self.register(name, method.is_mutating(), handler),
            None => self,
        }
    }

    /// Drop the standard verbs that are not in `allow`. Extension
    /// verbs are kept.
    pub fn restrict(mut self, allow: DavMethodSet) -> Self {
        self.methods.retain(|(name, _)| match DavMethod::from_verb(name) {
            Some(m) => allow.contains(m),
            None => true,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<MethodInfo> {
        self.methods
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, info)| info.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.methods.iter().map(|(n, _)| n.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    struct Nop;

    impl MethodHandler for Nop {
        fn do_method<'a>(
            &'a self,
            _ctx: &'a MethodContext<'a>,
            _req: Request<Body>,
        ) -> DavFuture<'a, Response<Body>> {
            async move { Ok(Response::new(Body::empty())) }.boxed()
        }
    }

    #[test]
    fn standard_table() {
        let t = MethodTable::standard();
        assert_eq!(t.names(), vec!["OPTIONS"]);
        assert!(t.get("LOCK").is_none());
        assert!(!t.get("OPTIONS").unwrap().mutating);
    }

    #[test]
    fn registration_order_and_duplicates() {
        let t = MethodTable::standard()
            .register_standard(DavMethod::PUT, Arc::new(Nop))
            .register_standard(DavMethod::GET, Arc::new(Nop))
            .register("REPORT", false, Arc::new(Nop))
            .register_standard(DavMethod::PUT, Arc::new(Nop));
        assert_eq!(t.names(), vec!["OPTIONS", "PUT", "GET", "REPORT"]);
        assert!(t.get("PUT").unwrap().mutating);
        assert!(!t.get("GET").unwrap().mutating);
    }

    #[test]
    fn restrict_keeps_extensions() {
        let t = MethodTable::standard()
            .register_standard(DavMethod::PUT, Arc::new(Nop))
            .register("MKCALENDAR", true, Arc::new(Nop))
            .restrict(DavMethod::WEBDAV_RO);
        assert_eq!(t.names(), vec!["OPTIONS", "MKCALENDAR"]);
        assert!(!t.contains("PUT"));
    }
}
