//! The namespace interface.
//!
//! All storage, authorization and locking live behind [`DavNamespace`].
//! The embedder supplies a [`NamespaceFactory`] that creates one
//! namespace instance per request; the instance is the unit of
//! transactionality. It is rolled back when a fault is reported, and
//! closed exactly once at the end of the request.

use std::sync::Arc;

use futures_util::future::{self, FutureExt};
use http::Request;

use crate::davpath::DavPath;
use crate::davxml::{QName, XmlEmit};
use crate::method::{DavFuture, MethodInfo, MethodTable};
use crate::node::DavNode;
use crate::tags;
use crate::DavResult;

/// What `resolve` must check about the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    /// Must exist, otherwise fail with not-found.
    Must,
    /// Must not exist (e.g. MKCOL target), otherwise fail.
    MustNot,
    /// Return a node either way; check `exists()`.
    May,
}

/// Hint about the kind of node the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Unknown,
    Collection,
    Entity,
    Principal,
}

/// What the engine hands the factory for each request.
#[derive(Clone)]
pub struct NsContext {
    /// The configured verb table.
    pub methods: Arc<MethodTable>,
    /// Authenticated user, if any.
    pub principal: Option<String>,
    /// Prefix stripped from request paths.
    pub prefix: String,
}

/// Creates a namespace instance per request.
pub trait NamespaceFactory: Send + Sync {
    fn namespace<'a>(
        &'a self,
        req: &'a Request<()>,
        ctx: NsContext,
    ) -> DavFuture<'a, Box<dyn DavNamespace>>;
}

impl<F> NamespaceFactory for F
where
    F: Fn(&Request<()>, NsContext) -> DavResult<Box<dyn DavNamespace>> + Send + Sync,
{
    fn namespace<'a>(
        &'a self,
        req: &'a Request<()>,
        ctx: NsContext,
    ) -> DavFuture<'a, Box<dyn DavNamespace>> {
        future::ready(self(req, ctx)).boxed()
    }
}

/// A request-scoped view of the resource namespace.
pub trait DavNamespace: Send + Sync {
    /// Resolve a path to a node, honoring `existence`.
    fn resolve<'a>(
        &'a self,
        path: &'a DavPath,
        existence: Existence,
        hint: NodeType,
    ) -> DavFuture<'a, Option<Box<dyn DavNode>>>;

    /// The verb table for this namespace.
    fn methods(&self) -> &MethodTable;

    fn method_for(&self, name: &str) -> Option<MethodInfo> {
        self.methods().get(name)
    }

    /// Supported verbs, in order, without duplicates.
    fn method_names(&self) -> Vec<String> {
        self.methods().names()
    }

    /// Value of the `DAV` header for this node, e.g. `1, 3, access-control`.
    fn dav_header(&self, node: &dyn DavNode) -> String;

    /// Register the XML namespaces used in responses.
    fn add_namespaces(&self, xml: &mut XmlEmit) -> DavResult<()> {
        xml.add_namespace(tags::DAV_NS, "D");
        Ok(())
    }

    /// Emit the content of a `DAV:error` body.
    fn emit_error(&self, tag: &QName, extra: Option<&str>, xml: &mut XmlEmit) -> DavResult<()> {
        match extra {
            Some(extra) => xml.property(tag, extra),
            None => xml.empty_tag(tag),
        }
    }

    /// Undo the work of this request. Must be safe to call after a
    /// failed `close`, and vice versa.
    fn rollback(&self) -> DavFuture<'_, ()>;

    /// Release backend resources.
    fn close(&self) -> DavFuture<'_, ()>;
}
