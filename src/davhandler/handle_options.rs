use futures_util::FutureExt;
use headers::HeaderMapExt;
use http::header::{HeaderValue, ALLOW};
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::errors::DavError;
use crate::method::{DavFuture, MethodContext, MethodHandler};
use crate::ns::{Existence, NodeType};

/// OPTIONS: advertise the compliance classes and the allowed verbs.
///
/// A resource that does not exist gets a 404 instead, even though the
/// verb list does not depend on the resource.
pub struct OptionsMethod;

impl MethodHandler for OptionsMethod {
    fn do_method<'a>(
        &'a self,
        ctx: &'a MethodContext<'a>,
        req: Request<Body>,
    ) -> DavFuture<'a, Response<Body>> {
        async move {
            trace!("OptionsMethod: doMethod");

            let path = ctx.resource_path(&req)?;
            let node = ctx
                .ns
                .resolve(&path, Existence::Must, NodeType::Unknown)
                .await?;
            let node = match node {
                Some(node) if node.exists() => node,
                _ => {
                    let mut res = Response::new(Body::empty());
                    *res.status_mut() = StatusCode::NOT_FOUND;
                    return Ok(res);
                }
            };

            let mut res = Response::new(Body::empty());
            let h = res.headers_mut();

            let dav = ctx.ns.dav_header(&*node);
            h.insert("dav", HeaderValue::from_str(&dav).map_err(DavError::other)?);
            h.insert("ms-author-via", HeaderValue::from_static("DAV"));
            h.typed_insert(headers::ContentLength(0));

            let mut methods: Vec<String> = Vec::new();
            for name in ctx.ns.method_names() {
                if !methods.contains(&name) {
                    methods.push(name);
                }
            }
            let allow = methods.join(", ");
            h.insert(ALLOW, HeaderValue::from_str(&allow).map_err(DavError::other)?);

            Ok(res)
        }
        .boxed()
    }
}
