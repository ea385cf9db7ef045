//
//  Sample application.
//
//  Serves a read-only directory of principals from memory.
//  Listens on localhost:4918, plain http, no ssl.
//  Try `curl -X OPTIONS -i http://localhost:4918/principals/users/bob/`
//  or `curl -X PROPFIND -H 'Depth: 0' http://localhost:4918/principals/users/bob/`.
//

use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use futures_util::future::{self, FutureExt, TryFutureExt};
use headers::{authorization::Basic, Authorization, HeaderMapExt};
use http::{Request, Response, StatusCode};

use dav_engine::body::Body;
use dav_engine::davheaders::{self, Depth};
use dav_engine::davpath::DavPath;
use dav_engine::davxml::{QName, XmlEmit};
use dav_engine::method::{DavFuture, MethodContext, MethodHandler, MethodTable};
use dav_engine::node::{DavNode, Principal, PrincipalNode};
use dav_engine::ns::{DavNamespace, Existence, NodeType, NsContext};
use dav_engine::{tags, DavError, DavHandler, DavMethod, DavResult};

const MULTISTATUS: QName = QName::from_static(tags::DAV_NS, "multistatus");
const RESPONSE: QName = QName::from_static(tags::DAV_NS, "response");
const HREF: QName = QName::from_static(tags::DAV_NS, "href");
const PROPSTAT: QName = QName::from_static(tags::DAV_NS, "propstat");
const PROP: QName = QName::from_static(tags::DAV_NS, "prop");
const STATUS: QName = QName::from_static(tags::DAV_NS, "status");

// The principal directory, shared by all requests.
struct Directory {
    users: Vec<String>,
}

struct MemNamespace {
    dir: Arc<Directory>,
    methods: Arc<MethodTable>,
}

impl MemNamespace {
    fn lookup(&self, path: &DavPath) -> Option<Box<dyn DavNode>> {
        let p = path.as_str().trim_end_matches('/');
        if p.is_empty() || p == "/principals" || p == "/principals/users" {
            let account = Principal::group("principals", "/principals/");
            return Some(Box::new(PrincipalNode::new(path.clone(), account, true)));
        }
        let name = p.strip_prefix("/principals/users/")?;
        self.dir.users.iter().find(|u| *u == name).map(|u| {
            let account = Principal::user(u.clone(), format!("/principals/users/{u}/"));
            Box::new(PrincipalNode::new(path.clone(), account, false)) as Box<dyn DavNode>
        })
    }
}

impl DavNamespace for MemNamespace {
    fn resolve<'a>(
        &'a self,
        path: &'a DavPath,
        existence: Existence,
        _hint: NodeType,
    ) -> DavFuture<'a, Option<Box<dyn DavNode>>> {
        let res = match (self.lookup(path), existence) {
            (Some(_), Existence::MustNot) => Err(DavError::conflict()),
            (None, Existence::Must) => Err(DavError::not_found()),
            (node, _) => Ok(node),
        };
        future::ready(res).boxed()
    }

    fn methods(&self) -> &MethodTable {
        &self.methods
    }

    fn dav_header(&self, _node: &dyn DavNode) -> String {
        "1, access-control".to_string()
    }

    fn rollback(&self) -> DavFuture<'_, ()> {
        future::ready(Ok(())).boxed()
    }

    fn close(&self) -> DavFuture<'_, ()> {
        future::ready(Ok(())).boxed()
    }
}

// PROPFIND, allprop only, depth 0.
struct PropfindMethod;

impl PropfindMethod {
    fn multistatus(ctx: &MethodContext<'_>, node: &dyn DavNode) -> DavResult<bytes::Bytes> {
        let mut xml = XmlEmit::new();
        ctx.ns.add_namespaces(&mut xml)?;
        xml.open_tag(&MULTISTATUS)?;
        xml.open_tag(&RESPONSE)?;
        xml.property(&HREF, &node.href())?;
        xml.open_tag(&PROPSTAT)?;
        xml.open_tag(&PROP)?;
        for tag in node.all_prop_names() {
            node.generate_property_value(&tag, &mut xml, true)?;
        }
        xml.close_tag(&PROP)?;
        xml.property(&STATUS, "HTTP/1.1 200 OK")?;
        xml.close_tag(&PROPSTAT)?;
        xml.close_tag(&RESPONSE)?;
        xml.close_tag(&MULTISTATUS)?;
        Ok(xml.into_bytes())
    }
}

impl MethodHandler for PropfindMethod {
    fn do_method<'a>(
        &'a self,
        ctx: &'a MethodContext<'a>,
        req: Request<Body>,
    ) -> DavFuture<'a, Response<Body>> {
        async move {
            if davheaders::depth(req.headers(), Some(Depth::Infinity))? != Some(Depth::Zero) {
                return Err(DavError::forbidden().with_message("only Depth: 0 is supported"));
            }
            let path = ctx.resource_path(&req)?;
            let node = ctx
                .ns
                .resolve(&path, Existence::Must, NodeType::Principal)
                .await?
                .ok_or_else(DavError::not_found)?;

            let body = PropfindMethod::multistatus(ctx, &*node)?;
            let mut resp = Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::MULTI_STATUS;
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/xml; charset=utf-8"),
            );
            Ok(resp)
        }
        .boxed()
    }
}

#[derive(Clone)]
struct Server {
    dh: DavHandler,
    auth: bool,
}

impl Server {
    pub fn new(users: Vec<String>, auth: bool, dump: bool) -> Self {
        let dir = Arc::new(Directory { users });
        let factory = move |_req: &Request<()>, ctx: NsContext| -> DavResult<Box<dyn DavNamespace>> {
            Ok(Box::new(MemNamespace {
                dir: dir.clone(),
                methods: ctx.methods,
            }))
        };
        let methods = MethodTable::standard()
            .register_standard(DavMethod::PROPFIND, Arc::new(PropfindMethod));

        Server {
            dh: DavHandler::builder(factory)
                .methods(methods)
                .dump_content(dump)
                .build(),
            auth,
        }
    }

    async fn handle(
        &self,
        req: hyper::Request<hyper::Body>,
    ) -> Result<hyper::Response<Body>, Infallible> {
        let user = if self.auth {
            // we want the client to authenticate.
            match req.headers().typed_get::<Authorization<Basic>>() {
                Some(Authorization(basic)) => Some(basic.username().to_string()),
                None => {
                    // return a 401 reply.
                    let mut response = hyper::Response::new(Body::from("please auth"));
                    *response.status_mut() = StatusCode::UNAUTHORIZED;
                    response.headers_mut().insert(
                        "WWW-Authenticate",
                        http::HeaderValue::from_static("Basic realm=\"principals\""),
                    );
                    return Ok(response);
                }
            }
        } else {
            None
        };

        if let Some(user) = user {
            Ok(self.dh.handle_with(req, None, Some(user)).await)
        } else {
            Ok(self.dh.handle(req).await)
        }
    }
}

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// port to listen on
    #[arg(short, long, default_value = "4918")]
    port: u16,
    /// user accounts to serve
    #[arg(short, long, default_values_t = vec!["bob".to_string(), "alice".to_string()])]
    users: Vec<String>,
    /// require basic authentication
    #[arg(short, long)]
    auth: bool,
    /// log response bodies (with RUST_LOG=debug)
    #[arg(short, long)]
    dump: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let Cli {
        port,
        users,
        auth,
        dump,
    } = Cli::parse();

    let dav_server = Server::new(users, auth, dump);
    let make_service = hyper::service::make_service_fn(|_| {
        let dav_server = dav_server.clone();
        async move {
            let func = move |req| {
                let dav_server = dav_server.clone();
                async move { dav_server.handle(req).await }
            };
            Ok::<_, hyper::Error>(hyper::service::service_fn(func))
        }
    });

    let addr = format!("0.0.0.0:{}", port);
    let addr = SocketAddr::from_str(&addr)?;

    let server = hyper::Server::try_bind(&addr)?
        .serve(make_service)
        .map_err(|e| eprintln!("server error: {}", e));

    println!("Serving principals on {}", port);
    let _ = server.await;
    Ok(())
}
