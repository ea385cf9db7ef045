//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::sync::Arc;

use bytes::{self, buf::Buf};
use futures_util::stream::Stream;
use headers::HeaderMapExt;
use http::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::davheaders;
use crate::davxml::{QName, XmlEmit};
use crate::errors::DavError;
use crate::method::{MethodContext, MethodTable, DEFAULT_CHARSET};
use crate::ns::{DavNamespace, NamespaceFactory, NsContext};
use crate::tags;
use crate::util::DavMethodSet;
use crate::waiters::WaiterRegistry;
use crate::DavResult;

mod handle_options;
pub use handle_options::OptionsMethod;

/// An HTTP session, as kept by the hosting framework.
///
/// Adapters that have sessions put an `Arc<dyn HttpSession>` in the
/// request extensions. WebDAV is stateless, so unless the handler is
/// configured to preserve sessions, the session is invalidated at the
/// end of every request.
pub trait HttpSession: Send + Sync {
    fn id(&self) -> Option<String>;
    fn invalidate(&self);
}

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Namespace backend.
    factory: Arc<dyn NamespaceFactory>,
    /// Verb table.
    methods: MethodTable,
    /// Set of allowed standard methods (Defaults to "all methods")
    allow: Option<DavMethodSet>,
    /// Principal is webdav speak for "user". Requests of the same
    /// principal are serialized.
    principal: Option<String>,
    /// Log response bodies at debug level.
    dump_content: bool,
    /// Do not invalidate the HTTP session after a request.
    preserve_sessions: bool,
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new(factory: Arc<dyn NamespaceFactory>) -> DavBuilder {
        Self {
            prefix: String::new(),
            factory,
            methods: MethodTable::standard(),
            allow: None,
            principal: None,
            dump_content: false,
            preserve_sessions: false,
        }
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build(self) -> DavHandler {
        self.into()
    }

    /// Prefix to be stripped off before resolving the rest of
    /// the request path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Set the verb table (default: just OPTIONS).
    pub fn methods(self, methods: MethodTable) -> Self {
        let mut this = self;
        this.methods = methods;
        this
    }

    /// Which standard methods to allow (default is all methods in the table).
    pub fn allow(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = Some(allow);
        this
    }

    /// Set the name of the default principal.
    pub fn principal(self, principal: impl Into<String>) -> Self {
        let mut this = self;
        this.principal = Some(principal.into());
        this
    }

    /// Log response bodies (needs debug logging).
    pub fn dump_content(self, dump: bool) -> Self {
        let mut this = self;
        this.dump_content = dump;
        this
    }

    /// Keep HTTP sessions alive, e.g. when the namespace also serves
    /// session authenticated web clients.
    pub fn preserve_sessions(self, preserve: bool) -> Self {
        let mut this = self;
        this.preserve_sessions = preserve;
        this
    }

    /// Apply string init parameters: `dumpContent` and
    /// `web-version`. Only the value `"true"` enables them.
    pub fn init_params<'a>(self, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut this = self;
        for (name, value) in params {
            match name {
                "dumpContent" => this.dump_content = value == "true",
                "web-version" => this.preserve_sessions = value == "true",
                _ => debug!("ignoring init parameter {name}"),
            }
        }
        this
    }
}

/// The webdav handler struct.
///
/// The `builder` method is used to instantiate a handler.
///
/// The `handle` and `handle_with` methods are the methods that do the actual work.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) prefix: Arc<String>,
    pub(crate) factory: Arc<dyn NamespaceFactory>,
    pub(crate) methods: Arc<MethodTable>,
    pub(crate) principal: Option<Arc<String>>,
    pub(crate) dump_content: bool,
    pub(crate) preserve_sessions: bool,
    waiters: Arc<WaiterRegistry>,
}

impl From<DavBuilder> for DavHandler {
    fn from(cfg: DavBuilder) -> Self {
        let methods = match cfg.allow {
            Some(allow) => cfg.methods.restrict(allow),
            None => cfg.methods,
        };
        Self {
            prefix: Arc::new(cfg.prefix),
            factory: cfg.factory,
            methods: Arc::new(methods),
            principal: cfg.principal.map(Arc::new),
            dump_content: cfg.dump_content,
            preserve_sessions: cfg.preserve_sessions,
            waiters: Arc::new(WaiterRegistry::new()),
        }
    }
}

// Fault bookkeeping of one request.
#[derive(Default)]
struct Outcome {
    resp: Option<Response<Body>>,
    // once set, later faults do not overwrite the response.
    server_error: bool,
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder(factory: impl NamespaceFactory + 'static) -> DavBuilder {
        DavBuilder::new(Arc::new(factory))
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        self.dispatch(req.map(Body::from_http_body)).await
    }

    /// Handle a webdav request, overriding parts of the config.
    ///
    /// Typically the `principal` is set here, after the framework
    /// authenticated the request.
    pub async fn handle_with<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        prefix: Option<String>,
        principal: Option<String>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        self.with_overrides(prefix, principal)
            .dispatch(req.map(Body::from_http_body)).await
    }

    /// Handles a request with a `Stream` body instead of a `HttpBody`.
    /// Used with webserver frameworks that have not
    /// opted to use the `http_body` crate just yet.
    #[doc(hidden)]
    pub async fn handle_stream<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: Stream<Item = Result<ReqData, ReqError>> + Send + 'static,
    {
        self.dispatch(req.map(Body::from_stream)).await
    }

    /// Handles a request with a `Stream` body instead of a `HttpBody`.
    #[doc(hidden)]
    pub async fn handle_stream_with<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        prefix: Option<String>,
        principal: Option<String>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: Stream<Item = Result<ReqData, ReqError>> + Send + 'static,
    {
        self.with_overrides(prefix, principal)
            .dispatch(req.map(Body::from_stream)).await
    }

    fn with_overrides(&self, prefix: Option<String>, principal: Option<String>) -> DavHandler {
        let mut this = self.clone();
        if let Some(prefix) = prefix {
            this.prefix = Arc::new(prefix);
        }
        if let Some(principal) = principal {
            this.principal = Some(Arc::new(principal));
        }
        this
    }

    /// The session `session_id` was destroyed by the hosting framework.
    ///
    /// This removes the waiter record with that key. Waiters are keyed
    /// by principal, so unless the framework uses the principal as
    /// session id this does not find anything.
    pub fn session_destroyed(&self, session_id: &str) {
        self.waiters.remove(session_id);
    }
}

// Charset parameter of the Content-Type header.
fn request_charset(headers: &HeaderMap) -> Option<String> {
    let mime: mime::Mime = headers.typed_get::<headers::ContentType>()?.into();
    mime.get_param(mime::CHARSET).map(|c| c.as_str().to_string())
}

fn dump_request(req: &Request<()>, principal: Option<&str>) {
    debug!("Request headers");
    for (key, val) in req.headers() {
        let val = val.to_str().unwrap_or("<binary>");
        if *key == http::header::AUTHORIZATION && val.to_ascii_lowercase().starts_with("basic") {
            debug!("  {key} = \"Basic **********\"");
        } else {
            debug!("  {key} = \"{val}\"");
        }
    }
    debug!("getRequestURI = {}", req.uri());
    debug!("principal = {principal:?}");
    debug!("query = {:?}", req.uri().query());
    debug!(
        "contentlen = {:?}",
        req.headers().get(CONTENT_LENGTH).and_then(|v| v.to_str().ok())
    );
}

fn dump_response(resp: &Response<Body>) {
    match resp.body().as_buffered() {
        None => {
            debug!("------------------------ response written to output stream -------------------")
        }
        Some(b) => {
            debug!("------------------------ Dump of response -------------------");
            debug!("{}", String::from_utf8_lossy(b));
            debug!("---------------------- End dump of response -----------------");
            debug!("contentLength={}", b.len());
        }
    }
}

// Response with just a status.
fn status_response(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    resp
}

// The "sendError" style response: status plus a plain text message.
fn plain_error(status: StatusCode, message: Option<String>) -> Response<Body> {
    let text = message
        .or_else(|| status.canonical_reason().map(|r| r.to_string()))
        .unwrap_or_else(|| status.to_string());
    let mut resp = Response::new(Body::from(text.clone()));
    *resp.status_mut() = status;
    let h = resp.headers_mut();
    h.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=UTF-8"),
    );
    h.typed_insert(headers::ContentLength(text.len() as u64));
    resp
}

// Build the DAV:error body.
fn emit_error(ns: &dyn DavNamespace, tag: &QName, extra: Option<&str>) -> DavResult<bytes::Bytes> {
    let mut xml = XmlEmit::new();
    ns.add_namespaces(&mut xml)?;
    xml.open_tag(&tags::ERROR)?;
    ns.emit_error(tag, extra, &mut xml)?;
    xml.close_tag(&tags::ERROR)?;
    Ok(xml.into_bytes())
}

impl DavHandler {
    // Translate a fault into a response. Rolls back the namespace first.
    async fn send_error(&self, ns: Option<&dyn DavNamespace>, err: &DavError) -> Response<Body> {
        if let Some(ns) = ns {
            if let Err(e) = ns.rollback().await {
                debug!("rollback failed: {e}");
            }
        }

        let status = err.statuscode();
        let message = err.message();
        debug!("setStatus({status}) message={message:?}");

        if let (Some(ns), Some(tag)) = (ns, err.condition()) {
            match emit_error(ns, tag, message.as_deref()) {
                Ok(xml) => {
                    let mut resp = Response::new(Body::from(xml.clone()));
                    *resp.status_mut() = status;
                    let h = resp.headers_mut();
                    h.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/xml; charset=UTF-8"),
                    );
                    h.typed_insert(headers::ContentLength(xml.len() as u64));
                    return resp;
                }
                Err(e) => debug!("failed to emit error body: {e}"),
            }
        }

        plain_error(status, message)
    }

    // Record a fault. The first server error wins: after one has been
    // recorded, later faults are only logged.
    async fn handle_error(&self, ns: Option<&dyn DavNamespace>, err: DavError, out: &mut Outcome) {
        if out.server_error {
            debug!("suppressed after server error: {err}");
            return;
        }

        if err.is_forbidden() {
            out.resp = Some(self.send_error(ns, &err).await);
            return;
        }

        if !err.is_status() || err.is_server_error() {
            error!("{err}");
            out.server_error = true;
        }
        out.resp = Some(self.send_error(ns, &err).await);
    }

    // Run the request on its own task: when the caller's future is
    // dropped (client went away) the namespace is still closed.
    async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        let this = self.clone();
        match tokio::spawn(async move { this.handle_inner(req).await }).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("request task failed: {e}");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    // internal dispatcher.
    async fn handle_inner(&self, req: Request<Body>) -> Response<Body> {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        let method = davheaders::method_override(req.headers())
            .unwrap_or_else(|| req.method().as_str().to_string());
        debug!("== START REQUEST {} {}", method, req.uri());

        let charset = match request_charset(req.headers()) {
            Some(charset) => charset,
            None => {
                debug!("No charset specified in request; forced to {DEFAULT_CHARSET}");
                DEFAULT_CHARSET.to_string()
            }
        };

        let principal = self.principal.as_ref().map(|p| p.as_str());
        if log_enabled!(log::Level::Debug) {
            dump_request(&req, principal);
        }

        let session = req.extensions().get::<Arc<dyn HttpSession>>().cloned();

        let gate = self.waiters.enter(principal).await;

        let mut out = Outcome::default();
        let ctx = NsContext {
            methods: self.methods.clone(),
            principal: principal.map(|p| p.to_string()),
            prefix: self.prefix.to_string(),
        };
        let ns = match self.factory.namespace(&req, ctx).await {
            Ok(ns) => Some(ns),
            Err(e) => {
                self.handle_error(None, e, &mut out).await;
                None
            }
        };

        if let Some(ns) = ns.as_deref() {
            match ns.method_for(&method) {
                None => {
                    info!("No method for '{method}'");
                    out.resp = Some(status_response(StatusCode::METHOD_NOT_ALLOWED));
                }
                Some(info) => {
                    let mctx = MethodContext {
                        ns,
                        method: &method,
                        charset: &charset,
                        prefix: &self.prefix,
                        principal,
                    };
                    let (parts, ()) = req.into_parts();
                    let req = Request::from_parts(parts, body);
                    match info.handler.do_method(&mctx, req).await {
                        Ok(resp) => out.resp = Some(resp),
                        Err(e) => self.handle_error(Some(ns), e, &mut out).await,
                    }
                }
            }

            if let Err(e) = ns.close().await {
                self.handle_error(Some(ns), e, &mut out).await;
            }
        }

        drop(gate);

        let resp = out
            .resp
            .unwrap_or_else(|| status_response(StatusCode::INTERNAL_SERVER_ERROR));
        debug!("== END REQUEST {} {}", method, resp.status());

        if self.dump_content && log_enabled!(log::Level::Debug) {
            dump_response(&resp);
        }

        if !self.preserve_sessions {
            // WebDAV is stateless - toss away the session.
            if let Some(session) = session {
                debug!("invalidating session {:?}", session.id());
                session.invalidate();
            }
        }

        resp
    }
}
