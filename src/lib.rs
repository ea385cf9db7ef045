//! ## Generic WebDAV protocol engine
//!
//! [`Webdav`] (RFC4918) is defined as
//! HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extension methods (PROPFIND, etc).
//! This library is the protocol plumbing of a WebDAV (or CalDAV, CardDAV)
//! server: it takes a `http::Request`, serializes it per principal, dispatches
//! it to a method handler, and turns failures into WebDAV error responses.
//!
//! It does not know anything about storage. That is the job of the
//! [namespace][ns::DavNamespace] you supply.
//!
//! ## Backend interfaces.
//!
//! - the library contains a [HTTP handler][DavHandler].
//! - you supply a [namespace factory][ns::NamespaceFactory] that creates a
//!   [namespace][ns::DavNamespace] for every request. The namespace resolves
//!   paths to [nodes][node::DavNode], and is rolled back when a request fails.
//! - nodes expose their properties through an ordered chain of
//!   [property providers][props::PropertyProvider].
//! - verbs are implemented by [method handlers][method::MethodHandler],
//!   registered in a [method table][method::MethodTable]. OPTIONS is built in.
//!
//! The handler works with the standard http types from the `http` and
//! `http_body` crates, so it can be used straight away with hyper.
//! A compatibility module for [warp][warp-compat] is also provided.
//!
//! ## Example.
//!
//! A plain function or closure can be the namespace factory. See `demos/memory.rs` for
//! a complete server on top of hyper.
//!
//! ```no_run
//! use dav_engine::{DavHandler, DavResult};
//! use dav_engine::ns::{DavNamespace, NsContext};
//!
//! fn open_namespace(req: &http::Request<()>, ctx: NsContext) -> DavResult<Box<dyn DavNamespace>> {
//!     // look up the user's store, start a transaction, ...
//!     # unimplemented!()
//! }
//!
//! # async fn serve() {
//! let dav = DavHandler::builder(open_namespace)
//!     .strip_prefix("/dav")
//!     .init_params([("dumpContent", "true")])
//!     .build();
//!
//! let req = http::Request::builder()
//!     .method("OPTIONS")
//!     .uri("/dav/calendars/bob/")
//!     .body(http_body::Empty::<bytes::Bytes>::new())
//!     .unwrap();
//! let resp = dav.handle_with(req, None, Some("bob".to_string())).await;
//! println!("Allow: {:?}", resp.headers().get("allow"));
//! # }
//! ```
//!
//! [`Webdav`]: https://tools.ietf.org/html/rfc4918
//! [warp-compat]: https://docs.rs/dav-engine/latest/dav_engine/warp/index.html

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod davhandler;
mod errors;
mod util;
mod waiters;

pub mod body;
pub mod davheaders;
pub mod davpath;
pub mod davxml;
pub mod method;
pub mod node;
pub mod ns;
pub mod props;
pub mod tags;

#[cfg(any(docsrs, feature = "warp-compat"))]
#[cfg_attr(docsrs, doc(cfg(feature = "warp-compat")))]
pub mod warp;

pub use crate::davhandler::{DavBuilder, DavHandler, HttpSession, OptionsMethod};
pub use crate::errors::{DavError, DavResult};
pub use crate::util::{DavMethod, DavMethodSet};
