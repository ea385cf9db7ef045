//! Definitions for the Request and Response bodies.
//!
//! Whatever body type the server framework uses, the dispatcher turns
//! it into a [`Body`] before a method handler sees it, so handlers can
//! stream it (PUT) or drain it (PROPFIND) without being generic.

use std::error::Error as StdError;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use http::header::HeaderMap;
use http_body::{Body as HttpBody, SizeHint};

/// Body of requests (as seen by handlers) and responses. Implements
/// both `Stream` and `http_body::Body`.
pub struct Body {
    inner: Inner,
}

enum Inner {
    // `None` once taken.
    Full(Option<Bytes>),
    Streaming(BoxStream<'static, io::Result<Bytes>>),
}

impl Body {
    /// Return an empty body.
    pub fn empty() -> Body {
        Body {
            inner: Inner::Full(None),
        }
    }

    /// Create a body from a stream.
    pub fn stream(stream: impl Stream<Item = io::Result<Bytes>> + Send + 'static) -> Body {
        Body {
            inner: Inner::Streaming(stream.boxed()),
        }
    }

    /// Adapt a framework body that implements `http_body::Body`.
    pub fn from_http_body<B, D, E>(body: B) -> Body
    where
        B: HttpBody<Data = D, Error = E> + Send + 'static,
        D: Buf + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        Body::stream(async_stream::stream! {
            pin_utils::pin_mut!(body);
            while let Some(res) = body.data().await {
                yield res
                    .map(|mut data| data.copy_to_bytes(data.remaining()))
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
            }
        })
    }

    /// Adapt a framework body that is a plain `Stream` of buffers.
    pub fn from_stream<S, D, E>(stream: S) -> Body
    where
        S: Stream<Item = Result<D, E>> + Send + 'static,
        D: Buf + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        Body::stream(stream.map(|res| {
            res.map(|mut data| data.copy_to_bytes(data.remaining()))
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        }))
    }

    /// The contents, if this body is buffered rather than streamed.
    pub fn as_buffered(&self) -> Option<&[u8]> {
        match &self.inner {
            Inner::Full(Some(b)) => Some(b.as_ref()),
            Inner::Full(None) => Some(&[]),
            Inner::Streaming(_) => None,
        }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().inner {
            Inner::Full(bytes) => Poll::Ready(bytes.take().filter(|b| !b.is_empty()).map(Ok)),
            Inner::Streaming(stream) => stream.poll_next_unpin(cx),
        }
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        self.poll_next(cx)
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.inner, Inner::Full(None))
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Inner::Full(Some(b)) => SizeHint::with_exact(b.len() as u64),
            Inner::Full(None) => SizeHint::with_exact(0),
            Inner::Streaming(_) => SizeHint::default(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Body {
        Body {
            inner: Inner::Full(Some(b)),
        }
    }
}

impl From<String> for Body {
    fn from(t: String) -> Body {
        Bytes::from(t).into()
    }
}

impl From<&str> for Body {
    fn from(t: &str) -> Body {
        Bytes::copy_from_slice(t.as_bytes()).into()
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Body {
        Bytes::from(v).into()
    }
}
