//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Limited};

use crate::binder::{Binder, MultipartForm, Values};
use crate::config::Config;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The request body as handlers see it: a type-erased byte stream.
pub type Body = BoxBody<Bytes, BoxError>;

/// An incoming HTTP request.
///
/// The body can be consumed once, either through [`Request::bind`] or by
/// taking it with [`Request::take_body`]. Parsed form and multipart data are
/// kept, so binding the same form twice works.
pub struct Request {
    pub(crate) parts: http::request::Parts,
    pub(crate) body: Option<Body>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) config: Arc<Config>,
    pub(crate) form: Option<Values>,
    pub(crate) multipart: Option<MultipartForm>,
}

impl Request {
    /// Wraps an `http::Request` using the default [`Config`].
    pub fn new<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self::with_config(req, Arc::new(Config::default()))
    }

    /// Wraps an `http::Request`, applying `config.body_limit` to its body.
    pub fn with_config<B>(req: http::Request<B>, config: Arc<Config>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = match config.body_limit {
            Some(limit) => Limited::new(body, limit).boxed(),
            None => body.map_err(Into::<BoxError>::into).boxed(),
        };
        Self {
            parts,
            body: Some(body),
            params: HashMap::new(),
            remote_addr: None,
            config,
            form: None,
            multipart: None,
        }
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub(crate) fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn config(&self) -> &Config { &self.config }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup. Names are case-insensitive; non-UTF-8 values read as
    /// absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.parts.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First query-string value for `key`.
    pub fn query(&self, key: &str) -> Option<String> {
        self.query_values().get(key).map(str::to_owned)
    }

    /// The whole query string as a multi-valued map.
    pub fn query_values(&self) -> Values {
        Values::parse(self.parts.uri.query().unwrap_or_default().as_bytes())
    }

    /// Best guess at the client address.
    ///
    /// With `trust_proxy`, `X-Real-IP` wins, then the first entry of
    /// `X-Forwarded-For`. Otherwise, or when neither is set, the peer
    /// address of the connection.
    pub fn client_ip(&self, trust_proxy: bool) -> Option<String> {
        if trust_proxy {
            if let Some(ip) = self.header("x-real-ip").filter(|ip| !ip.is_empty()) {
                return Some(ip.to_owned());
            }
            if let Some(xff) = self.header("x-forwarded-for") {
                let first = xff.split(',').next().unwrap_or_default().trim();
                if !first.is_empty() {
                    return Some(first.to_owned());
                }
            }
        }
        self.remote_addr.map(|addr| addr.ip().to_string())
    }

    /// Starts a bind: `req.bind().json::<T>().await`.
    pub fn bind(&mut self) -> Binder<'_> {
        Binder::new(self)
    }

    /// Takes the raw body, leaving nothing for later binds.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }
}
