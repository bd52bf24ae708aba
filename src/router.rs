//! Request routing: one `matchit` tree per HTTP method, plus the 404 and
//! 405 answers for requests no tree matches.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::config::Config;
use crate::error::HttpError;
use crate::handler::{BoxedHandler, Handler};
use crate::request::{BoxError, Request};
use crate::response::IntoResponse;

/// The application router.
///
/// Build it once at startup and pass it to
/// [`Server::serve`](crate::Server::serve). Registration methods return
/// `self` so they chain.
///
/// ```rust,no_run
/// # use roost::{Request, Response, Router};
/// # async fn list_users(_: Request) -> Response { Response::text("") }
/// # async fn get_user(_: Request) -> Response { Response::text("") }
/// # async fn create_user(_: Request) -> Response { Response::text("") }
/// Router::new()
///     .get("/health", |_req: Request| async { "ok" })
///     .group("/api/v1", |api| {
///         api.get("/users", list_users)
///            .get("/users/{id}", get_user)
///            .post("/users", create_user);
///     });
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    config: Arc<Config>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A router whose requests carry `config` (body limit, strict JSON,
    /// binding limits).
    pub fn with_config(config: Config) -> Self {
        Self { routes: HashMap::new(), config: Arc::new(config) }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.insert(method, path, handler);
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Registers every route added inside `build` under `prefix`.
    pub fn group(mut self, prefix: &str, build: impl FnOnce(&mut Group<'_>)) -> Self {
        let mut group = Group { router: &mut self, prefix: prefix.trim_end_matches('/').to_owned() };
        build(&mut group);
        self
    }

    fn insert(&mut self, method: Method, path: &str, handler: impl Handler) {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Methods with a route matching `path`, sorted for a stable `allow` header.
    fn allowed(&self, path: &str) -> Vec<&str> {
        let mut methods: Vec<&str> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        methods.sort_unstable();
        methods
    }

    /// Routes one request and produces its response.
    ///
    /// Unknown paths answer 404. A path registered under other methods
    /// answers 405 with an `allow` header listing them.
    pub async fn handle<B>(&self, req: http::Request<B>, remote_addr: Option<SocketAddr>) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let Some((handler, params)) = self.lookup(&method, &path) else {
            let allowed = self.allowed(&path);
            if allowed.is_empty() {
                debug!(%method, path = %path, status = 404, "no route");
                return HttpError::not_found("route not found").into_response().into_inner();
            }
            debug!(%method, path = %path, status = 405, "method not allowed");
            let mut res = HttpError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
            res.headers.push(("allow".to_owned(), allowed.join(", ")));
            return res.into_inner();
        };

        let req = Request::with_config(req, Arc::clone(&self.config))
            .with_params(params)
            .with_remote_addr(remote_addr);
        let res = handler.call(req).await;
        debug!(%method, path = %path, status = res.status.as_u16(), "handled");
        res.into_inner()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Routes sharing a path prefix. Obtained inside [`Router::group`].
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
}

impl Group<'_> {
    pub fn on(&mut self, method: Method, path: &str, handler: impl Handler) -> &mut Self {
        let full = format!("{}{path}", self.prefix);
        self.router.insert(method, &full, handler);
        self
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.on(Method::DELETE, path, handler)
    }

    /// A nested group; prefixes compose.
    pub fn group(&mut self, prefix: &str, build: impl FnOnce(&mut Group<'_>)) -> &mut Self {
        let prefix = format!("{}{}", self.prefix, prefix.trim_end_matches('/'));
        let mut nested = Group { router: &mut *self.router, prefix };
        build(&mut nested);
        self
    }
}
