//! # roost
//!
//! Express-style handlers with typed request binding, on top of hyper and
//! matchit.
//!
//! A handler is an `async fn(Request) -> impl IntoResponse`. Inside it,
//! [`Request::bind`] turns the query string, a form, a multipart upload, or
//! a JSON/XML body into any `serde::Deserialize` type:
//!
//! - **Query and form values** bind by field name, first value wins, and
//!   absent keys leave the zero value. Numbers are range-checked and values
//!   longer than [`MAX_FIELD_LENGTH`] bytes are refused.
//! - **Uploads** bind into [`FileHeader`] fields, each capped at
//!   [`MAX_FILE_SIZE`].
//! - **Bodies** are read once and released whatever the outcome.
//! - **Errors** are [`BindError`]s carrying their HTTP status; `?` turns them
//!   into an [`HttpError`] response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use roost::{HttpError, Request, Response, Router, Server, StatusCode};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Search {
//!     q: String,
//!     page: u32,
//!     tags: Vec<String>,
//! }
//!
//! #[derive(Deserialize, Serialize)]
//! struct NewUser {
//!     name: String,
//!     age: u8,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), roost::Error> {
//!     let app = Router::new()
//!         .get("/search", search)
//!         .post("/users", create_user);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn search(mut req: Request) -> Result<Response, HttpError> {
//!     let query: Search = req.bind().query()?;
//!     Ok(Response::text(format!("{} page {} ({} tags)", query.q, query.page, query.tags.len())))
//! }
//!
//! async fn create_user(mut req: Request) -> Result<Response, HttpError> {
//!     let user: NewUser = req.bind().auto().await?;
//!     Ok(Response::builder().status(StatusCode::CREATED).json(&user))
//! }
//! ```

mod config;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod binder;

pub use binder::{BindError, Binder, FileHeader, MultipartForm, Values};
pub use config::{Config, Limits, DEFAULT_BODY_LIMIT, DEFAULT_MULTIPART_MEMORY, KB, MAX_FIELD_LENGTH, MAX_FILE_SIZE, MB};
pub use error::{Error, HttpError};
pub use handler::Handler;
pub use http::{Method, StatusCode};
pub use request::{Body, Request};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Group, Router};
pub use server::Server;
