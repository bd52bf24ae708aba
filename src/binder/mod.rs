//! Request binding: turning wire data into typed values.
//!
//! Every format goes through one entry point, [`Request::bind`]:
//!
//! ```rust,no_run
//! use roost::{HttpError, Request, Response};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize, Serialize)]
//! struct User {
//!     name: String,
//!     age: u8,
//! }
//!
//! async fn create_user(mut req: Request) -> Result<Response, HttpError> {
//!     let user: User = req.bind().auto().await?;   // JSON, form, multipart or XML
//!     Ok(Response::json(&user))
//! }
//! ```
//!
//! Destinations are plain `serde::Deserialize` types. For query strings and
//! forms the serde field name (set it with `#[serde(rename = "...")]`) is
//! the key looked up, as is any `#[serde(alias = "...")]`; keys that are not
//! supplied leave the field at its zero value. Every declared field is
//! always given a value, so `#[serde(default)]` and
//! `#[serde(default = "...")]` never take effect for these binds: an absent
//! `page: u32` is `0`, not the default. Use `Option<T>` and
//! `unwrap_or` when a field needs a fallback other than zero. JSON and XML
//! binds honour serde's attributes as usual.
//!
//! Body-consuming binds take the body out of the request. It is released
//! when the bind returns, whatever the outcome; a second body bind on the
//! same request fails with [`BindError::EmptyBody`].

mod de;
mod error;
mod multipart;
mod values;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tracing::trace;

pub use error::BindError;
pub use multipart::{FileHeader, MultipartForm};
pub use values::Values;

use crate::request::Request;

/// One-shot binder for a request. Obtain it with [`Request::bind`].
pub struct Binder<'r> {
    req: &'r mut Request,
    strict: Option<bool>,
}

impl<'r> Binder<'r> {
    pub(crate) fn new(req: &'r mut Request) -> Self {
        Self { req, strict: None }
    }

    /// Strict JSON for this bind: unknown fields and trailing data fail,
    /// whatever [`Config::strict_json`](crate::Config::strict_json) says.
    pub fn strict(mut self) -> Self {
        self.strict = Some(true);
        self
    }

    /// Lenient JSON for this bind, overriding the configuration.
    pub fn lenient(mut self) -> Self {
        self.strict = Some(false);
        self
    }

    /// Decodes the body as JSON.
    pub async fn json<T: DeserializeOwned>(mut self) -> Result<T, BindError> {
        let strict = self.strict.unwrap_or(self.req.config.strict_json);
        let body = self.read_body().await?;
        recover(|| decode_json(&body, strict))
    }

    /// Decodes the body as XML. External entities are never resolved.
    pub async fn xml<T: DeserializeOwned>(mut self) -> Result<T, BindError> {
        let body = self.read_body().await?;
        recover(|| quick_xml::de::from_reader(body.as_ref()).map_err(|e| BindError::invalid_format("XML", e)))
    }

    /// The raw body as UTF-8 text.
    pub async fn text(mut self) -> Result<String, BindError> {
        let body = self.read_body().await?;
        String::from_utf8(body.into()).map_err(|e| BindError::invalid_format("text", e))
    }

    /// The raw body bytes, untouched.
    pub async fn bytes(mut self) -> Result<Bytes, BindError> {
        self.read_body().await
    }

    /// Binds the URL query string. Does not touch the body.
    pub fn query<T: DeserializeOwned>(self) -> Result<T, BindError> {
        let values = self.req.query_values();
        let max = self.req.config.limits.max_field_length;
        recover(|| de::from_values(&values, None, max))
    }

    /// Binds an `application/x-www-form-urlencoded` body.
    ///
    /// Other content types leave the body alone and bind no values, so
    /// every field keeps its zero value.
    pub async fn form<T: DeserializeOwned>(mut self) -> Result<T, BindError> {
        let values = match self.req.form.take() {
            Some(values) => values,
            None => self.read_form().await?,
        };
        let max = self.req.config.limits.max_field_length;
        let result = recover(|| de::from_values(&values, None, max));
        self.req.form = Some(values);
        result
    }

    /// Binds a `multipart/form-data` body with the configured memory budget.
    pub async fn multipart_form<T: DeserializeOwned>(self) -> Result<T, BindError> {
        self.multipart_form_with_memory(0).await
    }

    /// Binds a `multipart/form-data` body: values as in [`Binder::form`],
    /// plus uploads into [`FileHeader`] fields. `max_memory` caps the bytes
    /// of ordinary values; `0` means the configured default.
    pub async fn multipart_form_with_memory<T: DeserializeOwned>(mut self, max_memory: u64) -> Result<T, BindError> {
        let form = self.load_multipart(max_memory).await?;
        let max = self.req.config.limits.max_field_length;
        let result = recover(|| de::from_values(&form.values, Some(&form.files), max));
        self.req.multipart = Some(form);
        result
    }

    /// The first file uploaded under `name`.
    pub async fn file(mut self, name: &str) -> Result<FileHeader, BindError> {
        let form = self.load_multipart(0).await.map_err(|e| match e {
            BindError::FileTooLarge { .. } | BindError::BodyTooLarge => e,
            other => BindError::FileRetrieval { message: other.to_string() },
        })?;
        let file = form.file(name).cloned();
        self.req.multipart = Some(form);
        file.ok_or_else(|| BindError::FileRetrieval { message: "no such file".to_owned() })
    }

    /// Picks the format from the `Content-Type` header.
    pub async fn auto<T: DeserializeOwned>(self) -> Result<T, BindError> {
        let raw = self.req.content_type().unwrap_or_default().to_owned();
        let content_type = raw.trim().to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            trace!("auto bind: json");
            self.json().await
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            trace!("auto bind: form");
            self.form().await
        } else if content_type.starts_with("multipart/form-data") {
            trace!("auto bind: multipart");
            self.multipart_form().await
        } else if content_type.starts_with("application/xml") || content_type.starts_with("text/xml") {
            trace!("auto bind: xml");
            self.xml().await
        } else {
            Err(BindError::UnsupportedMediaType { content_type: raw })
        }
    }

    // ── Body access ──────────────────────────────────────────────────────────

    async fn read_body(&mut self) -> Result<Bytes, BindError> {
        let body = self.req.body.take().ok_or(BindError::EmptyBody)?;
        let collected = body.collect().await.map_err(BindError::from_body)?;
        Ok(collected.to_bytes())
    }

    async fn read_form(&mut self) -> Result<Values, BindError> {
        let urlencoded = self
            .req
            .content_type()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"));
        if !urlencoded {
            return Ok(Values::new());
        }
        if self.req.body.is_none() {
            return Err(BindError::invalid_format("form data", "missing form body"));
        }
        let body = self.read_body().await?;
        Ok(Values::parse(&body))
    }

    async fn load_multipart(&mut self, max_memory: u64) -> Result<MultipartForm, BindError> {
        if let Some(form) = self.req.multipart.take() {
            return Ok(form);
        }
        let boundary = self
            .req
            .content_type()
            .and_then(|ct| multer::parse_boundary(ct).ok())
            .ok_or_else(|| BindError::invalid_format("multipart form", "request Content-Type isn't multipart/form-data"))?;
        let body = self
            .req
            .body
            .take()
            .ok_or_else(|| BindError::invalid_format("multipart form", "missing form body"))?;

        let limits = self.req.config.limits;
        let max_memory = if max_memory == 0 { limits.multipart_memory } else { max_memory };
        multipart::parse(body, boundary, max_memory, limits.max_file_size).await
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn decode_json<T: DeserializeOwned>(body: &[u8], strict: bool) -> Result<T, BindError> {
    let invalid = |e: serde_json::Error| BindError::invalid_format("JSON", e);
    let mut de = serde_json::Deserializer::from_slice(body);
    if !strict {
        // First value only; whatever follows is ignored.
        return T::deserialize(&mut de).map_err(invalid);
    }

    let mut unknown = None;
    let value: T = serde_ignored::deserialize(&mut de, |path| {
        unknown.get_or_insert_with(|| path.to_string());
    })
    .map_err(invalid)?;
    if let Some(path) = unknown {
        return Err(BindError::invalid_format("JSON", format!("unknown field `{path}`")));
    }
    de.end().map_err(invalid)?;
    Ok(value)
}

/// Runs a decode step, turning a panic inside it into
/// [`BindError::Internal`].
fn recover<T>(decode: impl FnOnce() -> Result<T, BindError>) -> Result<T, BindError> {
    panic::catch_unwind(AssertUnwindSafe(decode))
        .unwrap_or_else(|payload| Err(BindError::internal(format!("panic while decoding: {}", panic_message(&*payload)))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown cause"
    }
}
