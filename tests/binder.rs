use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Frame;
use roost::{BindError, Config, FileHeader, MAX_FILE_SIZE, Request};
use serde::Deserialize;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn request(uri: &str, content_type: Option<&str>, body: impl Into<Bytes>) -> Request {
    request_with(uri, content_type, body, Config::default())
}

fn request_with(uri: &str, content_type: Option<&str>, body: impl Into<Bytes>, config: Config) -> Request {
    let mut builder = http::Request::builder().method("POST").uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    Request::with_config(builder.body(Full::new(body.into())).unwrap(), Arc::new(config))
}

const BOUNDARY: &str = "roost-test-boundary";

enum Part<'a> {
    Value(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Value(name, value) => {
                out.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                out.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, data) => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(data);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

fn multipart_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// A one-frame body that counts how often it is dropped.
struct TrackedBody {
    data: Option<Bytes>,
    drops: Arc<AtomicUsize>,
}

impl hyper::body::Body for TrackedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Ready(self.data.take().map(|data| Ok(Frame::data(data))))
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn tracked(content_type: &str, body: &'static str) -> (Request, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let body = TrackedBody { data: Some(Bytes::from_static(body.as_bytes())), drops: Arc::clone(&drops) };
    let req = http::Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", content_type)
        .body(body)
        .unwrap();
    (Request::new(req), drops)
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct User {
    name: String,
    age: i32,
}

// ── Query ─────────────────────────────────────────────────────────────────────

#[test]
fn query_binds_name_and_age() {
    let mut req = request("/users?name=Alice&age=30", None, "");
    let user: User = req.bind().query().unwrap();
    assert_eq!(user, User { name: "Alice".into(), age: 30 });
}

#[test]
fn query_binds_repeated_keys_into_a_list() {
    #[derive(Deserialize)]
    struct Filter {
        tags: Vec<String>,
    }
    let mut req = request("/posts?tags=go&tags=web", None, "");
    let filter: Filter = req.bind().query().unwrap();
    assert_eq!(filter.tags, ["go", "web"]);
}

#[test]
fn query_rejects_overlong_values() {
    let uri = format!("/users?name={}", "a".repeat(10_001));
    let mut req = request(&uri, None, "");
    match req.bind().query::<User>() {
        Err(BindError::FieldTooLong { field }) => assert_eq!(field, "name"),
        other => panic!("expected FieldTooLong, got {other:?}"),
    }
}

#[test]
fn query_rejects_out_of_range_integers() {
    #[derive(Debug, Deserialize)]
    struct Level {
        value: i8,
    }
    let mut req = request("/?value=300", None, "");
    let err = req.bind().query::<Level>().unwrap_err();
    assert!(matches!(err, BindError::Overflow { ref field, .. } if field == "value"), "{err:?}");
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn query_binds_aliased_fields() {
    #[derive(Deserialize)]
    struct Search {
        #[serde(alias = "q")]
        term: String,
    }
    let mut req = request("/search?term=rust", None, "");
    assert_eq!(req.bind().query::<Search>().unwrap().term, "rust");

    let mut req = request("/search?q=tokio", None, "");
    assert_eq!(req.bind().query::<Search>().unwrap().term, "tokio");
}

#[test]
fn query_does_not_consume_the_body() {
    let mut req = request("/?name=Ann", Some("text/plain"), "still here");
    let _: User = req.bind().query().unwrap();
    assert!(req.take_body().is_some());
}

// ── JSON / XML / text ─────────────────────────────────────────────────────────

#[tokio::test]
async fn auto_dispatches_json() {
    let mut req = request("/", Some("application/json; charset=utf-8"), r#"{"name":"Ann","age":41}"#);
    let user: User = req.bind().auto().await.unwrap();
    assert_eq!(user, User { name: "Ann".into(), age: 41 });
}

#[tokio::test]
async fn auto_matches_content_type_case_insensitively() {
    let mut req = request("/", Some("Application/JSON"), r#"{"name":"Ann","age":41}"#);
    let user: User = req.bind().auto().await.unwrap();
    assert_eq!(user.age, 41);
}

#[tokio::test]
async fn auto_refuses_unknown_media_types() {
    let mut req = request("/", Some("text/plain"), "hello");
    let err = req.bind().auto::<User>().await.unwrap_err();
    match &err {
        BindError::UnsupportedMediaType { content_type } => assert_eq!(content_type, "text/plain"),
        other => panic!("expected UnsupportedMediaType, got {other:?}"),
    }
    assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn auto_refuses_a_missing_content_type() {
    let mut req = request("/", None, "{}");
    let err = req.bind().auto::<User>().await.unwrap_err();
    assert!(matches!(err, BindError::UnsupportedMediaType { .. }));
}

#[tokio::test]
async fn malformed_json_is_invalid_format() {
    let mut req = request("/", Some("application/json"), r#"{"name":"#);
    let err = req.bind().json::<User>().await.unwrap_err();
    assert!(matches!(err, BindError::InvalidFormat { format: "JSON", .. }), "{err:?}");
}

#[tokio::test]
async fn strict_json_from_config() {
    let config = Config { strict_json: true, ..Config::default() };
    let body = r#"{"name":"Ann","age":41,"admin":true}"#;

    let mut req = request_with("/", Some("application/json"), body, config.clone());
    let err = req.bind().json::<User>().await.unwrap_err();
    assert!(err.to_string().contains("admin"), "{err}");

    let mut req = request_with("/", Some("application/json"), body, config);
    let user: User = req.bind().lenient().json().await.unwrap();
    assert_eq!(user.name, "Ann");
}

#[tokio::test]
async fn per_bind_strict_overrides_lenient_config() {
    let mut req = request("/", Some("application/json"), r#"{"name":"Ann","age":41,"x":1}"#);
    assert!(req.bind().strict().json::<User>().await.is_err());
}

#[tokio::test]
async fn xml_binds_elements() {
    let mut req = request("/", Some("application/xml"), "<user><name>Ann</name><age>41</age></user>");
    let user: User = req.bind().auto().await.unwrap();
    assert_eq!(user, User { name: "Ann".into(), age: 41 });
}

#[tokio::test]
async fn xml_never_resolves_external_entities() {
    let payload = r#"<?xml version="1.0"?>
<!DOCTYPE user [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<user><name>&xxe;</name><age>1</age></user>"#;
    let mut req = request("/", Some("text/xml"), payload);
    match req.bind().xml::<User>().await {
        Ok(user) => assert!(!user.name.contains("root:"), "entity was resolved: {}", user.name),
        Err(err) => assert!(matches!(err, BindError::InvalidFormat { .. }), "{err:?}"),
    }
}

#[tokio::test]
async fn text_and_bytes_return_the_raw_body() {
    let mut req = request("/", Some("text/plain"), "héllo");
    assert_eq!(req.bind().text().await.unwrap(), "héllo");

    let mut req = request("/", None, vec![0u8, 159, 146, 150]);
    assert_eq!(&req.bind().bytes().await.unwrap()[..], &[0u8, 159, 146, 150]);
}

#[tokio::test]
async fn text_rejects_invalid_utf8() {
    let mut req = request("/", Some("text/plain"), vec![0xffu8, 0xfe]);
    assert!(matches!(req.bind().text().await, Err(BindError::InvalidFormat { .. })));
}

// ── Body lifecycle ────────────────────────────────────────────────────────────

#[tokio::test]
async fn body_is_released_once_after_success() {
    let (mut req, drops) = tracked("application/json", r#"{"name":"Ann","age":1}"#);
    let _: User = req.bind().json().await.unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    drop(req);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn body_is_released_once_after_failure() {
    let (mut req, drops) = tracked("application/json", "not json");
    assert!(req.bind().json::<User>().await.is_err());
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    drop(req);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn untouched_body_is_released_with_the_request() {
    let (mut req, drops) = tracked("text/plain", "hello");
    assert!(req.bind().auto::<User>().await.is_err());
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(req);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_body_bind_sees_an_empty_body() {
    let mut req = request("/", Some("application/json"), r#"{"name":"Ann","age":1}"#);
    let _: User = req.bind().json().await.unwrap();
    assert!(matches!(req.bind().json::<User>().await, Err(BindError::EmptyBody)));
}

#[tokio::test]
async fn taken_body_leaves_nothing_to_bind() {
    let mut req = request("/", Some("application/json"), "{}");
    assert!(req.take_body().is_some());
    let err = req.bind().json::<User>().await.unwrap_err();
    assert!(matches!(err, BindError::EmptyBody));
    assert_eq!(err.to_string(), "request body is empty");
}

#[tokio::test]
async fn body_limit_answers_413() {
    let config = Config { body_limit: Some(16), ..Config::default() };
    let body = format!(r#"{{"name":"{}","age":1}}"#, "x".repeat(64));
    let mut req = request_with("/", Some("application/json"), body, config);

    let err = req.bind().json::<User>().await.unwrap_err();
    assert!(matches!(err, BindError::BodyTooLarge), "{err:?}");
    assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ── Forms ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn form_binds_urlencoded_bodies() {
    let mut req = request("/", Some("application/x-www-form-urlencoded"), "name=Ann+Lee&age=41");
    let user: User = req.bind().auto().await.unwrap();
    assert_eq!(user, User { name: "Ann Lee".into(), age: 41 });
}

#[tokio::test]
async fn form_can_be_bound_twice() {
    let mut req = request("/", Some("application/x-www-form-urlencoded"), "name=Ann&age=41");
    let first: User = req.bind().form().await.unwrap();
    let second: User = req.bind().form().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn form_ignores_other_content_types() {
    let mut req = request("/", Some("application/json"), r#"{"name":"Ann"}"#);
    let user: User = req.bind().form().await.unwrap();
    assert_eq!(user, User::default());
    assert!(req.take_body().is_some());
}

// ── Multipart ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Document {
    title: String,
    file: FileHeader,
}

#[tokio::test]
async fn multipart_binds_values_and_files() {
    let body = multipart_body(&[Part::Value("title", "Doc"), Part::File("file", "a.txt", b"hello")]);
    let mut req = request("/", Some(&multipart_type()), body);

    let doc: Document = req.bind().auto().await.unwrap();
    assert_eq!(doc.title, "Doc");
    assert_eq!(doc.file.filename, "a.txt");
    assert_eq!(doc.file.size, 5);
    assert_eq!(&doc.file.data[..], b"hello");
}

#[tokio::test]
async fn omitted_file_leaves_the_zero_value() {
    let body = multipart_body(&[Part::Value("title", "Doc")]);
    let mut req = request("/", Some(&multipart_type()), body);

    let doc: Document = req.bind().multipart_form().await.unwrap();
    assert_eq!(doc.title, "Doc");
    assert_eq!(doc.file, FileHeader::default());
}

#[tokio::test]
async fn file_after_multipart_bind_reuses_the_parsed_form() {
    let body = multipart_body(&[Part::Value("title", "Doc"), Part::File("file", "a.txt", b"hello")]);
    let mut req = request("/", Some(&multipart_type()), body);

    let _: Document = req.bind().multipart_form().await.unwrap();
    let file = req.bind().file("file").await.unwrap();
    assert_eq!(file.filename, "a.txt");

    match req.bind().file("missing").await {
        Err(BindError::FileRetrieval { message }) => assert_eq!(message, "no such file"),
        other => panic!("expected FileRetrieval, got {other:?}"),
    }
}

#[tokio::test]
async fn file_on_a_non_multipart_request_fails_retrieval() {
    let mut req = request("/", Some("application/json"), "{}");
    assert!(matches!(req.bind().file("file").await, Err(BindError::FileRetrieval { .. })));
}

#[tokio::test]
async fn oversized_file_is_rejected_by_name() {
    let data = vec![b'x'; MAX_FILE_SIZE as usize + 1];
    let body = multipart_body(&[Part::File("upload", "big.bin", &data)]);
    let config = Config { body_limit: None, ..Config::default() };
    let mut req = request_with("/", Some(&multipart_type()), body, config);

    match req.bind().file("upload").await {
        Err(BindError::FileTooLarge { filename }) => assert_eq!(filename, "big.bin"),
        other => panic!("expected FileTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn file_of_exactly_the_maximum_size_binds() {
    let data = vec![b'x'; MAX_FILE_SIZE as usize];
    let body = multipart_body(&[Part::File("upload", "max.bin", &data)]);
    let config = Config { body_limit: None, ..Config::default() };
    let mut req = request_with("/", Some(&multipart_type()), body, config);

    let file = req.bind().file("upload").await.unwrap();
    assert_eq!(file.size, MAX_FILE_SIZE);
}

#[tokio::test]
async fn blank_file_input_leaves_optional_file_empty() {
    #[derive(Debug, Deserialize)]
    struct Draft {
        title: String,
        file: Option<FileHeader>,
    }
    let body = multipart_body(&[Part::Value("title", "Doc"), Part::File("file", "", b"")]);
    let mut req = request("/", Some(&multipart_type()), body);

    let draft: Draft = req.bind().multipart_form().await.unwrap();
    assert_eq!(draft.title, "Doc");
    assert!(draft.file.is_none(), "{:?}", draft.file);
}

#[tokio::test]
async fn explicit_memory_budget_caps_values() {
    let body = multipart_body(&[Part::Value("title", "a fairly long document title")]);
    let mut req = request("/", Some(&multipart_type()), body);
    let err = req.bind().multipart_form_with_memory::<Document>(4).await.unwrap_err();
    assert!(matches!(err, BindError::InvalidFormat { .. }), "{err:?}");
}

// ── Request helpers ───────────────────────────────────────────────────────────

#[test]
fn client_ip_prefers_proxy_headers_when_trusted() {
    let req = Request::new(
        http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    );
    assert_eq!(req.client_ip(true).as_deref(), Some("203.0.113.7"));
    assert_eq!(req.client_ip(false), None);

    let req = Request::new(
        http::Request::builder()
            .uri("/")
            .header("x-real-ip", "198.51.100.2")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    );
    assert_eq!(req.client_ip(true).as_deref(), Some("198.51.100.2"));
}

#[test]
fn query_helpers_read_the_first_value() {
    let req = request("/?page=2&page=3&q=a%20b", None, "");
    assert_eq!(req.query("page").as_deref(), Some("2"));
    assert_eq!(req.query("q").as_deref(), Some("a b"));
    assert_eq!(req.query_values().get_all("page"), ["2", "3"]);
}
