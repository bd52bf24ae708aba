//! `multipart/form-data` parsing and uploaded-file handles.

use std::collections::HashMap;

use bytes::buf::Reader;
use bytes::{Buf, Bytes, BytesMut};
use http_body_util::BodyDataStream;
use serde::Deserialize;

use super::error::BindError;
use super::values::Values;
use crate::request::Body;

/// Uploaded files keyed by form field name, in arrival order.
pub(crate) type Files = HashMap<String, Vec<FileHeader>>;

/// One uploaded file.
///
/// Use it as a destination field type to receive uploads:
///
/// ```rust
/// use roost::FileHeader;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct NewDocument {
///     title: String,
///     file: Option<FileHeader>,        // first file under "file"
///     attachments: Vec<FileHeader>,    // every file under "attachments"
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileHeader {
    pub filename: String,
    /// Declared content type of the part; empty when the client sent none.
    pub content_type: String,
    pub size: u64,
    pub data: Bytes,
}

impl FileHeader {
    /// A reader over the file contents.
    pub fn reader(&self) -> Reader<Bytes> {
        self.data.clone().reader()
    }
}

/// A parsed multipart body: ordinary values plus uploaded files.
#[derive(Clone, Debug, Default)]
pub struct MultipartForm {
    pub values: Values,
    pub files: HashMap<String, Vec<FileHeader>>,
}

impl MultipartForm {
    /// First file uploaded under `name`.
    pub fn file(&self, name: &str) -> Option<&FileHeader> {
        self.files.get(name)?.first()
    }
}

const FORMAT: &str = "multipart form";

/// Streams `body` through the multipart parser.
///
/// Parts with a non-empty filename are files, each capped at
/// `max_file_size`; only the last path component of the name is kept. All
/// other parts are values; together they may hold at most `max_memory`
/// bytes.
pub(crate) async fn parse(
    body: Body,
    boundary: String,
    max_memory: u64,
    max_file_size: u64,
) -> Result<MultipartForm, BindError> {
    let mut multipart = multer::Multipart::new(BodyDataStream::new(body), boundary);
    let mut form = MultipartForm::default();
    let mut held: u64 = 0;

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_owned();

        // An empty filename is what browsers send for a file input left blank.
        let Some(filename) = field.file_name().map(base_name).filter(|f| !f.is_empty()) else {
            let mut buf = BytesMut::new();
            while let Some(chunk) = field.chunk().await.map_err(malformed)? {
                held += chunk.len() as u64;
                if held > max_memory {
                    return Err(BindError::invalid_format(FORMAT, "form values exceed the memory limit"));
                }
                buf.extend_from_slice(&chunk);
            }
            let value = String::from_utf8(buf.to_vec()).map_err(|e| BindError::invalid_format(FORMAT, e))?;
            form.values.append(name, value);
            continue;
        };

        let content_type = field.content_type().map(ToString::to_string).unwrap_or_default();
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(malformed)? {
            if (buf.len() + chunk.len()) as u64 > max_file_size {
                return Err(BindError::FileTooLarge { filename });
            }
            buf.extend_from_slice(&chunk);
        }
        let data = buf.freeze();
        form.files.entry(name).or_default().push(FileHeader {
            filename,
            content_type,
            size: data.len() as u64,
            data,
        });
    }

    Ok(form)
}

/// The last path component of a client-supplied filename.
fn base_name(filename: &str) -> String {
    filename.rsplit(['/', '\\']).next().unwrap_or_default().to_owned()
}

/// Maps a parser failure, surfacing body-limit hits as such.
fn malformed(e: multer::Error) -> BindError {
    match e {
        multer::Error::StreamReadFailed(source) => BindError::from_body(source),
        other => BindError::invalid_format(FORMAT, other),
    }
}
