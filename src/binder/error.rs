use http::StatusCode;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a bind call failed.
///
/// Every variant maps to an HTTP status through [`BindError::status`]; the
/// `Display` text is the message sent to the client. After an error the
/// destination was never produced, so there is nothing partial to clean up.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("invalid {format}: {source}")]
    InvalidFormat {
        format: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("field value too long: {field}")]
    FieldTooLong { field: String },

    #[error("invalid value for field {field}: {message}")]
    InvalidFieldValue { field: String, message: String },

    #[error("value out of range for field {field}: {message}")]
    Overflow { field: String, message: String },

    #[error("file too large: {filename}")]
    FileTooLarge { filename: String },

    #[error("failed to get file: {message}")]
    FileRetrieval { message: String },

    #[error("unsupported content type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    #[error("binding failed: {message}")]
    Internal { message: String },

    #[error("failed to read body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },

    #[error("request body too large")]
    BodyTooLarge,
}

impl BindError {
    /// The HTTP status this error should be answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub(crate) fn invalid_format(format: &'static str, source: impl Into<BoxError>) -> Self {
        Self::InvalidFormat { format, source: source.into() }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Classifies a failure of the underlying body stream.
    pub(crate) fn from_body(source: BoxError) -> Self {
        if source.is::<http_body_util::LengthLimitError>() {
            Self::BodyTooLarge
        } else {
            Self::ReadBody { source }
        }
    }
}
