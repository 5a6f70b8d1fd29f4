use std::io::ErrorKind;

use http::StatusCode;

use crate::backend::BackendError;
use crate::davstatus::ConditionCode;

#[derive(Debug)]
pub(crate) enum DavError {
    XmlReadError,
    XmlParseError,
    InvalidPath,
    IllegalPath,
    ForbiddenPath,
    UnknownDavMethod,
    Condition(ConditionCode),
    Status(StatusCode),
    StatusClose(StatusCode),
    Backend(BackendError),
    IoError(std::io::Error),
    XmlWriterError(xml::writer::Error),
}

impl std::error::Error for DavError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DavError::IoError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlReadError => write!(f, "XML read error"),
            DavError::XmlParseError => write!(f, "XML parse error"),
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            DavError::Condition(c) => write!(f, "{}", c.message()),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        DavError::IoError(e)
    }
}

// for failing a streamed response body mid-flight.
impl From<DavError> for std::io::Error {
    fn from(e: DavError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

impl From<ConditionCode> for DavError {
    fn from(c: ConditionCode) -> Self {
        DavError::Condition(c)
    }
}

impl From<BackendError> for DavError {
    fn from(e: BackendError) -> Self {
        DavError::Backend(e)
    }
}

fn ioerror_to_status(ioerror: &std::io::Error) -> StatusCode {
    match ioerror.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

pub(crate) fn backend_error_to_status(e: BackendError) -> StatusCode {
    match e {
        BackendError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        BackendError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        BackendError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        BackendError::NotFound => StatusCode::NOT_FOUND,
        BackendError::Forbidden => StatusCode::FORBIDDEN,
        BackendError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        BackendError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::Condition(c) => c.status(),
            DavError::Status(s) => *s,
            DavError::StatusClose(s) => *s,
            DavError::Backend(e) => backend_error_to_status(*e),
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The condition code this error resolves to, used for the error body.
    pub(crate) fn condition(&self) -> ConditionCode {
        match self {
            DavError::Condition(c) => *c,
            other => ConditionCode::from_status(other.statuscode()),
        }
    }

    // Whether the connection should be closed after the error response.
    pub(crate) fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_))
    }
}
