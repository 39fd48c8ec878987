use crate::StatusCode;
use std::{error, fmt, io};

/// Every way a request can fail before or while it is answered.
///
/// Each kind maps onto exactly one status code; the lifecycle driver is the
/// only place that turns a kind into an assembled error response.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    InvalidMethod,
    InvalidUrl,
    InvalidVersion,
    UnsupportedVersion,

    InvalidHeader,
    HeadTooLarge,
    InvalidContentLength,
    InvalidConnection,
    InvalidTransferEncoding,
    UnsupportedTransferEncoding,

    BodyTooLarge,

    NotFound,
    Io(IoError),
}

impl ErrorKind {
    /// Status code sent to the client for this failure.
    #[inline]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidMethod
            | Self::InvalidUrl
            | Self::InvalidVersion
            | Self::InvalidHeader
            | Self::InvalidContentLength
            | Self::InvalidConnection
            | Self::InvalidTransferEncoding => StatusCode::BadRequest,
            Self::UnsupportedVersion => StatusCode::HttpVersionNotSupported,
            Self::HeadTooLarge => StatusCode::RequestHeaderFieldsTooLarge,
            Self::UnsupportedTransferEncoding => StatusCode::NotImplemented,
            Self::BodyTooLarge => StatusCode::PayloadTooLarge,
            Self::NotFound => StatusCode::NotFound,
            Self::Io(_) => StatusCode::InternalServerError,
        }
    }

    /// A missing resource leaves the connection reusable; everything else
    /// leaves the byte stream in an unknown position and must close it.
    #[inline]
    pub const fn forces_close(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Io({})", err.0),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
