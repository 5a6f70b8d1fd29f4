//! The closed set of condition codes a request can resolve to.
//!
//! A [`ConditionCode`] bundles an HTTP status, a canonical message for
//! plain-text error bodies, and - where RFC 4918 defines one - the name of
//! the XML error element to emit inside `<D:error>`.

use http::StatusCode;

/// Canonical HTTP + WebDAV status taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCode {
    Ok,
    Created,
    NoContent,
    MultiStatus,
    NotModified,
    BadRequest,
    Unauthorized,
    Forbidden,
    /// 403 with `DAV:propfind-finite-depth` (RFC 4918 9.1).
    PropfindFiniteDepth,
    /// 403 with `DAV:cannot-modify-protected-property` (RFC 4918 16).
    CannotModifyProtectedProperty,
    NotFound,
    MethodNotAllowed,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnsupportedMediaType,
    UnprocessableEntity,
    /// 423 with `DAV:lock-token-submitted` (RFC 4918 9.10.1).
    LockTokenSubmitted,
    /// 423 with `DAV:no-conflicting-lock` (RFC 4918 9.10.6).
    NoConflictingLock,
    FailedDependency,
    InternalServerError,
    NotImplemented,
    InsufficientStorage,
}

impl ConditionCode {
    pub fn status(&self) -> StatusCode {
        use ConditionCode::*;
        match self {
            Ok => StatusCode::OK,
            Created => StatusCode::CREATED,
            NoContent => StatusCode::NO_CONTENT,
            MultiStatus => StatusCode::MULTI_STATUS,
            NotModified => StatusCode::NOT_MODIFIED,
            BadRequest => StatusCode::BAD_REQUEST,
            Unauthorized => StatusCode::UNAUTHORIZED,
            Forbidden | PropfindFiniteDepth | CannotModifyProtectedProperty => StatusCode::FORBIDDEN,
            NotFound => StatusCode::NOT_FOUND,
            MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Conflict => StatusCode::CONFLICT,
            PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            LockTokenSubmitted | NoConflictingLock => StatusCode::LOCKED,
            FailedDependency => StatusCode::FAILED_DEPENDENCY,
            InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            NotImplemented => StatusCode::NOT_IMPLEMENTED,
            InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        }
    }

    /// Canonical message, used for the plain-text error body.
    pub fn message(&self) -> &'static str {
        use ConditionCode::*;
        match self {
            Ok => "OK",
            Created => "Created",
            NoContent => "No Content",
            MultiStatus => "Multi-Status",
            NotModified => "Not Modified",
            BadRequest => "Bad Request",
            Unauthorized => "Unauthorized",
            Forbidden => "Forbidden",
            PropfindFiniteDepth => "PROPFIND with Depth: infinity is not allowed",
            CannotModifyProtectedProperty => "Cannot modify a protected property",
            NotFound => "Not Found",
            MethodNotAllowed => "Method Not Allowed",
            Conflict => "Conflict",
            PreconditionFailed => "Precondition Failed",
            PayloadTooLarge => "Payload Too Large",
            UnsupportedMediaType => "Unsupported Media Type",
            UnprocessableEntity => "Unprocessable Entity",
            LockTokenSubmitted => "The resource is locked and no valid lock token was submitted",
            NoConflictingLock => "A conflicting lock exists on this resource",
            FailedDependency => "Failed Dependency",
            InternalServerError => "Internal Server Error",
            NotImplemented => "Not Implemented",
            InsufficientStorage => "Insufficient Storage",
        }
    }

    /// The `DAV:` error element for this code, if RFC 4918 defines one.
    pub fn xml_error(&self) -> Option<&'static str> {
        use ConditionCode::*;
        match self {
            PropfindFiniteDepth => Some("propfind-finite-depth"),
            CannotModifyProtectedProperty => Some("cannot-modify-protected-property"),
            LockTokenSubmitted => Some("lock-token-submitted"),
            NoConflictingLock => Some("no-conflicting-lock"),
            _ => None,
        }
    }

    /// Best-effort mapping back from a bare status code.
    pub fn from_status(status: StatusCode) -> ConditionCode {
        use ConditionCode::*;
        match status {
            StatusCode::OK => Ok,
            StatusCode::CREATED => Created,
            StatusCode::NO_CONTENT => NoContent,
            StatusCode::MULTI_STATUS => MultiStatus,
            StatusCode::NOT_MODIFIED => NotModified,
            StatusCode::BAD_REQUEST => BadRequest,
            StatusCode::UNAUTHORIZED => Unauthorized,
            StatusCode::FORBIDDEN => Forbidden,
            StatusCode::NOT_FOUND => NotFound,
            StatusCode::METHOD_NOT_ALLOWED => MethodNotAllowed,
            StatusCode::CONFLICT => Conflict,
            StatusCode::PRECONDITION_FAILED => PreconditionFailed,
            StatusCode::PAYLOAD_TOO_LARGE => PayloadTooLarge,
            StatusCode::UNSUPPORTED_MEDIA_TYPE => UnsupportedMediaType,
            StatusCode::UNPROCESSABLE_ENTITY => UnprocessableEntity,
            StatusCode::LOCKED => LockTokenSubmitted,
            StatusCode::FAILED_DEPENDENCY => FailedDependency,
            StatusCode::NOT_IMPLEMENTED => NotImplemented,
            StatusCode::INSUFFICIENT_STORAGE => InsufficientStorage,
            _ => InternalServerError,
        }
    }
}

impl std::fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.status().as_u16(), self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_variants_share_status() {
        assert_eq!(ConditionCode::LockTokenSubmitted.status(), StatusCode::LOCKED);
        assert_eq!(ConditionCode::NoConflictingLock.status(), StatusCode::LOCKED);
        assert_ne!(
            ConditionCode::LockTokenSubmitted.xml_error(),
            ConditionCode::NoConflictingLock.xml_error()
        );
    }

    #[test]
    fn xml_error_only_where_defined() {
        assert_eq!(ConditionCode::NotFound.xml_error(), None);
        assert_eq!(
            ConditionCode::PropfindFiniteDepth.xml_error(),
            Some("propfind-finite-depth")
        );
    }
}
