use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Everything a core operation can fail with. Store errors pass through
/// unchanged and are never retried here; retry policy belongs to callers.
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("{0}")]
    Validation(String),
    #[error("authorization required")]
    Unauthorized,
    #[error("couldn't find the desired {0}")]
    NotFound(&'static str),
    #[error("no group matches that invite code")]
    InvalidCode,
    #[error("you are already a member of this group")]
    AlreadyMember,
    #[error("cannot split expenses across an empty group")]
    NoMembers,
    #[error("couldn't allocate an unused invite code")]
    CodeExhausted,
    #[error("inconsistent store state: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Store(#[from] mongodb::error::Error),
}

impl ResponseError for SplitError {
    fn status_code(&self) -> StatusCode {
        match self {
            SplitError::Validation(_) => StatusCode::BAD_REQUEST,
            SplitError::Unauthorized => StatusCode::UNAUTHORIZED,
            SplitError::NotFound(_) | SplitError::InvalidCode => StatusCode::NOT_FOUND,
            SplitError::AlreadyMember => StatusCode::CONFLICT,
            SplitError::NoMembers => StatusCode::UNPROCESSABLE_ENTITY,
            SplitError::CodeExhausted => StatusCode::SERVICE_UNAVAILABLE,
            SplitError::Inconsistent(_) | SplitError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
