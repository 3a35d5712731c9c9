use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use herdbook_breeding::BreedingError;
use herdbook_core::{Classify, DomainError, ErrorKind};
use herdbook_infra::DispatchError;

/// Handlers return the error body already rendered.
pub type ApiResult = Result<axum::response::Response, axum::response::Response>;

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Remote => StatusCode::BAD_GATEWAY,
    }
}

fn kind_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::Authorization => "forbidden",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Remote => "remote",
    }
}

pub fn breeding_error(err: BreedingError) -> axum::response::Response {
    json_error(status_for(err.kind()), err.code(), err.to_string())
}

/// User and animal commands go through the dispatcher directly.
pub fn dispatch_error(err: DispatchError<DomainError>) -> axum::response::Response {
    let kind = err.kind();
    let code = match &err {
        DispatchError::Concurrency(_) => "conflict",
        DispatchError::FarmIsolation(_) => "farm_isolation",
        _ => kind_code(kind),
    };
    json_error(status_for(kind), code, err.to_string())
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

pub fn not_found(what: &str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Authorization), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Remote), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn ledger_rejections_keep_their_code() {
        let res = breeding_error(BreedingError::ExceedsStock {
            requested: 5,
            remaining: 3,
        });
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = breeding_error(BreedingError::EmptyReason);
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn domain_rejections_use_their_kind() {
        let res = dispatch_error(DispatchError::Rejected(DomainError::not_found()));
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = dispatch_error(DispatchError::Concurrency("v2 != v3".to_string()));
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }
}
