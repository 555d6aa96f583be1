//! Converts crate [`Error`]s into JSON HTTP responses via [`ToHttpStatus`].

use crate::error::{Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_error_status();
        let code = StatusCode::from_u16(status.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(status)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_maps_to_404_json() {
        let error = Error::RemoteNotFound("patreon_1/post/9".into());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let status: crate::error::ErrorStatus = serde_json::from_slice(&body).expect("json");
        assert_eq!(status.error_code, "remote_not_found");
    }
}
