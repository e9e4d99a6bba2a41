use crate::errors::{scope_error_disclosure, ErrorDisclosure};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Makes the configured disclosure level visible to error rendering for the
/// rest of the request.
pub async fn error_disclosure_middleware(
    State(disclosure): State<ErrorDisclosure>,
    request: Request,
    next: Next,
) -> Response {
    scope_error_disclosure(disclosure, next.run(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorResponse, ServiceError};
    use axum::{
        body::{to_bytes, Body},
        http::Request as HttpRequest,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn failing() -> Result<(), ServiceError> {
        Err(ServiceError::InternalError("disk full on /var/lib".into()))
    }

    async fn error_text(disclosure: ErrorDisclosure) -> ErrorResponse {
        let app = Router::new().route("/", get(failing)).layer(
            axum::middleware::from_fn_with_state(disclosure, error_disclosure_middleware),
        );
        let response = app
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn redacted_layer_hides_internals() {
        let body = error_text(ErrorDisclosure::Redacted).await;
        assert_eq!(body.error, "Internal server error");
        assert!(body.debug.is_none());
    }

    #[tokio::test]
    async fn verbose_layer_exposes_internals() {
        let body = error_text(ErrorDisclosure::Verbose).await;
        assert!(body.error.contains("disk full"));
        assert!(body.debug.is_some());
    }
}
