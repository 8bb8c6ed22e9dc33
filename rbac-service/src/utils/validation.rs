use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use service_core::error::AppError;
use validator::Validate;

/// Json extractor that runs `validator` rules and rejects with the uniform
/// error body instead of axum's plain-text 422.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(format!("malformed request body: {}", e)))?;

        value.validate().map_err(|e| {
            let fields: serde_json::Value = e
                .field_errors()
                .into_iter()
                .map(|(field, errors)| {
                    let codes: Vec<String> =
                        errors.iter().map(|err| err.code.to_string()).collect();
                    (field.to_string(), json!(codes))
                })
                .collect::<serde_json::Map<_, _>>()
                .into();
            AppError::validation_with("request validation failed", json!({ "fields": fields }))
        })?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest};
    use validator::Validate;

    #[derive(serde::Deserialize, Validate)]
    struct Payload {
        #[validate(email)]
        email: String,
    }

    fn json_request(body: &str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_payload() {
        let req = json_request(r#"{"email": "a@example.com"}"#);
        let ValidatedJson(payload) = ValidatedJson::<Payload>::from_request(req, &())
            .await
            .expect("valid payload");
        assert_eq!(payload.email, "a@example.com");
    }

    #[tokio::test]
    async fn rejects_invalid_field_with_validation_error() {
        let req = json_request(r#"{"email": "nope"}"#);
        let err = ValidatedJson::<Payload>::from_request(req, &())
            .await
            .err()
            .expect("rejection");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_malformed_json_with_validation_error() {
        let req = json_request("{not json");
        let err = ValidatedJson::<Payload>::from_request(req, &())
            .await
            .err()
            .expect("rejection");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
