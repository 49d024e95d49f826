//! Request body extraction for the item endpoints.
//!
//! Bodies are JSON when `Content-Type` starts with `application/json` and
//! `application/x-www-form-urlencoded` otherwise. Any failure becomes a 422
//! before a handler runs.

use axum::extract::{Form, FromRequest, Json, Request};
use axum::http::header;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// A body decoded as JSON or as a form, depending on `Content-Type`.
#[derive(Debug)]
pub struct Payload<T>(pub T);

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(&req) {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

/// Body of `POST /items`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewItem {
    /// Item key; must not be blank.
    pub key: String,
    /// Item value.
    pub value: String,
}

impl NewItem {
    /// Reject a blank key.
    pub fn validate(self) -> Result<Self, ApiError> {
        if self.key.trim().is_empty() {
            return Err(ApiError::InvalidPayload("key must not be empty".into()));
        }
        Ok(self)
    }
}

/// Body of `PUT /items/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemValue {
    /// New value.
    pub value: String,
}
