//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and the [`Valid`]
//! extractor, which decodes a strict JSON body and then runs the DTO's field
//! checks. Decode failures are 400s; field failures are 422s keyed by field.

use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use tollgate_core::Validator;

use crate::error::AppError;
use crate::json::StrictJson;

/// Request types that check their fields beyond what deserialization checks.
pub trait Validate {
    /// Record every field failure in `v`.
    fn validate(&self, v: &mut Validator);
}

/// Run `value`'s checks, returning it or the collected field errors.
pub fn validated<T: Validate>(value: T) -> Result<T, AppError> {
    let mut v = Validator::new();
    value.validate(&mut v);
    if v.valid() {
        Ok(value)
    } else {
        Err(AppError::Validation(v.into_errors()))
    }
}

/// Strict JSON body that has passed [`Validate`].
#[derive(Debug, Clone)]
pub struct Valid<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let StrictJson(value) = StrictJson::<T>::from_request(req, state).await?;
        validated(value).map(Valid)
    }
}
