use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, HeaderMap},
    Json,
};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};

use super::auth::{AuthError, AuthService, Claims};
use crate::error::{AppError, FieldError};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[inline]
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
        message: None,
    })
}

#[inline]
pub fn ok_with<T: Serialize>(data: T, message: &'static str) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
        message: Some(message),
    })
}

/// Reads `Authorization: Bearer <jwt>` and verifies it.
#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> Result<Claims, AuthError> {
    let token = headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;

    service.verify_token(token)
}

/// Like `validate_auth_token`, but a request without a token is anonymous.
/// A token that is present must still be valid.
#[inline]
pub fn optional_auth_token(
    headers: &HeaderMap,
    service: &AuthService,
) -> Result<Option<Claims>, AuthError> {
    match validate_auth_token(headers, service) {
        Ok(claims) => Ok(Some(claims)),
        Err(AuthError::MissingToken) => Ok(None),
        Err(err) => Err(err),
    }
}

/// JSON body extractor whose rejection uses the field-error format.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(vec![FieldError::new(
                "body",
                rejection.body_text(),
            )])),
        }
    }
}

/// Query-string extractor with the same rejection format as [`ValidJson`].
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(vec![FieldError::new(
                "query",
                rejection.body_text(),
            )])),
        }
    }
}

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &str, ok: bool, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn required(&mut self, field: &str, value: Option<&str>, message: &str) -> &mut Self {
        let present = value.is_some_and(|value| !value.trim().is_empty());
        self.check(field, present, message)
    }

    pub fn email(&mut self, field: &str, value: Option<&str>, message: &str) -> &mut Self {
        let valid = value.is_some_and(|value| serde_email::is_valid_email(value.trim()));
        self.check(field, valid, message)
    }

    pub fn min_len(&mut self, field: &str, value: Option<&str>, min: usize, message: &str) -> &mut Self {
        let long_enough = value.is_some_and(|value| value.chars().count() >= min);
        self.check(field, long_enough, message)
    }

    pub fn exact_len(&mut self, field: &str, value: Option<&str>, len: usize, message: &str) -> &mut Self {
        let exact = value.is_some_and(|value| value.trim().chars().count() == len);
        self.check(field, exact, message)
    }

    pub fn positive(&mut self, field: &str, value: Option<Decimal>, message: &str) -> &mut Self {
        let positive = value.is_some_and(|value| value > Decimal::ZERO);
        self.check(field, positive, message)
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn validator_collects_every_failure() {
        let err = Validator::new()
            .required("name", Some("  "), "Name is required")
            .email("email", Some("not-an-email"), "Valid email is required")
            .min_len("password", Some("abc"), 6, "Password must be at least 6 characters")
            .exact_len("postalCode", Some("5557"), 5, "Postal code must be 5 digits")
            .positive("amount", Some(Decimal::ZERO), "Amount must be a positive number")
            .finish()
            .unwrap_err();

        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "email", "password", "postalCode", "amount"]);
    }

    #[test]
    fn validator_accepts_valid_input() {
        Validator::new()
            .required("name", Some("Budi"), "Name is required")
            .email("email", Some("budi@example.com"), "Valid email is required")
            .exact_len("postalCode", Some("55571"), 5, "Postal code must be 5 digits")
            .positive("amount", Some(Decimal::from(10)), "Amount must be a positive number")
            .finish()
            .unwrap();
    }

    #[test]
    fn missing_values_fail_every_rule() {
        let err = Validator::new()
            .required("a", None, "a")
            .email("b", None, "b")
            .min_len("c", None, 1, "c")
            .positive("d", None, "d")
            .finish()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(errors) if errors.len() == 4));
    }

    #[test]
    fn bearer_prefix_is_required() {
        let service = AuthService::for_tests();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            validate_auth_token(&headers, &service),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(optional_auth_token(&headers, &service), Ok(None)));

        headers.insert("Authorization", HeaderValue::from_static("Bearer not-a-jwt"));
        assert!(matches!(
            validate_auth_token(&headers, &service),
            Err(AuthError::InvalidToken)
        ));
        assert!(optional_auth_token(&headers, &service).is_err());
    }
}
