use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use crate::error::ApiError;

/// Numeric record id taken from the single path parameter.
///
/// A value that is not an integer is rejected with 422 rather than the
/// generic path rejection.
#[derive(Debug, Clone, Copy)]
pub struct Id(pub i64);

impl<S> FromRequestParts<S> for Id
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let Path(raw) = Path::<String>::from_request_parts(parts, state)
      .await
      .map_err(|e| ApiError::BadRequest(e.body_text()))?;

    raw
      .parse()
      .map(Id)
      .map_err(|_| ApiError::Unprocessable(format!("invalid id: {}", raw)))
  }
}
