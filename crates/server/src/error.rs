use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::ModelError;
use services::services::{
    catalog::CatalogError, fulfillment::FulfillmentError, shift::ShiftGridError,
    shift_clock::ShiftClockError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    ShiftGrid(#[from] ShiftGridError),
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
    #[error(transparent)]
    ShiftClock(#[from] ShiftClockError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            ApiError::Database(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                StatusCode::CONFLICT
            }
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Model(ModelError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Model(e) if e.is_unique_violation() => StatusCode::CONFLICT,
            ApiError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ShiftGrid(ShiftGridError::StepNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::ShiftGrid(ShiftGridError::InvalidSize(_)) => StatusCode::BAD_REQUEST,
            ApiError::ShiftGrid(ShiftGridError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Fulfillment(FulfillmentError::Database(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Fulfillment(_) => StatusCode::NOT_FOUND,
            ApiError::ShiftClock(ShiftClockError::UnknownNavigation(_)) => StatusCode::BAD_REQUEST,
            ApiError::ShiftClock(ShiftClockError::StepNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::ShiftClock(ShiftClockError::Database(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Catalog(CatalogError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_message = if status_code.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        assert_eq!(
            ApiError::from(ModelError::validation("bad")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ShiftClockError::UnknownNavigation("up".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(FulfillmentError::OrderNotFound(Uuid::nil())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
