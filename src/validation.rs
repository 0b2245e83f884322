use crate::error::AppError;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub type ApiError = Custom<Json<ValidationResponse>>;

pub trait ToValidationResponse {
    fn to_validation_response(self) -> ApiError;
}

impl ToValidationResponse for AppError {
    #[instrument]
    fn to_validation_response(self) -> ApiError {
        self.log_and_record("API Validation Error");
        let status = self.status_code();
        let (field, message) = self.field_and_message();

        Custom(status, Json(ValidationResponse::with_error(field, &message)))
    }
}

/// Envelope for failures raised by Rocket itself (failed guards, bodies that
/// do not parse, unknown routes) before any handler runs.
impl ToValidationResponse for Status {
    #[instrument]
    fn to_validation_response(self) -> ApiError {
        let (field, message) = match self.code {
            400 => ("request", "Malformed request"),
            401 => ("authentication", "Login required"),
            403 => ("permission", "Not allowed for this account"),
            404 => ("resource", "No such resource"),
            409 => ("resource", "Conflicts with an existing record"),
            422 => ("validation", "Request body has missing or invalid fields"),
            500..=599 => ("server", "Internal server error"),
            _ => ("error", "Request failed"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

impl From<validator::ValidationErrors> for ValidationResponse {
    fn from(errors: validator::ValidationErrors) -> Self {
        let errors = errors
            .field_errors()
            .into_iter()
            .map(|(field, field_errors)| {
                let messages = field_errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("Invalid {}", field))
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();

        ValidationResponse::new(errors)
    }
}

/// Runs `validator` rules over a JSON body, turning failures into a 422
/// with one entry per offending field.
pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, ApiError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, ApiError> {
        let inner = self.into_inner();
        match inner.validate() {
            Ok(()) => Ok(inner),
            Err(errors) => {
                tracing::warn!(errors = %errors, "Request body failed validation");
                Err(Custom(
                    Status::UnprocessableEntity,
                    Json(ValidationResponse::from(errors)),
                ))
            }
        }
    }
}

pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, ApiError>;
}

impl<T> AppErrorExt<T> for Result<T, AppError> {
    fn validate_custom(self) -> Result<T, ApiError> {
        self.map_err(|e| e.to_validation_response())
    }
}
