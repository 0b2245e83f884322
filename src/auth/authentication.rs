use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;

use crate::db::{get_session_by_token, get_user};
use crate::validation::{ToValidationResponse, ValidationResponse};

use super::User;

pub const SESSION_COOKIE: &str = "session_token";

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let token = request
            .cookies()
            .get_private(SESSION_COOKIE)
            .map(|c| c.value().to_string());

        let Some(token) = token else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let db = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool,
            None => {
                tracing::error!("Database pool not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        let session = match get_session_by_token(db, &token).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = ?err, "Invalid session token");
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        if !session.is_valid() {
            tracing::warn!(user_id = %session.user_id, "Session token expired");
            return Outcome::Error((Status::Unauthorized, ()));
        }

        match get_user(db, session.user_id).await {
            Ok(user) => {
                tracing::info!(email = %user.email, role = %user.role.as_str(), "User authenticated via session token");
                Outcome::Success(user)
            }
            Err(err) => {
                tracing::error!(user_id = %session.user_id, error = ?err, "Failed to fetch user for valid session");
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::BadRequest.to_validation_response()
}

#[catch(401)]
pub fn unauthorized(req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!(uri = %req.uri(), "Unauthorized access attempt");
    Status::Unauthorized.to_validation_response()
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!(uri = %req.uri(), "Forbidden access attempt");
    Status::Forbidden.to_validation_response()
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::NotFound.to_validation_response()
}

#[catch(409)]
pub fn conflict(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::Conflict.to_validation_response()
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::UnprocessableEntity.to_validation_response()
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::InternalServerError.to_validation_response()
}
