use chrono::{Days, NaiveDate, NaiveTime, Utc};
use rocket::FromForm;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, Role, SESSION_COOKIE, User, UserSession};
use crate::booking::is_in_past;
use crate::chat::schedule_scripted_reply;
use crate::db::{
    assign_exercises, authenticate_user, create_appointment, create_message, create_progress_log,
    create_therapist, create_user, create_user_session, get_appointment,
    get_appointments_for_therapist, get_appointments_for_user, get_assigned_exercises,
    get_exercises, get_messages, get_patients_for_therapist, get_progress_logs,
    get_sessions_between, get_therapist, get_therapist_for_user, get_therapists, get_user,
    invalidate_session, unassign_exercise, update_appointment_status,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{
    Appointment, AppointmentStatus, AssignedExercise, Exercise, InjuryArea, Message,
    NewAppointment, PatientOverview, ProgressLog, Session, Therapist, parse_appointment_date,
};
use crate::progress::{ProgressSummary, summarize};
use crate::validation::{ApiError, AppErrorExt, JsonValidateExt, ToValidationResponse};

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role.to_string(),
        }
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[derive(Deserialize, Validate)]
pub struct RegistrationRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    #[validate(email(message = "Invalid email address"))]
    email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
}

#[post("/register", data = "<registration>")]
pub async fn api_register(
    registration: Json<RegistrationRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<(Status, Json<UserData>), ApiError> {
    let validated = registration.validate_custom()?;

    if validated.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()).to_validation_response());
    }

    let user_id = create_user(
        db,
        &validated.name,
        &validated.email,
        &validated.password,
        Role::Patient,
    )
    .await
    .validate_custom()?;

    let user = get_user(db, user_id).await.validate_custom()?;

    Ok((Status::Created, Json(UserData::from(user))))
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.email, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + config.session_duration();

            create_user_session(db, user.id, &token, expires_at)
                .await
                .validate_custom()?;

            cookies.add_private(
                Cookie::build((SESSION_COOKIE, token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(config.session_hours.max(1))),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid email or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Status {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(e) = invalidate_session(db, &token).await {
            e.log_and_record("Logout");
        }
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Status::NoContent
}

#[get("/profile")]
pub async fn api_profile(user: User) -> Result<Json<UserData>, AppError> {
    user.require_permission(Permission::ViewOwnProfile)?;
    Ok(Json(UserData::from(user)))
}

#[get("/injury-areas")]
pub fn api_injury_areas() -> Json<Vec<InjuryArea>> {
    Json(InjuryArea::ALL.to_vec())
}

#[get("/trainers?<specialty>")]
pub async fn api_get_trainers(
    specialty: Option<String>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Therapist>>, AppError> {
    let therapists = get_therapists(db, specialty.as_deref()).await?;
    Ok(Json(therapists))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTherapistRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    #[validate(length(min = 1, message = "Specialty is required"))]
    specialty: String,
    #[validate(range(min = 0, max = 5, message = "Rating must be between 0 and 5"))]
    rating: i64,
    image: Option<String>,
    user_id: Option<i64>,
}

#[post("/trainers", data = "<request>")]
pub async fn api_create_trainer(
    request: Json<CreateTherapistRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<(Status, Json<Therapist>), ApiError> {
    user.require_permission(Permission::ManageTherapists)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let id = create_therapist(
        db,
        &validated.name,
        &validated.specialty,
        validated.rating,
        validated.image.as_deref(),
        validated.user_id,
    )
    .await
    .validate_custom()?;

    let therapist = get_therapist(db, id).await.validate_custom()?;
    Ok((Status::Created, Json(therapist)))
}

/// Reads an optional numeric id from the query string. Rocket turns an
/// unparseable `Option<i64>` into `None`, so the raw text is parsed here.
fn parse_id_param(name: &str, raw: Option<&str>) -> Result<Option<i64>, AppError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::Validation(format!("Invalid {}: {}", name, value)))
    })
    .transpose()
}

#[derive(FromForm)]
pub struct AppointmentsQuery {
    #[field(name = "userId")]
    user_id: Option<String>,
}

#[get("/appointments?<query..>")]
pub async fn api_get_appointments(
    query: AppointmentsQuery,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let appointments = match parse_id_param("userId", query.user_id.as_deref())? {
        Some(user_id) if user_id != user.id => {
            user.require_permission(Permission::ViewPatients)?;
            get_appointments_for_user(db, user_id).await?
        }
        _ if user.has_permission(Permission::ViewOwnAppointments) => {
            get_appointments_for_user(db, user.id).await?
        }
        _ => {
            user.require_permission(Permission::ViewSessions)?;
            let therapist = get_therapist_for_user(db, user.id).await?;
            get_appointments_for_therapist(db, therapist.id).await?
        }
    };

    Ok(Json(appointments))
}

#[post("/appointments", data = "<request>")]
pub async fn api_create_appointment(
    request: Json<NewAppointment>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<(Status, Json<Appointment>), AppError> {
    user.require_permission(Permission::BookAppointments)?;

    let appointment = request.into_inner();
    if is_in_past(appointment.date, Utc::now()) {
        return Err(AppError::Validation(format!(
            "Appointment date {} is in the past",
            appointment.date.to_rfc3339()
        )));
    }

    let created = create_appointment(db, user.id, &appointment).await?;
    Ok((Status::Created, Json(created)))
}

#[post("/appointments/<id>/cancel")]
pub async fn api_cancel_appointment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = get_appointment(db, id).await?;
    user.require_self_or(appointment.user_id, Permission::ManageTherapists)?;

    if appointment.status != AppointmentStatus::Scheduled {
        return Err(AppError::Validation(
            "Only scheduled appointments can be cancelled".to_string(),
        ));
    }

    let updated = update_appointment_status(db, id, AppointmentStatus::Cancelled).await?;
    Ok(Json(updated))
}

#[post("/appointments/<id>/complete")]
pub async fn api_complete_appointment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Appointment>, AppError> {
    user.require_permission(Permission::CompleteAppointments)?;
    let appointment = get_appointment(db, id).await?;

    let is_own_session = appointment.therapist.user_id == Some(user.id);
    if !is_own_session && !user.has_permission(Permission::ManageTherapists) {
        return Err(AppError::Authorization(
            "Only the appointment's therapist can complete it".to_string(),
        ));
    }

    if appointment.status != AppointmentStatus::Scheduled {
        return Err(AppError::Validation(
            "Only scheduled appointments can be completed".to_string(),
        ));
    }

    let updated = update_appointment_status(db, id, AppointmentStatus::Completed).await?;
    Ok(Json(updated))
}

#[get("/progress")]
pub async fn api_get_own_progress(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProgressLog>>, AppError> {
    Ok(Json(get_progress_logs(db, user.id).await?))
}

#[get("/progress/summary")]
pub async fn api_get_own_progress_summary(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ProgressSummary>, AppError> {
    let logs = get_progress_logs(db, user.id).await?;
    Ok(Json(summarize(&logs)))
}

#[get("/progress/<user_id>")]
pub async fn api_get_progress(
    user_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProgressLog>>, AppError> {
    user.require_self_or(user_id, Permission::ViewPatients)?;
    get_user(db, user_id).await?;
    Ok(Json(get_progress_logs(db, user_id).await?))
}

#[get("/progress/<user_id>/summary")]
pub async fn api_get_progress_summary(
    user_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ProgressSummary>, AppError> {
    user.require_self_or(user_id, Permission::ViewPatients)?;
    get_user(db, user_id).await?;
    let logs = get_progress_logs(db, user_id).await?;
    Ok(Json(summarize(&logs)))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    user_id: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Pain level must be between 0 and 10"))]
    pain_level: i64,
    #[validate(range(min = 0, max = 10, message = "Mobility must be between 0 and 10"))]
    mobility: i64,
    #[validate(length(max = 2000, message = "Notes are too long"))]
    notes: Option<String>,
    date: Option<String>,
}

#[post("/progress", data = "<request>")]
pub async fn api_create_progress(
    request: Json<ProgressRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<(Status, Json<ProgressLog>), ApiError> {
    user.require_permission(Permission::LogProgress)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    if validated.user_id.is_some_and(|id| id != user.id) {
        return Err(
            AppError::Authorization("Progress can only be logged for yourself".to_string())
                .to_validation_response(),
        );
    }

    let date = match validated.date.as_deref() {
        Some(raw) => parse_appointment_date(raw).validate_custom()?,
        None => Utc::now(),
    };

    let log = create_progress_log(
        db,
        user.id,
        date,
        validated.pain_level,
        validated.mobility,
        validated.notes.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok((Status::Created, Json(log)))
}

#[derive(Deserialize)]
pub struct MessageRequest {
    content: String,
}

fn require_content(request: &MessageRequest) -> Result<&str, AppError> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation(
            "Message content cannot be empty".to_string(),
        ));
    }
    Ok(content)
}

#[get("/messages?<after>")]
pub async fn api_get_messages(
    after: Option<String>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Message>>, AppError> {
    let after = parse_id_param("after", after.as_deref())?;
    Ok(Json(get_messages(db, user.id, after).await?))
}

#[post("/messages", data = "<request>")]
pub async fn api_send_message(
    request: Json<MessageRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<(Status, Json<Message>), AppError> {
    user.require_permission(Permission::SendMessages)?;
    let content = require_content(&request)?;

    let message = create_message(db, user.id, content, true).await?;

    if config.chat_auto_reply {
        schedule_scripted_reply(db.inner().clone(), user.id, config.chat_reply_delay());
    }

    Ok((Status::Created, Json(message)))
}

async fn require_patient(db: &Pool<Sqlite>, user_id: i64) -> Result<User, AppError> {
    let patient = get_user(db, user_id).await?;
    if patient.role != Role::Patient {
        return Err(AppError::Validation(format!(
            "User {} is not a patient",
            user_id
        )));
    }
    Ok(patient)
}

#[get("/patients/<user_id>/messages?<after>")]
pub async fn api_get_patient_messages(
    user_id: i64,
    after: Option<String>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Message>>, AppError> {
    user.require_permission(Permission::ReplyToPatients)?;
    let after = parse_id_param("after", after.as_deref())?;
    require_patient(db, user_id).await?;
    Ok(Json(get_messages(db, user_id, after).await?))
}

#[post("/patients/<user_id>/messages", data = "<request>")]
pub async fn api_reply_to_patient(
    user_id: i64,
    request: Json<MessageRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<(Status, Json<Message>), AppError> {
    user.require_permission(Permission::ReplyToPatients)?;
    let content = require_content(&request)?;
    require_patient(db, user_id).await?;

    let message = create_message(db, user_id, content, false).await?;
    Ok((Status::Created, Json(message)))
}

#[get("/exercises?<area>")]
pub async fn api_get_exercises(
    area: Option<String>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Exercise>>, AppError> {
    let area = area.map(|a| a.parse::<InjuryArea>()).transpose()?;

    let exercises = get_exercises(db)
        .await?
        .into_iter()
        .filter(|exercise| area.is_none_or(|a| exercise.targets(a)))
        .collect();

    Ok(Json(exercises))
}

#[get("/exercises/assigned")]
pub async fn api_get_assigned_exercises(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<AssignedExercise>>, AppError> {
    user.require_permission(Permission::ViewOwnExercises)?;
    Ok(Json(get_assigned_exercises(db, user.id).await?))
}

#[get("/patients/<user_id>/exercises")]
pub async fn api_get_patient_exercises(
    user_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<AssignedExercise>>, AppError> {
    user.require_permission(Permission::ViewPatients)?;
    require_patient(db, user_id).await?;
    Ok(Json(get_assigned_exercises(db, user_id).await?))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignExercisesRequest {
    #[validate(length(min = 1, message = "At least one exercise is required"))]
    exercise_ids: Vec<i64>,
}

#[post("/patients/<user_id>/exercises", data = "<request>")]
pub async fn api_assign_exercises(
    user_id: i64,
    request: Json<AssignExercisesRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<AssignedExercise>>, ApiError> {
    user.require_permission(Permission::AssignExercises)
        .validate_custom()?;
    let validated = request.validate_custom()?;
    require_patient(db, user_id).await.validate_custom()?;

    assign_exercises(db, user_id, &validated.exercise_ids, user.id)
        .await
        .validate_custom()?;

    let assigned = get_assigned_exercises(db, user_id)
        .await
        .validate_custom()?;
    Ok(Json(assigned))
}

#[delete("/patients/<user_id>/exercises/<exercise_id>")]
pub async fn api_unassign_exercise(
    user_id: i64,
    exercise_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    user.require_permission(Permission::AssignExercises)?;
    unassign_exercise(db, user_id, exercise_id).await?;
    Ok(Status::NoContent)
}

#[get("/dashboard/sessions?<date>")]
pub async fn api_dashboard_sessions(
    date: Option<String>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Session>>, AppError> {
    user.require_permission(Permission::ViewSessions)?;
    let therapist = get_therapist_for_user(db, user.id).await?;

    let day = match date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::Validation(format!("Invalid date: {}", raw)))?,
        None => Utc::now().date_naive(),
    };

    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = start
        .checked_add_days(Days::new(1))
        .ok_or_else(|| AppError::Validation(format!("Date out of range: {}", day)))?;

    Ok(Json(get_sessions_between(db, therapist.id, start, end).await?))
}

#[get("/dashboard/patients")]
pub async fn api_dashboard_patients(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<PatientOverview>>, AppError> {
    user.require_permission(Permission::ViewPatients)?;
    let therapist = get_therapist_for_user(db, user.id).await?;

    Ok(Json(
        get_patients_for_therapist(db, therapist.id, Utc::now()).await?,
    ))
}
