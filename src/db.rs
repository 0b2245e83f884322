use crate::{
    auth::{DbUser, DbUserSession, Role, User, UserSession},
    error::{AppError, map_constraint_error},
    models::{
        Appointment, AppointmentStatus, AssignedExercise, DbAppointment, DbAssignedExercise,
        DbExercise, DbMessage, DbPatientOverview, DbProgressLog, DbSession, DbTherapist, Exercise,
        Message, NewAppointment, PatientOverview, ProgressLog, Session, Therapist,
    },
};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

#[cfg(not(test))]
fn password_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

// bcrypt's lowest accepted cost; keeps test hashing fast.
#[cfg(test)]
const TEST_PASSWORD_COST: u32 = 4;

#[cfg(test)]
fn password_cost() -> u32 {
    TEST_PASSWORD_COST
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>("SELECT id, name, email, role FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => User::try_from(user),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_email(pool: &Pool<Sqlite>, email: &str) -> Result<Option<User>, AppError> {
    info!("Finding user by email");
    let row =
        sqlx::query_as::<_, DbUser>("SELECT id, name, email, role FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await?;

    row.map(User::try_from).transpose()
}

#[instrument(skip_all, fields(email, role = %role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<i64, AppError> {
    info!("Creating new user");
    let email = normalize_email(email);

    if find_user_by_email(pool, &email).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Email '{}' is already registered",
            email
        )));
    }

    let hashed_password = bcrypt::hash(password, password_cost())?;

    let res = sqlx::query("INSERT INTO users (name, email, password, role) VALUES (?, ?, ?, ?)")
        .bind(name.trim())
        .bind(&email)
        .bind(hashed_password)
        .bind(role.as_str())
        .execute(pool)
        .await
        .map_err(|e| map_constraint_error(e, "Email is already registered"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    #[derive(sqlx::FromRow)]
    struct Credentials {
        id: i64,
        password: String,
    }

    let credentials =
        sqlx::query_as::<_, Credentials>("SELECT id, password FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await?;

    match credentials {
        Some(credentials) => match bcrypt::verify(password, &credentials.password) {
            Ok(true) => Ok(Some(get_user(pool, credentials.id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query(
        "INSERT INTO user_sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token)
    .bind(Utc::now())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(pool: &Pool<Sqlite>, token: &str) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument]
pub async fn get_therapists(
    pool: &Pool<Sqlite>,
    specialty: Option<&str>,
) -> Result<Vec<Therapist>, AppError> {
    info!("Getting therapists");

    let rows = match specialty {
        Some(specialty) => {
            sqlx::query_as::<_, DbTherapist>(
                "SELECT id, name, specialty, rating, image, user_id FROM therapists
                 WHERE lower(specialty) = lower(?)
                 ORDER BY rating DESC, name",
            )
            .bind(specialty)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DbTherapist>(
                "SELECT id, name, specialty, rating, image, user_id FROM therapists
                 ORDER BY rating DESC, name",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(Therapist::from).collect())
}

#[instrument]
pub async fn get_therapist(pool: &Pool<Sqlite>, id: i64) -> Result<Therapist, AppError> {
    info!("Getting therapist");
    let row = sqlx::query_as::<_, DbTherapist>(
        "SELECT id, name, specialty, rating, image, user_id FROM therapists WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Therapist::from)
        .ok_or_else(|| AppError::NotFound(format!("Therapist with id {} not found", id)))
}

/// The trainer profile linked to a therapist account.
#[instrument]
pub async fn get_therapist_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Therapist, AppError> {
    info!("Getting therapist profile for user");
    let row = sqlx::query_as::<_, DbTherapist>(
        "SELECT id, name, specialty, rating, image, user_id FROM therapists WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(Therapist::from).ok_or_else(|| {
        AppError::NotFound(format!("No therapist profile linked to user {}", user_id))
    })
}

#[instrument]
pub async fn create_therapist(
    pool: &Pool<Sqlite>,
    name: &str,
    specialty: &str,
    rating: i64,
    image: Option<&str>,
    user_id: Option<i64>,
) -> Result<i64, AppError> {
    info!("Creating therapist");

    if let Some(user_id) = user_id {
        let user = get_user(pool, user_id).await?;
        if user.role != Role::Therapist {
            return Err(AppError::Validation(format!(
                "User {} is not a therapist account",
                user_id
            )));
        }
    }

    let res = sqlx::query(
        "INSERT INTO therapists (name, specialty, rating, image, user_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(specialty)
    .bind(rating)
    .bind(image)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| map_constraint_error(e, "User already has a therapist profile"))?;

    Ok(res.last_insert_rowid())
}

const APPOINTMENT_SELECT: &str = "SELECT a.id, a.user_id, a.therapist_id, a.date, a.area, a.status,
        t.name AS t_name, t.specialty AS t_specialty, t.rating AS t_rating,
        t.image AS t_image, t.user_id AS t_user_id
     FROM appointments a
     JOIN therapists t ON t.id = a.therapist_id";

#[instrument]
pub async fn get_appointment(pool: &Pool<Sqlite>, id: i64) -> Result<Appointment, AppError> {
    info!("Getting appointment");
    let row = sqlx::query_as::<_, DbAppointment>(&format!("{} WHERE a.id = ?", APPOINTMENT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Appointment::try_from(row),
        None => Err(AppError::NotFound(format!(
            "Appointment with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn get_appointments_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<Appointment>, AppError> {
    info!("Getting appointments for user");
    let rows = sqlx::query_as::<_, DbAppointment>(&format!(
        "{} WHERE a.user_id = ? ORDER BY a.date, a.id",
        APPOINTMENT_SELECT
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Appointment::try_from).collect()
}

#[instrument]
pub async fn get_appointments_for_therapist(
    pool: &Pool<Sqlite>,
    therapist_id: i64,
) -> Result<Vec<Appointment>, AppError> {
    info!("Getting appointments for therapist");
    let rows = sqlx::query_as::<_, DbAppointment>(&format!(
        "{} WHERE a.therapist_id = ? ORDER BY a.date, a.id",
        APPOINTMENT_SELECT
    ))
    .bind(therapist_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Appointment::try_from).collect()
}

#[instrument]
pub async fn create_appointment(
    pool: &Pool<Sqlite>,
    user_id: i64,
    appointment: &NewAppointment,
) -> Result<Appointment, AppError> {
    info!("Creating appointment");

    // Surface a missing therapist as 404 rather than a foreign key failure.
    get_therapist(pool, appointment.therapist_id).await?;

    let res = sqlx::query(
        "INSERT INTO appointments (user_id, therapist_id, date, area, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(appointment.therapist_id)
    .bind(appointment.date)
    .bind(appointment.area.as_str())
    .bind(AppointmentStatus::Scheduled.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|e| {
        map_constraint_error(e, "An identical appointment is already scheduled")
    })?;

    get_appointment(pool, res.last_insert_rowid()).await
}

#[instrument]
pub async fn update_appointment_status(
    pool: &Pool<Sqlite>,
    id: i64,
    status: AppointmentStatus,
) -> Result<Appointment, AppError> {
    info!(status = status.as_str(), "Updating appointment status");

    let res = sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Appointment with id {} not found",
            id
        )));
    }

    get_appointment(pool, id).await
}

#[instrument]
pub async fn get_sessions_between(
    pool: &Pool<Sqlite>,
    therapist_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Session>, AppError> {
    info!("Getting therapist sessions");
    let rows = sqlx::query_as::<_, DbSession>(
        "SELECT a.id AS appointment_id, a.user_id AS patient_id, u.name AS patient_name,
                a.date, a.area, a.status
         FROM appointments a
         JOIN users u ON u.id = a.user_id
         WHERE a.therapist_id = ? AND a.date >= ? AND a.date < ? AND a.status != 'cancelled'
         ORDER BY a.date, a.id",
    )
    .bind(therapist_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Session::try_from).collect()
}

#[instrument]
pub async fn get_patients_for_therapist(
    pool: &Pool<Sqlite>,
    therapist_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<PatientOverview>, AppError> {
    info!("Getting patients for therapist");
    let rows = sqlx::query_as::<_, DbPatientOverview>(
        "SELECT u.id, u.name, u.email,
            (SELECT MIN(a.date) FROM appointments a
              WHERE a.user_id = u.id AND a.therapist_id = ?
                AND a.status = 'scheduled' AND a.date >= ?) AS next_session,
            (SELECT p.pain_level FROM progress p
              WHERE p.user_id = u.id ORDER BY p.date DESC, p.id DESC LIMIT 1) AS latest_pain_level,
            (SELECT p.mobility FROM progress p
              WHERE p.user_id = u.id ORDER BY p.date DESC, p.id DESC LIMIT 1) AS latest_mobility
         FROM users u
         WHERE u.id IN (SELECT user_id FROM appointments WHERE therapist_id = ?)
         ORDER BY u.name, u.id",
    )
    .bind(therapist_id)
    .bind(now)
    .bind(therapist_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PatientOverview::from).collect())
}

#[instrument]
pub async fn create_progress_log(
    pool: &Pool<Sqlite>,
    user_id: i64,
    date: DateTime<Utc>,
    pain_level: i64,
    mobility: i64,
    notes: Option<&str>,
) -> Result<ProgressLog, AppError> {
    info!("Creating progress log");
    let row = sqlx::query_as::<_, DbProgressLog>(
        "INSERT INTO progress (user_id, date, pain_level, mobility, notes)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id, user_id, date, pain_level, mobility, notes",
    )
    .bind(user_id)
    .bind(date)
    .bind(pain_level)
    .bind(mobility)
    .bind(notes)
    .fetch_one(pool)
    .await
    .map_err(|e| map_constraint_error(e, "Duplicate progress entry"))?;

    Ok(ProgressLog::from(row))
}

#[instrument]
pub async fn get_progress_logs(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<ProgressLog>, AppError> {
    info!("Getting progress logs");
    let rows = sqlx::query_as::<_, DbProgressLog>(
        "SELECT id, user_id, date, pain_level, mobility, notes FROM progress
         WHERE user_id = ?
         ORDER BY date ASC, id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ProgressLog::from).collect())
}

#[instrument(skip(content))]
pub async fn create_message(
    pool: &Pool<Sqlite>,
    user_id: i64,
    content: &str,
    is_user: bool,
) -> Result<Message, AppError> {
    info!("Creating message");
    let row = sqlx::query_as::<_, DbMessage>(
        "INSERT INTO messages (user_id, content, created_at, is_user)
         VALUES (?, ?, ?, ?)
         RETURNING id, user_id, content, created_at, is_user",
    )
    .bind(user_id)
    .bind(content)
    .bind(Utc::now())
    .bind(is_user)
    .fetch_one(pool)
    .await?;

    Ok(Message::from(row))
}

#[instrument]
pub async fn get_messages(
    pool: &Pool<Sqlite>,
    user_id: i64,
    after: Option<i64>,
) -> Result<Vec<Message>, AppError> {
    info!("Getting messages");
    let rows = sqlx::query_as::<_, DbMessage>(
        "SELECT id, user_id, content, created_at, is_user FROM messages
         WHERE user_id = ? AND id > ?
         ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .bind(after.unwrap_or(0))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Message::from).collect())
}

#[instrument]
pub async fn get_exercises(pool: &Pool<Sqlite>) -> Result<Vec<Exercise>, AppError> {
    info!("Getting exercise catalog");
    let rows = sqlx::query_as::<_, DbExercise>("SELECT * FROM exercises ORDER BY category, name")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Exercise::from).collect())
}

#[instrument]
pub async fn get_exercise(pool: &Pool<Sqlite>, id: i64) -> Result<Exercise, AppError> {
    info!("Getting exercise");
    let row = sqlx::query_as::<_, DbExercise>("SELECT * FROM exercises WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Exercise::from)
        .ok_or_else(|| AppError::NotFound(format!("Exercise with id {} not found", id)))
}

/// Assigning an exercise the patient already has returns the existing
/// assignment.
#[instrument]
pub async fn assign_exercise(
    pool: &Pool<Sqlite>,
    user_id: i64,
    exercise_id: i64,
    assigned_by: i64,
) -> Result<i64, AppError> {
    info!("Assigning exercise to patient");

    get_exercise(pool, exercise_id).await?;

    sqlx::query(
        "INSERT OR IGNORE INTO exercise_assignments (user_id, exercise_id, assigned_by, assigned_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(exercise_id)
    .bind(assigned_by)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar(
        "SELECT id FROM exercise_assignments WHERE user_id = ? AND exercise_id = ?",
    )
    .bind(user_id)
    .bind(exercise_id)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

#[instrument]
pub async fn assign_exercises(
    pool: &Pool<Sqlite>,
    user_id: i64,
    exercise_ids: &[i64],
    assigned_by: i64,
) -> Result<(), AppError> {
    info!("Assigning exercises to patient");
    for exercise_id in exercise_ids {
        assign_exercise(pool, user_id, *exercise_id, assigned_by).await?;
    }

    Ok(())
}

#[instrument]
pub async fn unassign_exercise(
    pool: &Pool<Sqlite>,
    user_id: i64,
    exercise_id: i64,
) -> Result<(), AppError> {
    info!("Removing exercise assignment");
    let res = sqlx::query("DELETE FROM exercise_assignments WHERE user_id = ? AND exercise_id = ?")
        .bind(user_id)
        .bind(exercise_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Exercise {} is not assigned to user {}",
            exercise_id, user_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn get_assigned_exercises(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<AssignedExercise>, AppError> {
    info!("Getting assigned exercises");
    let rows = sqlx::query_as::<_, DbAssignedExercise>(
        "SELECT ea.id AS assignment_id, ea.assigned_at, ea.assigned_by,
                e.id, e.name, e.category, e.duration_minutes, e.sets, e.reps,
                e.difficulty, e.description, e.instructions, e.muscles
         FROM exercise_assignments ea
         JOIN exercises e ON e.id = ea.exercise_id
         WHERE ea.user_id = ?
         ORDER BY ea.assigned_at, ea.id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AssignedExercise::from).collect())
}
