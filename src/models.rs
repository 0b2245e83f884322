use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Body region a patient reports pain in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjuryArea {
    Neck,
    Shoulder,
    Back,
    Knee,
}

impl InjuryArea {
    pub const ALL: [InjuryArea; 4] = [
        InjuryArea::Neck,
        InjuryArea::Shoulder,
        InjuryArea::Back,
        InjuryArea::Knee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InjuryArea::Neck => "neck",
            InjuryArea::Shoulder => "shoulder",
            InjuryArea::Back => "back",
            InjuryArea::Knee => "knee",
        }
    }
}

impl FromStr for InjuryArea {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InjuryArea::ALL
            .into_iter()
            .find(|area| area.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| AppError::Validation(format!("Unknown injury area: {}", s)))
    }
}

impl fmt::Display for InjuryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            _ => Err(AppError::Internal(format!("Unknown appointment status: {}", s))),
        }
    }
}

/// Accepts either a full RFC 3339 timestamp or a bare `YYYY-MM-DD`, which
/// is read as midnight UTC.
pub fn parse_appointment_date(raw: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| AppError::Validation(format!("Invalid date: {}", raw)))
}

pub fn deserialize_flexible_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_appointment_date(&raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Therapist {
    pub id: i64,
    pub name: String,
    pub specialty: String,
    pub rating: i64,
    pub image: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTherapist {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub rating: Option<i64>,
    pub image: Option<String>,
    pub user_id: Option<i64>,
}

impl From<DbTherapist> for Therapist {
    fn from(db: DbTherapist) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            specialty: db.specialty.unwrap_or_default(),
            rating: db.rating.unwrap_or_default(),
            image: db.image,
            user_id: db.user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub therapist_id: i64,
    pub date: DateTime<Utc>,
    pub area: InjuryArea,
    pub status: AppointmentStatus,
    pub therapist: Therapist,
}

/// Appointment row joined with its therapist (`t_` prefixed columns).
#[derive(sqlx::FromRow, Clone)]
pub struct DbAppointment {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub therapist_id: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    pub area: Option<String>,
    pub status: Option<String>,
    pub t_name: Option<String>,
    pub t_specialty: Option<String>,
    pub t_rating: Option<i64>,
    pub t_image: Option<String>,
    pub t_user_id: Option<i64>,
}

impl TryFrom<DbAppointment> for Appointment {
    type Error = AppError;

    fn try_from(db: DbAppointment) -> Result<Self, Self::Error> {
        let therapist_id = db.therapist_id.unwrap_or_default();
        Ok(Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            therapist_id,
            date: db
                .date
                .ok_or_else(|| AppError::Internal("Appointment without date".to_string()))?,
            area: db.area.unwrap_or_default().parse()?,
            status: AppointmentStatus::parse(&db.status.unwrap_or_default())?,
            therapist: Therapist {
                id: therapist_id,
                name: db.t_name.unwrap_or_default(),
                specialty: db.t_specialty.unwrap_or_default(),
                rating: db.t_rating.unwrap_or_default(),
                image: db.t_image,
                user_id: db.t_user_id,
            },
        })
    }
}

/// The payload the booking workflow submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub area: InjuryArea,
    pub therapist_id: i64,
    #[serde(deserialize_with = "deserialize_flexible_date")]
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressLog {
    pub id: i64,
    pub user_id: i64,
    pub date: DateTime<Utc>,
    pub pain_level: i64,
    pub mobility: i64,
    pub notes: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbProgressLog {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    pub pain_level: Option<i64>,
    pub mobility: Option<i64>,
    pub notes: Option<String>,
}

impl From<DbProgressLog> for ProgressLog {
    fn from(db: DbProgressLog) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            date: db.date.unwrap_or_else(Utc::now),
            pain_level: db.pain_level.unwrap_or_default(),
            mobility: db.mobility.unwrap_or_default(),
            notes: db.notes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_user: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbMessage {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub content: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub is_user: Option<bool>,
}

impl From<DbMessage> for Message {
    fn from(db: DbMessage) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            content: db.content.unwrap_or_default(),
            created_at: db.created_at.unwrap_or_else(Utc::now),
            is_user: db.is_user.unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub duration_minutes: i64,
    pub sets: i64,
    pub reps: i64,
    pub difficulty: String,
    pub description: String,
    pub instructions: Vec<String>,
    pub muscles: Vec<InjuryArea>,
}

impl Exercise {
    pub fn targets(&self, area: InjuryArea) -> bool {
        self.muscles.contains(&area)
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbExercise {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub duration_minutes: Option<i64>,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub difficulty: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub muscles: Option<String>,
}

impl From<DbExercise> for Exercise {
    fn from(db: DbExercise) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            category: db.category.unwrap_or_default(),
            duration_minutes: db.duration_minutes.unwrap_or_default(),
            sets: db.sets.unwrap_or_default(),
            reps: db.reps.unwrap_or_default(),
            difficulty: db.difficulty.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            instructions: db
                .instructions
                .unwrap_or_default()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            // Unknown muscle names are dropped rather than failing the catalog.
            muscles: db
                .muscles
                .unwrap_or_default()
                .split(',')
                .filter_map(|m| m.parse().ok())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedExercise {
    pub assignment_id: i64,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: i64,
    pub exercise: Exercise,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAssignedExercise {
    pub assignment_id: Option<i64>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_by: Option<i64>,
    #[sqlx(flatten)]
    pub exercise: DbExercise,
}

impl From<DbAssignedExercise> for AssignedExercise {
    fn from(db: DbAssignedExercise) -> Self {
        Self {
            assignment_id: db.assignment_id.unwrap_or_default(),
            assigned_at: db.assigned_at.unwrap_or_else(Utc::now),
            assigned_by: db.assigned_by.unwrap_or_default(),
            exercise: Exercise::from(db.exercise),
        }
    }
}

/// One row of the consultant's day view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub date: DateTime<Utc>,
    pub area: InjuryArea,
    pub status: AppointmentStatus,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSession {
    pub appointment_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub patient_name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub area: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<DbSession> for Session {
    type Error = AppError;

    fn try_from(db: DbSession) -> Result<Self, Self::Error> {
        Ok(Self {
            appointment_id: db.appointment_id.unwrap_or_default(),
            patient_id: db.patient_id.unwrap_or_default(),
            patient_name: db.patient_name.unwrap_or_default(),
            date: db
                .date
                .ok_or_else(|| AppError::Internal("Session without date".to_string()))?,
            area: db.area.unwrap_or_default().parse()?,
            status: AppointmentStatus::parse(&db.status.unwrap_or_default())?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientOverview {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub next_session: Option<DateTime<Utc>>,
    pub latest_pain_level: Option<i64>,
    pub latest_mobility: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPatientOverview {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub next_session: Option<DateTime<Utc>>,
    pub latest_pain_level: Option<i64>,
    pub latest_mobility: Option<i64>,
}

impl From<DbPatientOverview> for PatientOverview {
    fn from(db: DbPatientOverview) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            next_session: db.next_session,
            latest_pain_level: db.latest_pain_level,
            latest_mobility: db.latest_mobility,
        }
    }
}
