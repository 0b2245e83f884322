#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod booking;
mod chat;
mod db;
mod env;
mod error;
mod models;
mod progress;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_assign_exercises, api_cancel_appointment, api_complete_appointment,
    api_create_appointment, api_create_progress, api_create_trainer, api_dashboard_patients,
    api_dashboard_sessions, api_get_appointments, api_get_assigned_exercises, api_get_exercises,
    api_get_messages, api_get_own_progress, api_get_own_progress_summary,
    api_get_patient_exercises, api_get_patient_messages, api_get_progress,
    api_get_progress_summary, api_get_trainers, api_injury_areas, api_login, api_logout,
    api_profile, api_register, api_reply_to_patient, api_send_message, api_unassign_exercise,
    health,
};
use auth::{
    bad_request, conflict, forbidden, internal_error, not_found, unauthorized, unprocessable,
};
use db::clean_expired_sessions;
use env::{AppConfig, database_url, load_environment};
use error::AppError;
use anyhow::Context;
use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use rocket::{Build, Rocket, tokio};
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;

use sqlx::SqlitePool;
use tracing::{error, info};

const SESSION_CLEANUP_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("{0}")]
    Rocket(#[from] Box<rocket::Error>),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let env_report = load_environment().context("Failed to load environment")?;

    let _telemetry = init_tracing();
    env_report.log();

    let pool = SqlitePool::connect(&database_url()).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;
    info!("Migrations completed successfully");

    spawn_session_cleanup(pool.clone());

    init_rocket(pool).launch().await.map_err(Box::new)?;

    Ok(())
}

fn spawn_session_cleanup(pool: SqlitePool) {
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(
                SESSION_CLEANUP_INTERVAL_SECS,
            ))
            .await;
        }
    });
}

pub fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    init_rocket_with(rocket::Config::figment(), pool)
}

pub fn init_rocket_with(figment: Figment, pool: SqlitePool) -> Rocket<Build> {
    info!("Starting physio tracker");

    rocket::custom(figment)
        .manage(pool)
        .attach(AdHoc::config::<AppConfig>())
        .mount(
            "/api",
            routes![
                health,
                api_register,
                api_login,
                api_logout,
                api_profile,
                api_injury_areas,
                api_get_trainers,
                api_create_trainer,
                api_get_appointments,
                api_create_appointment,
                api_cancel_appointment,
                api_complete_appointment,
                api_get_own_progress,
                api_get_own_progress_summary,
                api_get_progress,
                api_get_progress_summary,
                api_create_progress,
                api_get_messages,
                api_send_message,
                api_get_patient_messages,
                api_reply_to_patient,
                api_get_exercises,
                api_get_assigned_exercises,
                api_get_patient_exercises,
                api_assign_exercises,
                api_unassign_exercise,
                api_dashboard_sessions,
                api_dashboard_patients,
            ],
        )
        .register(
            "/api",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                conflict,
                unprocessable,
                internal_error
            ],
        )
        .attach(TelemetryFairing)
}
