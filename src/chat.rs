use std::time::Duration;

use sqlx::{Pool, Sqlite};
use tracing::{error, info, instrument};

use crate::db::{create_message, get_assigned_exercises};
use crate::error::AppError;
use crate::models::{AssignedExercise, Message};

pub const TRAINER_GREETING: &str = "Thanks for your message. Your trainer will get back to you shortly.";

/// Builds the scripted trainer reply, listing the patient's current
/// exercise plan when there is one.
pub fn scripted_reply(assigned: &[AssignedExercise]) -> String {
    if assigned.is_empty() {
        return TRAINER_GREETING.to_string();
    }

    let plan = assigned
        .iter()
        .map(|a| {
            format!(
                "- {}: {} x {}",
                a.exercise.name, a.exercise.sets, a.exercise.reps
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\nYour current exercises:\n{}", TRAINER_GREETING, plan)
}

#[instrument(skip(pool))]
pub async fn post_scripted_reply(pool: &Pool<Sqlite>, user_id: i64) -> Result<Message, AppError> {
    let assigned = get_assigned_exercises(pool, user_id).await?;
    create_message(pool, user_id, &scripted_reply(&assigned), false).await
}

/// Posts the scripted reply in the background after `delay`.
pub fn schedule_scripted_reply(pool: Pool<Sqlite>, user_id: i64, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        match post_scripted_reply(&pool, user_id).await {
            Ok(message) => info!(user_id, message_id = message.id, "Posted scripted trainer reply"),
            Err(e) => error!(user_id, error = %e, "Failed to post scripted trainer reply"),
        }
    });
}
