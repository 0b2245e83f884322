//! The patient-side booking workflow as a plain value.
//!
//! The wizard accumulates an injury area, a therapist and a date across
//! three guarded steps and yields exactly one [`NewAppointment`] when
//! confirmed. Nothing is persisted until that payload is submitted to
//! `POST /api/appointments`; dropping the wizard discards the draft.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{InjuryArea, NewAppointment};

pub const SUBMISSION_FAILED_NOTICE: &str = "An error occurred, please try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStep {
    InjurySelection,
    TherapistSelection,
    ScheduleSelection,
    Submitting,
    Home,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("{action} is not available on step {step:?}")]
    WrongStep {
        action: &'static str,
        step: BookingStep,
    },

    #[error("cannot leave step {0:?} until a selection is made")]
    GuardFailed(BookingStep),

    #[error("an injury area, a therapist and a date must all be selected")]
    Incomplete,

    #[error("appointment date {0} is in the past")]
    DateInPast(DateTime<Utc>),

    #[error("booking is already being submitted")]
    AlreadySubmitting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWizard {
    step: BookingStep,
    area: Option<InjuryArea>,
    therapist_id: Option<i64>,
    date: Option<DateTime<Utc>>,
    notice: Option<String>,
}

impl Default for BookingWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingWizard {
    pub fn new() -> Self {
        Self {
            step: BookingStep::InjurySelection,
            area: None,
            therapist_id: None,
            date: None,
            notice: None,
        }
    }

    pub fn step(&self) -> BookingStep {
        self.step
    }

    pub fn area(&self) -> Option<InjuryArea> {
        self.area
    }

    pub fn therapist_id(&self) -> Option<i64> {
        self.therapist_id
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    /// Error notice left behind by a failed submission.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    fn expect_step(&self, expected: BookingStep, action: &'static str) -> Result<(), BookingError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(BookingError::WrongStep {
                action,
                step: self.step,
            })
        }
    }

    pub fn select_area(&mut self, area: InjuryArea) -> Result<(), BookingError> {
        self.expect_step(BookingStep::InjurySelection, "select_area")?;
        self.area = Some(area);
        Ok(())
    }

    pub fn select_therapist(&mut self, therapist_id: i64) -> Result<(), BookingError> {
        self.expect_step(BookingStep::TherapistSelection, "select_therapist")?;
        self.therapist_id = Some(therapist_id);
        Ok(())
    }

    pub fn select_date(&mut self, date: DateTime<Utc>) -> Result<(), BookingError> {
        self.expect_step(BookingStep::ScheduleSelection, "select_date")?;
        self.date = Some(date);
        self.notice = None;
        Ok(())
    }

    /// Whether the "next" control on the current step is enabled.
    pub fn can_advance(&self) -> bool {
        match self.step {
            BookingStep::InjurySelection => self.area.is_some(),
            BookingStep::TherapistSelection => self.therapist_id.is_some(),
            _ => false,
        }
    }

    pub fn next(&mut self) -> Result<BookingStep, BookingError> {
        let target = match self.step {
            BookingStep::InjurySelection => BookingStep::TherapistSelection,
            BookingStep::TherapistSelection => BookingStep::ScheduleSelection,
            step => {
                return Err(BookingError::WrongStep {
                    action: "next",
                    step,
                });
            }
        };

        if !self.can_advance() {
            return Err(BookingError::GuardFailed(self.step));
        }

        self.step = target;
        Ok(self.step)
    }

    /// Steps backwards without clearing any selection.
    pub fn back(&mut self) -> Result<BookingStep, BookingError> {
        self.step = match self.step {
            BookingStep::TherapistSelection => BookingStep::InjurySelection,
            BookingStep::ScheduleSelection => BookingStep::TherapistSelection,
            step => {
                return Err(BookingError::WrongStep {
                    action: "back",
                    step,
                });
            }
        };
        Ok(self.step)
    }

    fn validate_confirmation(&self, now: DateTime<Utc>) -> Result<NewAppointment, BookingError> {
        if self.step == BookingStep::Submitting {
            return Err(BookingError::AlreadySubmitting);
        }
        self.expect_step(BookingStep::ScheduleSelection, "confirm")?;

        let (Some(area), Some(therapist_id), Some(date)) = (self.area, self.therapist_id, self.date)
        else {
            return Err(BookingError::Incomplete);
        };

        if is_in_past(date, now) {
            return Err(BookingError::DateInPast(date));
        }

        Ok(NewAppointment {
            area,
            therapist_id,
            date,
        })
    }

    /// Whether the "confirm" control is enabled.
    pub fn can_confirm(&self, now: DateTime<Utc>) -> bool {
        self.validate_confirmation(now).is_ok()
    }

    /// Locks the wizard and hands back the one appointment to create.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<NewAppointment, BookingError> {
        let appointment = self.validate_confirmation(now)?;
        self.step = BookingStep::Submitting;
        self.notice = None;
        Ok(appointment)
    }

    pub fn submission_succeeded(&mut self) -> Result<(), BookingError> {
        self.expect_step(BookingStep::Submitting, "submission_succeeded")?;
        *self = Self {
            step: BookingStep::Home,
            ..Self::new()
        };
        Ok(())
    }

    /// Returns to the schedule step with every selection intact. No retry
    /// is attempted.
    pub fn submission_failed(&mut self) -> Result<(), BookingError> {
        self.expect_step(BookingStep::Submitting, "submission_failed")?;
        self.step = BookingStep::ScheduleSelection;
        self.notice = Some(SUBMISSION_FAILED_NOTICE.to_string());
        Ok(())
    }

    /// Starts a fresh booking from the home view.
    pub fn restart(&mut self) {
        *self = Self::new();
    }
}

/// A date is in the past when it falls before the start of `now`'s day,
/// so booking later the same day is allowed.
pub fn is_in_past(date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    date < now.date_naive().and_time(NaiveTime::MIN).and_utc()
}
