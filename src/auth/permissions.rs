use anyhow::{Error, anyhow};
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    BookAppointments,
    ViewOwnAppointments,
    LogProgress,
    SendMessages,
    ViewOwnExercises,

    ViewPatients,
    ViewSessions,
    AssignExercises,
    ReplyToPatients,
    CompleteAppointments,

    ManageTherapists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Therapist,
    Admin,
}

const PATIENT_GRANTS: &[Permission] = &[
    Permission::ViewOwnProfile,
    Permission::BookAppointments,
    Permission::ViewOwnAppointments,
    Permission::LogProgress,
    Permission::SendMessages,
    Permission::ViewOwnExercises,
];

const THERAPIST_GRANTS: &[Permission] = &[
    Permission::ViewOwnProfile,
    Permission::ViewPatients,
    Permission::ViewSessions,
    Permission::AssignExercises,
    Permission::ReplyToPatients,
    Permission::CompleteAppointments,
];

static PATIENT_PERMISSIONS: Lazy<HashSet<Permission>> =
    Lazy::new(|| PATIENT_GRANTS.iter().copied().collect());

static THERAPIST_PERMISSIONS: Lazy<HashSet<Permission>> =
    Lazy::new(|| THERAPIST_GRANTS.iter().copied().collect());

// Admins act on both sides of the clinic.
static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    PATIENT_GRANTS
        .iter()
        .chain(THERAPIST_GRANTS)
        .copied()
        .chain([Permission::ManageTherapists])
        .collect()
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Patient => &PATIENT_PERMISSIONS,
            Role::Therapist => &THERAPIST_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Stored form in the `users.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Therapist => "therapist",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Role::Patient, Role::Therapist, Role::Admin]
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown role: {}", s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
