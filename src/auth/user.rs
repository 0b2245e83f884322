use serde::Serialize;

use crate::error::AppError;

use super::{Permission, Role};

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let role = user
            .role
            .unwrap_or_default()
            .parse::<Role>()
            .map_err(|e| AppError::Internal(format!("Corrupt user row: {}", e)))?;

        Ok(Self {
            id: user.id.unwrap_or_default(),
            name: user.name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            role,
        })
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                email = %self.email,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "Role {} lacks permission {:?}",
                self.role, permission
            )))
        }
    }

    /// Patients may only touch their own records; anyone holding
    /// `ViewPatients` may read other users' records.
    pub fn require_self_or(&self, user_id: i64, permission: Permission) -> Result<(), AppError> {
        if self.id == user_id {
            return Ok(());
        }
        self.require_permission(permission)
    }
}
