//! First-run super admin.

use tracing::{debug, info};

use crate::auth::AuthError;
use crate::auth::service::AuthCore;
use crate::models::auth::{AdminLevel, NewAccount, Role, User};

/// Super admin account read from `SUPER_ADMIN_*`.
#[derive(Debug, Clone)]
pub struct SuperAdminSeed {
    pub email: String,
    pub password: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl SuperAdminSeed {
    /// Build from the environment values; `None` unless both email and
    /// password are set.
    pub fn from_parts(
        email: Option<String>,
        password: Option<String>,
        username: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Option<Self> {
        let email = email.filter(|v| !v.trim().is_empty())?;
        let password = password.filter(|v| !v.is_empty())?;
        Some(Self {
            email,
            password,
            username: username
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "superadmin".to_string()),
            first_name: first_name.unwrap_or_else(|| "Super".to_string()),
            last_name: last_name.unwrap_or_else(|| "Admin".to_string()),
        })
    }
}

/// Create the super admin unless a user with that email exists. Returns the
/// created user, or `None` when nothing was done.
pub async fn bootstrap_super_admin(
    auth: &AuthCore,
    seed: SuperAdminSeed,
) -> Result<Option<User>, AuthError> {
    if auth.find_user_by_email(&seed.email).await?.is_some() {
        debug!("super admin already present");
        return Ok(None);
    }

    let user = auth
        .create_user(
            NewAccount {
                username: seed.username,
                email: seed.email,
                password: seed.password,
                first_name: seed.first_name,
                last_name: seed.last_name,
                role: Role::Admin,
                admin_level: Some(AdminLevel::SuperAdmin),
            },
            None,
        )
        .await?;
    info!(user_id = %user.id, "super admin created");
    Ok(Some(user))
}
