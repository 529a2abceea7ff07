//! Download access gate.

use tracing::debug;

use super::Files;
use crate::error::Result;
use crate::helpers::parse_bool;
use crate::users::GUEST_USER_ID;

impl Files {
    /// Whether `user_id` may download file `file_id`.
    ///
    /// Files without requirements are open to everyone, guests included.
    /// Otherwise guests are refused, a listed role must be held (when roles
    /// are listed), and the required user meta must be truthy (when a key is
    /// set). Registered hooks get the final say on that last outcome only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`](crate::StoreError::FileNotFound)
    /// for unknown files.
    pub async fn user_meets_requirements(&self, file_id: i64, user_id: i64) -> Result<bool> {
        let file = self.require(file_id).await?;
        let required_roles = file.roles();
        let meta_key = file.required_meta_key.trim();

        if required_roles.is_empty() && meta_key.is_empty() {
            return Ok(true);
        }
        if user_id == GUEST_USER_ID {
            return Ok(false);
        }

        let user_roles = self.users.roles(user_id).await?;
        let meets_roles =
            required_roles.is_empty() || required_roles.iter().any(|role| user_roles.contains(role));

        let meets_meta = if meta_key.is_empty() {
            true
        } else {
            self.users
                .get_meta(user_id, meta_key)
                .await?
                .is_some_and(|value| parse_bool(&value))
        };

        let meets = self.hooks.meets_requirements(
            meets_roles && meets_meta,
            &file,
            user_id,
            &required_roles,
            meta_key,
        );
        debug!(file_id, user_id, meets, "requirements checked");
        Ok(meets)
    }
}
