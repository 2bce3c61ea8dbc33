use time::OffsetDateTime;

/// Parameters for inserting a user. `created_at` is assigned by the store.
#[derive(Clone)]
pub struct AddUser {
    pub user_id: String,
    pub email: String,
    pub password_hash: String,
}

/// User row as persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub password_hash: String, // argon2id PHC string, never leaves the service
    pub created_at: OffsetDateTime,
}

impl std::fmt::Debug for AddUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddUser")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}
