use serde::{Deserialize, Serialize, Serializer};
use time::{macros::format_description, Duration, OffsetDateTime, UtcOffset};

use crate::store::User;

/// Request body for account creation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for sign-in.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Public part of the user returned to callers. Never carries the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub user_id: String,
    pub email: String,
    #[serde(serialize_with = "millis_utc")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(row: User) -> Self {
        Self {
            user_id: row.user_id,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

/// Success envelope: `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Error body: `{"status": 400, "code": "errors/bad-request", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
}

// RFC 3339, UTC, rounded to the millisecond, trailing zeros kept.
fn millis_utc<S: Serializer>(t: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
    let rounded = t.to_offset(UtcOffset::UTC) + Duration::microseconds(500);
    let text = rounded
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .map_err(serde::ser::Error::custom)?;
    s.serialize_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn public_user_serializes_without_hash() {
        let user = User {
            user_id: "3yQZ9y3mCkW6ZVqgR1s8bd".into(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            created_at: datetime!(2024-01-02 03:04:05.678400 UTC),
        };
        let json = serde_json::to_value(DataResponse {
            data: PublicUser::from(user),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {
                    "user_id": "3yQZ9y3mCkW6ZVqgR1s8bd",
                    "email": "test@example.com",
                    "created_at": "2024-01-02T03:04:05.678Z"
                }
            })
        );
    }

    #[test]
    fn created_at_rounds_to_millis() {
        let user = PublicUser {
            user_id: "x".into(),
            email: "e".into(),
            created_at: datetime!(2024-01-02 03:04:05.999600 +01:00),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["created_at"], "2024-01-02T02:04:06.000Z");
    }

    #[test]
    fn requests_reject_unknown_fields() {
        let err = serde_json::from_str::<SignInRequest>(
            r#"{"email":"a@example.com","password":"x","admin":true}"#,
        );
        assert!(err.is_err());
        let ok: CreateUserRequest = serde_json::from_str(r#"{"email":"a@example.com"}"#).unwrap();
        assert!(ok.password.is_none());
    }
}
