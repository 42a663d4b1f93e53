use kernel::model::{id::UserId, role::Role, user::User};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        let User {
            id,
            username,
            email,
            role,
        } = value;
        UserResponse {
            id,
            username,
            email,
            role,
        }
    }
}
