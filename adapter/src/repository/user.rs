use async_trait::async_trait;
use derive_new::new;
use kernel::{
    model::{id::UserId, role::Role, user::event::CreateUser, user::User},
    repository::user::UserRepository,
};
use shared::error::{AppError, AppResult};

use crate::database::{model::user::UserRow, ConnectionPool};

#[derive(new)]
pub struct UserRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn create(&self, event: CreateUser) -> AppResult<User> {
        let user_id = UserId::new();
        let hashed_password = bcrypt::hash(&event.password, bcrypt::DEFAULT_COST)?;

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (user_id, username, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, username, email, role
            "#,
        )
        .bind(user_id)
        .bind(event.username)
        .bind(event.email)
        .bind(hashed_password)
        .bind(Role::User.to_string())
        .fetch_one(self.db.inner_ref())
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return AppError::UnprocessableEntity(
                        "このユーザー名またはメールアドレスはすでに登録されています".into(),
                    );
                }
            }
            AppError::SpecificOperationError(e)
        })?;

        row.try_into()
    }

    async fn find_current_user(&self, current_user_id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, username, email, role FROM users WHERE user_id = $1",
        )
        .bind(current_user_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        row.map(User::try_from).transpose()
    }
}
