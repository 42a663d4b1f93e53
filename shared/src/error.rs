use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    UnprocessableEntity(String),
    #[error("{0}")]
    EntityNotFound(String),
    #[error("{0}")]
    ValidationError(#[from] garde::Report),
    #[error("貸出可能な在庫がありません")]
    NoAvailableCopies,
    #[error("この蔵書はすでに貸出中です")]
    AlreadyBorrowed,
    #[error("この貸出はすでに返却済みです")]
    AlreadyReturned,
    // 在庫数の帳尻が合わない場合に使う。通常運用では発生しない
    #[error("蔵書データの整合性が壊れています: {0}")]
    IntegrityFault(String),
    // sqlx::Error を引数にするヴァリアントが複数あるので、[from] は使えず、[source] で代用している
    #[error("トランザクションを実行できませんでした。")]
    TransactionError(#[source] sqlx::Error),
    #[error("データベース処理実行中にエラーが発生しました。")]
    SpecificOperationError(#[source] sqlx::Error),
    #[error("No rows affected: {0}")]
    NoRowAffectedError(String),
    #[error("{0}")]
    KeyValueStoreError(#[from] redis::RedisError),
    #[error("{0}")]
    BcryptError(#[from] bcrypt::BcryptError),
    #[error("{0}")]
    ConvertToUuidError(#[from] uuid::Error),
    #[error("ログインに失敗しました")]
    UnauthenticatedError,
    #[error("認可情報が間違っています")]
    UnauthorizedError,
    #[error("許可されていない操作です")]
    ForbiddenOperation,
    #[error("{0}")]
    ConversionEntityError(String),
}

// 呼び出し側が文字列照合せずに分岐できるよう、ステータスコードと機械可読な code を返す
#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::UnprocessableEntity(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity")
            }
            AppError::EntityNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::ValidationError(_) | AppError::ConvertToUuidError(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            AppError::NoAvailableCopies => (StatusCode::CONFLICT, "no_available_copies"),
            AppError::AlreadyBorrowed => (StatusCode::CONFLICT, "already_borrowed"),
            AppError::AlreadyReturned => (StatusCode::CONFLICT, "already_returned"),
            AppError::UnauthenticatedError | AppError::ForbiddenOperation => {
                (StatusCode::FORBIDDEN, "forbidden")
            }
            AppError::UnauthorizedError => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::IntegrityFault(_)
            | AppError::TransactionError(_)
            | AppError::SpecificOperationError(_)
            | AppError::NoRowAffectedError(_)
            | AppError::KeyValueStoreError(_)
            | AppError::BcryptError(_)
            | AppError::ConversionEntityError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_server_error")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, code) = self.status_and_code();
        if status_code == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(
                error.cause_chain = ?self,
                error.message = %self,
                "Unexpected error happened"
            );
        }
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status_code, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
