use chrono::{DateTime, Utc};
use kernel::model::{
    id::{BookId, LoanId, UserId},
    loan::{Loan, LoanStatus},
};
use shared::error::AppError;

#[derive(sqlx::FromRow)]
pub struct LoanRow {
    pub loan_id: LoanId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: String,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(value: LoanRow) -> Result<Self, Self::Error> {
        let status = value
            .status
            .parse::<LoanStatus>()
            .map_err(|e| AppError::ConversionEntityError(e.to_string()))?;
        Ok(Loan {
            id: value.loan_id,
            user_id: value.user_id,
            book_id: value.book_id,
            borrowed_at: value.borrowed_at,
            due_at: value.due_at,
            returned_at: value.returned_at,
            status,
        })
    }
}
