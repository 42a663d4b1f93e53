use chrono::{DateTime, Utc};
use garde::Validate;
use kernel::model::{
    id::{BookId, LoanId, UserId},
    list::PaginatedList,
    loan::{Loan, LoanListOptions, LoanStatus},
};
use serde::{Deserialize, Serialize};

use super::book::default_limit;

#[derive(Debug, Deserialize, Validate)]
pub struct LoanListQuery {
    #[garde(range(min = 0, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[garde(range(min = 0))]
    #[serde(default)]
    pub offset: i64,
}

impl From<LoanListQuery> for LoanListOptions {
    fn from(value: LoanListQuery) -> Self {
        LoanListOptions {
            limit: value.limit,
            offset: value.offset,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanResponse {
    pub id: LoanId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

impl From<Loan> for LoanResponse {
    fn from(value: Loan) -> Self {
        let Loan {
            id,
            user_id,
            book_id,
            borrowed_at,
            due_at,
            returned_at,
            status,
        } = value;
        LoanResponse {
            id,
            user_id,
            book_id,
            borrowed_at,
            due_at,
            returned_at,
            status,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedLoanResponse {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub items: Vec<LoanResponse>,
}

impl From<PaginatedList<Loan>> for PaginatedLoanResponse {
    fn from(value: PaginatedList<Loan>) -> Self {
        let PaginatedList {
            total,
            limit,
            offset,
            items,
        } = value;
        PaginatedLoanResponse {
            total,
            limit,
            offset,
            items: items.into_iter().map(LoanResponse::from).collect(),
        }
    }
}
