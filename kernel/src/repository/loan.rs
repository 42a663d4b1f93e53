use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::error::AppResult;

use crate::model::{
    id::{BookId, UserId},
    list::PaginatedList,
    loan::{
        event::{CreateLoan, ReturnLoan},
        Loan, LoanListOptions,
    },
};

#[mockall::automock]
#[async_trait]
pub trait LoanRepository: Send + Sync {
    // 貸出操作
    async fn create(&self, event: CreateLoan) -> AppResult<Loan>;
    // 返却操作
    async fn update_returned(&self, event: ReturnLoan) -> AppResult<Loan>;
    // 期限切れの未返却貸出を OVERDUE に遷移させ、遷移させた件数を返す
    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64>;
    // ユーザー ID に紐づく貸出情報を取得する
    async fn find_by_user_id(
        &self,
        user_id: UserId,
        options: LoanListOptions,
    ) -> AppResult<PaginatedList<Loan>>;
    // 蔵書の貸出履歴（返却済みも含む）
    async fn find_history_by_book_id(&self, book_id: BookId) -> AppResult<Vec<Loan>>;
}
