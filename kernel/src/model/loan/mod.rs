use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::id::{BookId, LoanId, UserId};

pub mod event;

/// 貸出期間（日数）。呼び出し時に変更できない固定ポリシー
pub const LOAN_PERIOD_DAYS: i64 = 14;

#[derive(Debug, Clone)]
pub struct Loan {
    pub id: LoanId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

impl Loan {
    /// 貸出日時から返却期限を求める
    pub fn due_at_for(borrowed_at: DateTime<Utc>) -> DateTime<Utc> {
        borrowed_at + Duration::days(LOAN_PERIOD_DAYS)
    }

    /// 未返却かどうか。OVERDUE も未返却に含まれる
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Borrowed,
    Returned,
    Overdue,
}

#[derive(Debug)]
pub struct LoanListOptions {
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_at_is_fourteen_days_after_borrowing() {
        let borrowed_at = Utc::now();
        let due_at = Loan::due_at_for(borrowed_at);
        assert_eq!(due_at - borrowed_at, Duration::days(14));
    }

    #[test]
    fn status_round_trips_through_string() {
        for status in [LoanStatus::Borrowed, LoanStatus::Returned, LoanStatus::Overdue] {
            let parsed = status.to_string().parse::<LoanStatus>().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn status_uses_the_wire_representation() {
        assert_eq!(LoanStatus::Borrowed.to_string(), "BORROWED");
        assert_eq!(LoanStatus::Returned.to_string(), "RETURNED");
        assert_eq!(LoanStatus::Overdue.to_string(), "OVERDUE");
    }

    #[test]
    fn overdue_loan_is_still_open() {
        let borrowed_at = Utc::now() - Duration::days(30);
        let loan = Loan {
            id: LoanId::new(),
            user_id: UserId::new(),
            book_id: BookId::new(),
            borrowed_at,
            due_at: Loan::due_at_for(borrowed_at),
            returned_at: None,
            status: LoanStatus::Overdue,
        };
        assert!(loan.is_open());
    }
}
