use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_new::new;
use kernel::{
    model::{
        id::{BookId, LoanId, UserId},
        list::PaginatedList,
        loan::{
            event::{CreateLoan, ReturnLoan},
            Loan, LoanListOptions, LoanStatus,
        },
    },
    repository::loan::LoanRepository,
};
use shared::error::{AppError, AppResult};

use crate::database::{
    model::{book::BookStockRow, loan::LoanRow},
    ConnectionPool,
};

#[derive(new)]
pub struct LoanRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl LoanRepository for LoanRepositoryImpl {
    async fn create(&self, event: CreateLoan) -> AppResult<Loan> {
        let mut tx = self.db.begin().await?;

        let user_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
                .bind(event.user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::SpecificOperationError)?;
        if !user_exists {
            return Err(AppError::EntityNotFound(
                "指定されたユーザーが見つかりませんでした".into(),
            ));
        }

        // 蔵書の行ロックを取得する。在庫数の確認と減算が同一スナップショット上で行われるため、
        // 最後の 1 冊を奪い合う並行リクエストが両方成功することはない
        let book = sqlx::query_as::<_, BookStockRow>(
            r#"
            SELECT book_id, total_copies, available_copies
            FROM books
            WHERE book_id = $1
            FOR UPDATE
            "#,
        )
        .bind(event.book_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?
        .ok_or_else(|| AppError::EntityNotFound("指定された蔵書が見つかりませんでした".into()))?;

        if book.available_copies <= 0 {
            return Err(AppError::NoAvailableCopies);
        }

        let already_borrowed = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM loans
                WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL
            )
            "#,
        )
        .bind(event.user_id)
        .bind(event.book_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;
        if already_borrowed {
            return Err(AppError::AlreadyBorrowed);
        }

        let res = sqlx::query(
            "UPDATE books SET available_copies = available_copies - 1 WHERE book_id = $1",
        )
        .bind(event.book_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;
        if res.rows_affected() < 1 {
            return Err(AppError::NoRowAffectedError(
                "no book record has been updated".into(),
            ));
        }

        let borrowed_at = Utc::now();
        let row = sqlx::query_as::<_, LoanRow>(
            r#"
            INSERT INTO loans (loan_id, user_id, book_id, borrowed_at, due_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING loan_id, user_id, book_id, borrowed_at, due_at, returned_at, status
            "#,
        )
        .bind(LoanId::new())
        .bind(event.user_id)
        .bind(event.book_id)
        .bind(borrowed_at)
        .bind(Loan::due_at_for(borrowed_at))
        .bind(LoanStatus::Borrowed.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            // 未返却の貸出に張った部分一意インデックスが最後の砦になる
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return AppError::AlreadyBorrowed;
                }
            }
            AppError::SpecificOperationError(e)
        })?;

        tx.commit().await.map_err(AppError::TransactionError)?;

        row.try_into()
    }

    async fn update_returned(&self, event: ReturnLoan) -> AppResult<Loan> {
        let mut tx = self.db.begin().await?;

        // 貸出レコードをロックして二重返却を防ぐ
        let loan = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT loan_id, user_id, book_id, borrowed_at, due_at, returned_at, status
            FROM loans
            WHERE loan_id = $1
            FOR UPDATE
            "#,
        )
        .bind(event.loan_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?
        .ok_or_else(|| AppError::EntityNotFound("指定された貸出が見つかりませんでした".into()))?;

        if loan.returned_at.is_some() {
            return Err(AppError::AlreadyReturned);
        }

        let row = sqlx::query_as::<_, LoanRow>(
            r#"
            UPDATE loans
            SET returned_at = $2, status = $3
            WHERE loan_id = $1
            RETURNING loan_id, user_id, book_id, borrowed_at, due_at, returned_at, status
            "#,
        )
        .bind(event.loan_id)
        .bind(Utc::now())
        .bind(LoanStatus::Returned.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        // 在庫数を戻す。総蔵書数を超えるのは過去の記帳が壊れている場合だけなので、
        // 利用者向けのエラーではなく整合性エラーとして扱う
        let res = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies + 1
            WHERE book_id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(loan.book_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;
        if res.rows_affected() < 1 {
            return Err(AppError::IntegrityFault(format!(
                "available_copies would exceed total_copies: book_id={}",
                loan.book_id
            )));
        }

        tx.commit().await.map_err(AppError::TransactionError)?;

        row.try_into()
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        // 対象を洗い出してから 1 件ずつ独立に更新する。スキャン全体でロックを
        // 保持しないため、長いスイープでも貸出・返却のトラフィックを妨げない
        let targets = sqlx::query_scalar::<_, LoanId>(
            r#"
            SELECT loan_id FROM loans
            WHERE returned_at IS NULL AND due_at < $1 AND status <> $2
            "#,
        )
        .bind(now)
        .bind(LoanStatus::Overdue.to_string())
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        let mut transitioned = 0;
        for loan_id in targets {
            // 個々の更新で述語を再評価する。スキャン後に返却された貸出には触れない
            let res = sqlx::query(
                r#"
                UPDATE loans SET status = $2
                WHERE loan_id = $1 AND returned_at IS NULL AND status <> $2
                "#,
            )
            .bind(loan_id)
            .bind(LoanStatus::Overdue.to_string())
            .execute(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;
            transitioned += res.rows_affected();
        }

        Ok(transitioned)
    }

    async fn find_by_user_id(
        &self,
        user_id: UserId,
        options: LoanListOptions,
    ) -> AppResult<PaginatedList<Loan>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM loans WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

        let rows = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT loan_id, user_id, book_id, borrowed_at, due_at, returned_at, status
            FROM loans
            WHERE user_id = $1
            ORDER BY borrowed_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(options.limit)
        .bind(options.offset)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        let items = rows
            .into_iter()
            .map(Loan::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(PaginatedList {
            total,
            limit: options.limit,
            offset: options.offset,
            items,
        })
    }

    async fn find_history_by_book_id(&self, book_id: BookId) -> AppResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT loan_id, user_id, book_id, borrowed_at, due_at, returned_at, status
            FROM loans
            WHERE book_id = $1
            ORDER BY borrowed_at DESC
            "#,
        )
        .bind(book_id)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        rows.into_iter().map(Loan::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;

    // DATABASE_URL を設定し、migrations/ を適用済みの Postgres に対して実行する
    async fn test_pool() -> ConnectionPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL is not set");
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("../migrations").run(&pool).await.unwrap();
        ConnectionPool::new(pool)
    }

    async fn fixture_user(db: &ConnectionPool) -> UserId {
        let user_id = UserId::new();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, password_hash, role)
            VALUES ($1, $2, $3, 'dummy', 'USER')
            "#,
        )
        .bind(user_id)
        .bind(format!("user{}", user_id.raw().simple()))
        .bind(format!("{}@example.com", user_id.raw().simple()))
        .execute(db.inner_ref())
        .await
        .unwrap();
        user_id
    }

    async fn fixture_book(db: &ConnectionPool, total: i32, available: i32) -> BookId {
        let book_id = BookId::new();
        sqlx::query(
            r#"
            INSERT INTO books (book_id, title, author, isbn, description, total_copies, available_copies)
            VALUES ($1, 'テスト駆動開発', 'Kent Beck', '978-4274217883', '', $2, $3)
            "#,
        )
        .bind(book_id)
        .bind(total)
        .bind(available)
        .execute(db.inner_ref())
        .await
        .unwrap();
        book_id
    }

    async fn available_copies(db: &ConnectionPool, book_id: BookId) -> i32 {
        sqlx::query_scalar::<_, i32>("SELECT available_copies FROM books WHERE book_id = $1")
            .bind(book_id)
            .fetch_one(db.inner_ref())
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires Postgres (docker compose up), see compose.yaml"]
    async fn borrow_and_return_round_trip() {
        let db = test_pool().await;
        let repo = LoanRepositoryImpl::new(db.clone());
        let user_id = fixture_user(&db).await;
        let book_id = fixture_book(&db, 3, 3).await;

        let loan = repo
            .create(CreateLoan { user_id, book_id })
            .await
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(loan.due_at, Loan::due_at_for(loan.borrowed_at));
        assert!(loan.is_open());
        assert_eq!(available_copies(&db, book_id).await, 2);

        let returned = repo
            .update_returned(ReturnLoan { loan_id: loan.id })
            .await
            .unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert!(returned.returned_at.is_some());
        assert_eq!(available_copies(&db, book_id).await, 3);

        // 二重返却は拒否され、状態はそれ以上変わらない
        let second = repo.update_returned(ReturnLoan { loan_id: loan.id }).await;
        assert!(matches!(second, Err(AppError::AlreadyReturned)));
        assert_eq!(available_copies(&db, book_id).await, 3);
    }

    #[tokio::test]
    #[ignore = "requires Postgres (docker compose up), see compose.yaml"]
    async fn duplicate_borrowing_is_rejected() {
        let db = test_pool().await;
        let repo = LoanRepositoryImpl::new(db.clone());
        let user_id = fixture_user(&db).await;
        let book_id = fixture_book(&db, 3, 3).await;

        repo.create(CreateLoan { user_id, book_id }).await.unwrap();
        let second = repo.create(CreateLoan { user_id, book_id }).await;
        assert!(matches!(second, Err(AppError::AlreadyBorrowed)));
        assert_eq!(available_copies(&db, book_id).await, 2);
    }

    #[tokio::test]
    #[ignore = "requires Postgres (docker compose up), see compose.yaml"]
    async fn borrowing_without_stock_is_rejected() {
        let db = test_pool().await;
        let repo = LoanRepositoryImpl::new(db.clone());
        let user_id = fixture_user(&db).await;
        let book_id = fixture_book(&db, 1, 0).await;

        let result = repo.create(CreateLoan { user_id, book_id }).await;
        assert!(matches!(result, Err(AppError::NoAvailableCopies)));
        assert_eq!(available_copies(&db, book_id).await, 0);
    }

    #[tokio::test]
    #[ignore = "requires Postgres (docker compose up), see compose.yaml"]
    async fn last_copy_is_not_borrowed_twice() {
        let db = test_pool().await;
        let repo = Arc::new(LoanRepositoryImpl::new(db.clone()));
        let user1 = fixture_user(&db).await;
        let user2 = fixture_user(&db).await;
        let book_id = fixture_book(&db, 1, 1).await;

        let (r1, r2) = tokio::join!(
            repo.create(CreateLoan {
                user_id: user1,
                book_id
            }),
            repo.create(CreateLoan {
                user_id: user2,
                book_id
            }),
        );

        // どちらか片方だけが成功し、敗者には在庫なしの競合が返る
        assert!(r1.is_ok() != r2.is_ok());
        let loser = if r1.is_ok() { r2 } else { r1 };
        assert!(matches!(loser, Err(AppError::NoAvailableCopies)));
        assert_eq!(available_copies(&db, book_id).await, 0);
    }

    #[tokio::test]
    #[ignore = "requires Postgres (docker compose up), see compose.yaml"]
    async fn sweep_transitions_each_overdue_loan_once() {
        let db = test_pool().await;
        let repo = LoanRepositoryImpl::new(db.clone());
        let user_id = fixture_user(&db).await;
        let book_id = fixture_book(&db, 2, 2).await;

        let loan = repo
            .create(CreateLoan { user_id, book_id })
            .await
            .unwrap();
        // 期限を過去にずらして延滞状態を作る
        sqlx::query("UPDATE loans SET due_at = $2 WHERE loan_id = $1")
            .bind(loan.id)
            .bind(Utc::now() - Duration::days(1))
            .execute(db.inner_ref())
            .await
            .unwrap();

        let now = Utc::now();
        assert_eq!(repo.mark_overdue(now).await.unwrap(), 1);
        // 同じ now での再実行は no-op
        assert_eq!(repo.mark_overdue(now).await.unwrap(), 0);

        let loans = repo.find_history_by_book_id(book_id).await.unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].status, LoanStatus::Overdue);

        // 延滞中の貸出も返却でき、在庫が戻る
        let returned = repo
            .update_returned(ReturnLoan { loan_id: loan.id })
            .await
            .unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(available_copies(&db, book_id).await, 2);
    }

    #[tokio::test]
    #[ignore = "requires Postgres (docker compose up), see compose.yaml"]
    async fn borrowing_against_missing_records_is_not_found() {
        let db = test_pool().await;
        let repo = LoanRepositoryImpl::new(db.clone());
        let user_id = fixture_user(&db).await;
        let book_id = fixture_book(&db, 1, 1).await;

        let unknown_user = repo
            .create(CreateLoan {
                user_id: UserId::new(),
                book_id,
            })
            .await;
        assert!(matches!(unknown_user, Err(AppError::EntityNotFound(_))));

        let unknown_book = repo
            .create(CreateLoan {
                user_id,
                book_id: BookId::new(),
            })
            .await;
        assert!(matches!(unknown_book, Err(AppError::EntityNotFound(_))));
    }
}
