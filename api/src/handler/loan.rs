use axum::{
    extract::{Path, Query, State},
    Json,
};
use garde::Validate;
use kernel::model::{
    id::{BookId, LoanId, UserId},
    loan::event::{CreateLoan, ReturnLoan},
};
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

use crate::{
    extractor::AuthorizedUser,
    model::loan::{LoanListQuery, LoanResponse, PaginatedLoanResponse},
};

/// ログイン中のユーザーとして蔵書を借りる
pub async fn borrow_book(
    user: AuthorizedUser,
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<LoanResponse>> {
    registry
        .loan_repository()
        .create(CreateLoan {
            user_id: user.id(),
            book_id,
        })
        .await
        .map(LoanResponse::from)
        .map(Json)
}

/// 返却処理。窓口で蔵書を受け取る管理者のみが実行できる
pub async fn return_book(
    user: AuthorizedUser,
    Path(loan_id): Path<LoanId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<LoanResponse>> {
    if !user.is_admin() {
        return Err(AppError::ForbiddenOperation);
    }

    registry
        .loan_repository()
        .update_returned(ReturnLoan { loan_id })
        .await
        .map(LoanResponse::from)
        .map(Json)
}

pub async fn show_my_loans(
    user: AuthorizedUser,
    Query(query): Query<LoanListQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<PaginatedLoanResponse>> {
    query.validate()?;

    registry
        .loan_repository()
        .find_by_user_id(user.id(), query.into())
        .await
        .map(PaginatedLoanResponse::from)
        .map(Json)
}

/// 任意のユーザーの貸出一覧。管理者のみ
pub async fn show_user_loans(
    user: AuthorizedUser,
    Path(user_id): Path<UserId>,
    Query(query): Query<LoanListQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<PaginatedLoanResponse>> {
    if !user.is_admin() {
        return Err(AppError::ForbiddenOperation);
    }
    query.validate()?;

    registry
        .loan_repository()
        .find_by_user_id(user_id, query.into())
        .await
        .map(PaginatedLoanResponse::from)
        .map(Json)
}

pub async fn show_book_loan_history(
    _user: AuthorizedUser,
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<Vec<LoanResponse>>> {
    let loans = registry
        .loan_repository()
        .find_history_by_book_id(book_id)
        .await?;
    Ok(Json(loans.into_iter().map(LoanResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use kernel::{
        model::{
            list::PaginatedList,
            loan::{Loan, LoanStatus},
            role::Role,
            user::User,
        },
        repository::{
            auth::MockAuthRepository, book::MockBookRepository, health::MockHealthCheckRepository,
            loan::MockLoanRepository, user::MockUserRepository,
        },
    };
    use tower::ServiceExt;

    use super::*;

    fn make_loan(user_id: UserId, book_id: BookId) -> Loan {
        let borrowed_at = Utc::now();
        Loan {
            id: LoanId::new(),
            user_id,
            book_id,
            borrowed_at,
            due_at: Loan::due_at_for(borrowed_at),
            returned_at: None,
            status: LoanStatus::Borrowed,
        }
    }

    // 認証済みユーザーを固定したレジストリを組み立てる
    fn registry_with(loan_repository: MockLoanRepository, user_id: UserId, role: Role) -> AppRegistry {
        let mut auth_repository = MockAuthRepository::new();
        auth_repository
            .expect_fetch_user_id_from_token()
            .returning(move |_| Ok(Some(user_id)));

        let mut user_repository = MockUserRepository::new();
        user_repository
            .expect_find_current_user()
            .returning(move |id| {
                Ok(Some(User {
                    id,
                    username: "alice".into(),
                    email: "alice@example.com".into(),
                    role,
                }))
            });

        AppRegistry::from_parts(
            Arc::new(MockBookRepository::new()),
            Arc::new(loan_repository),
            Arc::new(user_repository),
            Arc::new(auth_repository),
            Arc::new(MockHealthCheckRepository::new()),
        )
    }

    fn authorized(req: Request<Body>) -> Request<Body> {
        let (mut parts, body) = req.into_parts();
        parts
            .headers
            .insert("authorization", "Bearer testtoken".parse().unwrap());
        Request::from_parts(parts, body)
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn borrowing_returns_the_created_loan() {
        let user_id = UserId::new();
        let book_id = BookId::new();

        let mut loan_repository = MockLoanRepository::new();
        loan_repository
            .expect_create()
            .returning(|event| Ok(make_loan(event.user_id, event.book_id)));

        let app = crate::route::routes().with_state(registry_with(
            loan_repository,
            user_id,
            Role::User,
        ));
        let req = authorized(
            Request::builder()
                .method("POST")
                .uri(format!("/api/books/{book_id}/loans"))
                .body(Body::empty())
                .unwrap(),
        );

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["status"], "BORROWED");
        assert_eq!(body["userId"], user_id.to_string());
        assert_eq!(body["bookId"], book_id.to_string());
        assert!(body["returnedAt"].is_null());
    }

    #[tokio::test]
    async fn borrowing_conflicts_surface_as_409_with_a_stable_code() {
        let user_id = UserId::new();
        let book_id = BookId::new();

        let mut loan_repository = MockLoanRepository::new();
        loan_repository
            .expect_create()
            .returning(|_| Err(AppError::NoAvailableCopies));

        let app = crate::route::routes().with_state(registry_with(
            loan_repository,
            user_id,
            Role::User,
        ));
        let req = authorized(
            Request::builder()
                .method("POST")
                .uri(format!("/api/books/{book_id}/loans"))
                .body(Body::empty())
                .unwrap(),
        );

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let body = body_json(res).await;
        assert_eq!(body["code"], "no_available_copies");
    }

    #[tokio::test]
    async fn returning_requires_the_admin_role() {
        let user_id = UserId::new();
        let loan_id = LoanId::new();

        // update_returned に期待を設定しない。呼ばれたらテストは失敗する
        let loan_repository = MockLoanRepository::new();

        let app = crate::route::routes().with_state(registry_with(
            loan_repository,
            user_id,
            Role::User,
        ));
        let req = authorized(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/loans/{loan_id}/returned"))
                .body(Body::empty())
                .unwrap(),
        );

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn an_admin_can_return_a_loan() {
        let user_id = UserId::new();
        let loan_id = LoanId::new();

        let mut loan_repository = MockLoanRepository::new();
        loan_repository.expect_update_returned().returning(|event| {
            let mut loan = make_loan(UserId::new(), BookId::new());
            loan.id = event.loan_id;
            loan.returned_at = Some(Utc::now());
            loan.status = LoanStatus::Returned;
            Ok(loan)
        });

        let app = crate::route::routes().with_state(registry_with(
            loan_repository,
            user_id,
            Role::Admin,
        ));
        let req = authorized(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/loans/{loan_id}/returned"))
                .body(Body::empty())
                .unwrap(),
        );

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["status"], "RETURNED");
        assert_eq!(body["id"], loan_id.to_string());
    }

    #[tokio::test]
    async fn a_second_return_maps_to_409() {
        let user_id = UserId::new();
        let loan_id = LoanId::new();

        let mut loan_repository = MockLoanRepository::new();
        loan_repository
            .expect_update_returned()
            .returning(|_| Err(AppError::AlreadyReturned));

        let app = crate::route::routes().with_state(registry_with(
            loan_repository,
            user_id,
            Role::Admin,
        ));
        let req = authorized(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/loans/{loan_id}/returned"))
                .body(Body::empty())
                .unwrap(),
        );

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let body = body_json(res).await;
        assert_eq!(body["code"], "already_returned");
    }

    #[tokio::test]
    async fn my_loans_are_paginated() {
        let user_id = UserId::new();

        let mut loan_repository = MockLoanRepository::new();
        loan_repository
            .expect_find_by_user_id()
            .returning(|user_id, options| {
                Ok(PaginatedList {
                    total: 1,
                    limit: options.limit,
                    offset: options.offset,
                    items: vec![make_loan(user_id, BookId::new())],
                })
            });

        let app = crate::route::routes().with_state(registry_with(
            loan_repository,
            user_id,
            Role::User,
        ));
        let req = authorized(
            Request::builder()
                .uri("/api/loans/me?limit=5")
                .body(Body::empty())
                .unwrap(),
        );

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["items"][0]["userId"], user_id.to_string());
    }

    #[tokio::test]
    async fn requests_without_a_token_are_rejected() {
        let app = crate::route::routes().with_state(registry_with(
            MockLoanRepository::new(),
            UserId::new(),
            Role::User,
        ));
        let req = Request::builder()
            .uri("/api/loans/me")
            .body(Body::empty())
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
