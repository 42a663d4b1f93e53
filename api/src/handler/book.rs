use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use garde::Validate;
use kernel::model::{book::event::DeleteBook, id::BookId};
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

use crate::{
    extractor::AuthorizedUser,
    model::book::{
        BookListQuery, BookResponse, BookSearchQuery, CreateBookRequest, PaginatedBookResponse,
        UpdateBookRequest, UpdateBookRequestWithIds,
    },
};

pub async fn show_book_list(
    _user: AuthorizedUser,
    Query(query): Query<BookListQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<PaginatedBookResponse>> {
    query.validate()?;

    registry
        .book_repository()
        .find_all(query.into())
        .await
        .map(PaginatedBookResponse::from)
        .map(Json)
}

pub async fn search_books(
    _user: AuthorizedUser,
    Query(query): Query<BookSearchQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<PaginatedBookResponse>> {
    query.validate()?;

    let (search_options, list_options) = query.into_options();
    registry
        .book_repository()
        .search(search_options, list_options)
        .await
        .map(PaginatedBookResponse::from)
        .map(Json)
}

pub async fn show_book(
    _user: AuthorizedUser,
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<BookResponse>> {
    registry
        .book_repository()
        .find_by_id(book_id)
        .await?
        .map(BookResponse::from)
        .map(Json)
        .ok_or_else(|| AppError::EntityNotFound("指定された蔵書が見つかりませんでした".into()))
}

pub async fn register_book(
    user: AuthorizedUser,
    State(registry): State<AppRegistry>,
    Json(req): Json<CreateBookRequest>,
) -> AppResult<Json<BookResponse>> {
    // 蔵書の登録は管理者のみ
    if !user.is_admin() {
        return Err(AppError::ForbiddenOperation);
    }
    req.validate()?;

    registry
        .book_repository()
        .create(req.into())
        .await
        .map(BookResponse::from)
        .map(Json)
}

pub async fn update_book(
    user: AuthorizedUser,
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<UpdateBookRequest>,
) -> AppResult<Json<BookResponse>> {
    if !user.is_admin() {
        return Err(AppError::ForbiddenOperation);
    }
    req.validate()?;

    registry
        .book_repository()
        .update(UpdateBookRequestWithIds(book_id, req).into())
        .await
        .map(BookResponse::from)
        .map(Json)
}

pub async fn delete_book(
    user: AuthorizedUser,
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
) -> AppResult<StatusCode> {
    if !user.is_admin() {
        return Err(AppError::ForbiddenOperation);
    }

    registry
        .book_repository()
        .delete(DeleteBook { book_id })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
