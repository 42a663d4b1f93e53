use async_trait::async_trait;
use shared::error::AppResult;

use crate::model::{
    book::{
        event::{CreateBook, DeleteBook, UpdateBook},
        Book, BookListOptions, BookSearchOptions,
    },
    id::BookId,
    list::PaginatedList,
};

#[mockall::automock]
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn create(&self, event: CreateBook) -> AppResult<Book>;
    async fn update(&self, event: UpdateBook) -> AppResult<Book>;
    async fn delete(&self, event: DeleteBook) -> AppResult<()>;
    async fn find_by_id(&self, book_id: BookId) -> AppResult<Option<Book>>;
    async fn find_all(&self, options: BookListOptions) -> AppResult<PaginatedList<Book>>;
    async fn search(
        &self,
        options: BookSearchOptions,
        list_options: BookListOptions,
    ) -> AppResult<PaginatedList<Book>>;
}
