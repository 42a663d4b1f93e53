use garde::Validate;
use kernel::model::{
    book::{
        event::{CreateBook, UpdateBook},
        Book, BookListOptions, BookSearchOptions,
    },
    id::BookId,
    list::PaginatedList,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    #[garde(length(min = 1))]
    pub title: String,
    #[garde(length(min = 1))]
    pub author: String,
    #[garde(length(min = 1))]
    pub isbn: String,
    #[garde(skip)]
    #[serde(default)]
    pub description: String,
    #[garde(skip)]
    pub genre: Option<String>,
    #[garde(skip)]
    pub publisher: Option<String>,
    #[garde(skip)]
    pub publication_year: Option<i32>,
    #[garde(range(min = 0))]
    pub total_copies: i32,
    #[garde(range(min = 0))]
    pub available_copies: i32,
}

impl From<CreateBookRequest> for CreateBook {
    fn from(value: CreateBookRequest) -> Self {
        let CreateBookRequest {
            title,
            author,
            isbn,
            description,
            genre,
            publisher,
            publication_year,
            total_copies,
            available_copies,
        } = value;
        CreateBook {
            title,
            author,
            isbn,
            description,
            genre,
            publisher,
            publication_year,
            total_copies,
            available_copies,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    #[garde(length(min = 1))]
    pub title: String,
    #[garde(length(min = 1))]
    pub author: String,
    #[garde(length(min = 1))]
    pub isbn: String,
    #[garde(skip)]
    #[serde(default)]
    pub description: String,
    #[garde(skip)]
    pub genre: Option<String>,
    #[garde(skip)]
    pub publisher: Option<String>,
    #[garde(skip)]
    pub publication_year: Option<i32>,
    #[garde(range(min = 0))]
    pub total_copies: i32,
    #[garde(range(min = 0))]
    pub available_copies: i32,
}

pub struct UpdateBookRequestWithIds(pub BookId, pub UpdateBookRequest);

impl From<UpdateBookRequestWithIds> for UpdateBook {
    fn from(UpdateBookRequestWithIds(book_id, value): UpdateBookRequestWithIds) -> Self {
        let UpdateBookRequest {
            title,
            author,
            isbn,
            description,
            genre,
            publisher,
            publication_year,
            total_copies,
            available_copies,
        } = value;
        UpdateBook {
            book_id,
            title,
            author,
            isbn,
            description,
            genre,
            publisher,
            publication_year,
            total_copies,
            available_copies,
        }
    }
}

pub(crate) fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Validate)]
pub struct BookListQuery {
    #[garde(range(min = 0, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[garde(range(min = 0))]
    #[serde(default)]
    pub offset: i64,
}

impl From<BookListQuery> for BookListOptions {
    fn from(value: BookListQuery) -> Self {
        BookListOptions {
            limit: value.limit,
            offset: value.offset,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookSearchQuery {
    #[garde(skip)]
    pub query: Option<String>,
    #[garde(skip)]
    pub genre: Option<String>,
    #[garde(skip)]
    pub author: Option<String>,
    #[garde(skip)]
    pub publisher: Option<String>,
    #[garde(skip)]
    pub year_from: Option<i32>,
    #[garde(skip)]
    pub year_to: Option<i32>,
    #[garde(skip)]
    #[serde(default)]
    pub available: bool,
    #[garde(range(min = 0, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[garde(range(min = 0))]
    #[serde(default)]
    pub offset: i64,
}

impl BookSearchQuery {
    pub fn into_options(self) -> (BookSearchOptions, BookListOptions) {
        let BookSearchQuery {
            query,
            genre,
            author,
            publisher,
            year_from,
            year_to,
            available,
            limit,
            offset,
        } = self;
        (
            BookSearchOptions {
                query,
                genre,
                author,
                publisher,
                year_from,
                year_to,
                available_only: available,
            },
            BookListOptions { limit, offset },
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub description: String,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl From<Book> for BookResponse {
    fn from(value: Book) -> Self {
        let Book {
            id,
            title,
            author,
            isbn,
            description,
            genre,
            publisher,
            publication_year,
            total_copies,
            available_copies,
        } = value;
        BookResponse {
            id,
            title,
            author,
            isbn,
            description,
            genre,
            publisher,
            publication_year,
            total_copies,
            available_copies,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedBookResponse {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub items: Vec<BookResponse>,
}

impl From<PaginatedList<Book>> for PaginatedBookResponse {
    fn from(value: PaginatedList<Book>) -> Self {
        let PaginatedList {
            total,
            limit,
            offset,
            items,
        } = value;
        PaginatedBookResponse {
            total,
            limit,
            offset,
            items: items.into_iter().map(BookResponse::from).collect(),
        }
    }
}
