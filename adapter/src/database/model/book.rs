use kernel::model::{book::Book, id::BookId};

#[derive(sqlx::FromRow)]
pub struct BookRow {
    pub book_id: BookId,
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

impl From<BookRow> for Book {
    fn from(value: BookRow) -> Self {
        let BookRow {
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
        } = value;
        Book {
            id: book_id,
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

// 貸出・返却時に行ロックと合わせて取得する在庫数のスナップショット
#[derive(sqlx::FromRow)]
pub struct BookStockRow {
    pub book_id: BookId,
    pub total_copies: i32,
    pub available_copies: i32,
}
