use async_trait::async_trait;
use derive_new::new;
use kernel::{
    model::{
        book::{
            event::{CreateBook, DeleteBook, UpdateBook},
            Book, BookListOptions, BookSearchOptions,
        },
        id::BookId,
        list::PaginatedList,
    },
    repository::book::BookRepository,
};
use shared::error::{AppError, AppResult};
use sqlx::{Postgres, QueryBuilder};

use crate::database::{model::book::BookRow, ConnectionPool};

const BOOK_COLUMNS: &str = "book_id, title, author, isbn, description, genre, publisher, \
     publication_year, total_copies, available_copies";

#[derive(new)]
pub struct BookRepositoryImpl {
    db: ConnectionPool,
}

// 管理者によるカタログ更新でも在庫数の不変条件は守らせる
fn validate_copies(total_copies: i32, available_copies: i32) -> AppResult<()> {
    if total_copies < 0 || available_copies < 0 || available_copies > total_copies {
        return Err(AppError::UnprocessableEntity(format!(
            "在庫数が不正です: total={total_copies}, available={available_copies}"
        )));
    }
    Ok(())
}

fn push_search_filters(builder: &mut QueryBuilder<'_, Postgres>, options: &BookSearchOptions) {
    builder.push(" WHERE TRUE");
    if let Some(query) = options.query.as_deref().filter(|q| !q.trim().is_empty()) {
        let pattern = format!("%{}%", query.trim());
        builder.push(" AND (title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR author ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR isbn ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR genre ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR publisher ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(genre) = options.genre.as_deref().filter(|v| !v.trim().is_empty()) {
        builder.push(" AND genre ILIKE ");
        builder.push_bind(format!("%{}%", genre.trim()));
    }
    if let Some(author) = options.author.as_deref().filter(|v| !v.trim().is_empty()) {
        builder.push(" AND author ILIKE ");
        builder.push_bind(format!("%{}%", author.trim()));
    }
    if let Some(publisher) = options
        .publisher
        .as_deref()
        .filter(|v| !v.trim().is_empty())
    {
        builder.push(" AND publisher ILIKE ");
        builder.push_bind(format!("%{}%", publisher.trim()));
    }
    if let Some(year_from) = options.year_from {
        builder.push(" AND publication_year >= ");
        builder.push_bind(year_from);
    }
    if let Some(year_to) = options.year_to {
        builder.push(" AND publication_year <= ");
        builder.push_bind(year_to);
    }
    if options.available_only {
        builder.push(" AND available_copies > 0");
    }
}

#[async_trait]
impl BookRepository for BookRepositoryImpl {
    async fn create(&self, event: CreateBook) -> AppResult<Book> {
        validate_copies(event.total_copies, event.available_copies)?;

        let row = sqlx::query_as::<_, BookRow>(&format!(
            r#"
            INSERT INTO books
                (book_id, title, author, isbn, description, genre, publisher,
                 publication_year, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(BookId::new())
        .bind(event.title)
        .bind(event.author)
        .bind(event.isbn)
        .bind(event.description)
        .bind(event.genre)
        .bind(event.publisher)
        .bind(event.publication_year)
        .bind(event.total_copies)
        .bind(event.available_copies)
        .fetch_one(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.into())
    }

    async fn update(&self, event: UpdateBook) -> AppResult<Book> {
        validate_copies(event.total_copies, event.available_copies)?;

        let row = sqlx::query_as::<_, BookRow>(&format!(
            r#"
            UPDATE books
            SET title = $2, author = $3, isbn = $4, description = $5, genre = $6,
                publisher = $7, publication_year = $8, total_copies = $9,
                available_copies = $10
            WHERE book_id = $1
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(event.book_id)
        .bind(event.title)
        .bind(event.author)
        .bind(event.isbn)
        .bind(event.description)
        .bind(event.genre)
        .bind(event.publisher)
        .bind(event.publication_year)
        .bind(event.total_copies)
        .bind(event.available_copies)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?
        .ok_or_else(|| AppError::EntityNotFound("指定された蔵書が見つかりませんでした".into()))?;

        Ok(row.into())
    }

    async fn delete(&self, event: DeleteBook) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM books WHERE book_id = $1")
            .bind(event.book_id)
            .execute(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;
        if res.rows_affected() < 1 {
            return Err(AppError::EntityNotFound(
                "指定された蔵書が見つかりませんでした".into(),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, book_id: BookId) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE book_id = $1"
        ))
        .bind(book_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.map(Book::from))
    }

    async fn find_all(&self, options: BookListOptions) -> AppResult<PaginatedList<Book>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books")
            .fetch_one(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

        let rows = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY title LIMIT $1 OFFSET $2"
        ))
        .bind(options.limit)
        .bind(options.offset)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(PaginatedList {
            total,
            limit: options.limit,
            offset: options.offset,
            items: rows.into_iter().map(Book::from).collect(),
        })
    }

    async fn search(
        &self,
        options: BookSearchOptions,
        list_options: BookListOptions,
    ) -> AppResult<PaginatedList<Book>> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM books");
        push_search_filters(&mut count_builder, &options);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

        let mut builder = QueryBuilder::new(format!("SELECT {BOOK_COLUMNS} FROM books"));
        push_search_filters(&mut builder, &options);
        builder.push(" ORDER BY title LIMIT ");
        builder.push_bind(list_options.limit);
        builder.push(" OFFSET ");
        builder.push_bind(list_options.offset);

        let rows: Vec<BookRow> = builder
            .build_query_as()
            .fetch_all(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

        Ok(PaginatedList {
            total,
            limit: list_options.limit,
            offset: list_options.offset,
            items: rows.into_iter().map(Book::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_counts_must_stay_within_bounds() {
        assert!(validate_copies(3, 3).is_ok());
        assert!(validate_copies(3, 0).is_ok());
        assert!(matches!(
            validate_copies(3, 4),
            Err(AppError::UnprocessableEntity(_))
        ));
        assert!(matches!(
            validate_copies(-1, 0),
            Err(AppError::UnprocessableEntity(_))
        ));
        assert!(matches!(
            validate_copies(3, -1),
            Err(AppError::UnprocessableEntity(_))
        ));
    }
}
