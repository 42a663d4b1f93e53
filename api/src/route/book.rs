use axum::{
    routing::{get, post},
    Router,
};
use registry::AppRegistry;

use crate::handler::{
    book::{
        delete_book, register_book, search_books, show_book, show_book_list, update_book,
    },
    loan::{borrow_book, show_book_loan_history},
};

pub fn build_book_routers() -> Router<AppRegistry> {
    let routers = Router::new()
        .route("/", get(show_book_list).post(register_book))
        .route("/search", get(search_books))
        .route(
            "/:book_id",
            get(show_book).put(update_book).delete(delete_book),
        )
        .route(
            "/:book_id/loans",
            get(show_book_loan_history).post(borrow_book),
        );

    Router::new().nest("/books", routers)
}
