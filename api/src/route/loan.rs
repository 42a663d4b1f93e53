use axum::{
    routing::{get, put},
    Router,
};
use registry::AppRegistry;

use crate::handler::loan::{return_book, show_my_loans};

pub fn build_loan_routers() -> Router<AppRegistry> {
    let routers = Router::new()
        .route("/me", get(show_my_loans))
        .route("/:loan_id/returned", put(return_book));

    Router::new().nest("/loans", routers)
}
