use axum::Router;
use registry::AppRegistry;

pub mod auth;
pub mod book;
pub mod health;
pub mod loan;
pub mod user;

pub fn routes() -> Router<AppRegistry> {
    let api_routers = Router::new()
        .merge(auth::build_auth_routers())
        .merge(book::build_book_routers())
        .merge(loan::build_loan_routers())
        .merge(user::build_user_routers());

    Router::new()
        .merge(health::build_health_check_routers())
        .nest("/api", api_routers)
}
