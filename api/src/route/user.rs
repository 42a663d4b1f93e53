use axum::{routing::get, Router};
use registry::AppRegistry;

use crate::handler::{loan::show_user_loans, user::get_current_user};

pub fn build_user_routers() -> Router<AppRegistry> {
    let routers = Router::new()
        .route("/me", get(get_current_user))
        .route("/:user_id/loans", get(show_user_loans));

    Router::new().nest("/users", routers)
}
