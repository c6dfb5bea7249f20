//! HTTP surface of the block server

pub mod context;
pub mod handlers;
pub mod response;
pub mod route;
pub mod sink;

use actix_web::web;
use route::{FILES_ROOT, FILES_ROUTE};

/// Register the gateway routes. Expects `web::Data<AppState>` on the app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .service(web::resource(FILES_ROOT).to(handlers::reject_route))
        .service(
            web::resource(FILES_ROUTE)
                .route(web::get().to(handlers::get_file))
                .route(web::post().to(handlers::post_file))
                .route(web::delete().to(handlers::delete_file)),
        );
}
