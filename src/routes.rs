// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, parts, progress, quiz, timed_tasks},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Public: registration, login and the list of available modules.
/// * Everything else below `/api/parts` requires a bearer token; access to
///   individual parts is decided by the policy inside the handlers.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let require_auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let protected_part_routes = Router::new()
        .route(
            "/{pid}",
            get(parts::get_part)
                .put(parts::update_part)
                .delete(parts::delete_part),
        )
        .route("/{pid}/status", put(parts::change_status))
        .route("/{pid}/enrolment", post(parts::enrol).delete(parts::deenrol))
        .route(
            "/{pid}/templates",
            get(parts::list_templates).post(parts::create_template),
        )
        .route("/{pid}/progress", get(progress::get_progress))
        .route("/{pid}/progress/duration", post(progress::record_duration))
        .route("/{pid}/reset-files", post(progress::reset_files))
        .route(
            "/{pid}/files/{fid}",
            get(progress::get_file).put(progress::update_file),
        )
        .route(
            "/{pid}/timed-tasks",
            get(timed_tasks::list_tasks).post(timed_tasks::create_task),
        )
        .route(
            "/{pid}/timed-tasks/{tid}",
            put(timed_tasks::update_task).delete(timed_tasks::delete_task),
        )
        .route(
            "/{pid}/quiz/answers",
            post(quiz::set_answer).get(quiz::check_answer),
        )
        .route_layer(require_auth.clone());

    // Listing modules is public, creating one is not.
    let part_routes = Router::new()
        .route(
            "/",
            get(parts::list_modules).merge(post(parts::create_part).route_layer(require_auth)),
        )
        .merge(protected_part_routes);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/parts", part_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
