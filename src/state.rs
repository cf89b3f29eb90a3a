use sqlx::PgPool;

/// Shared application state handed to every handler. The pool is the only
/// process-wide resource; repositories are constructed per request from it.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
