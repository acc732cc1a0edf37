// src/middlewares/middleware.rs

use crate::middlewares::{cors, guard, rate_limiting, token};
use axum::{middleware, Router};

// Applies the application's global middleware stack to a router.

// Layers are applied from the outside in. The first `.layer()` call adds the
// outermost middleware, which will be the first to process a request.
// Request flow: CORS -> Rate Limiting -> Guard -> Token -> Router
pub fn stack(router: Router) -> Router {
    router
        .layer(middleware::from_fn(token::handler))
        .layer(middleware::from_fn(guard::handler))
        .layer(middleware::from_fn(rate_limiting::handler))
        .layer(middleware::from_fn(cors::handler))
}
