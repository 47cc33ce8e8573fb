//! HTTP transport: router, middleware stack, handlers, and server lifecycle.

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use extract::Ctx;
pub use handlers::AppState;
pub use middleware::apply_http_layers;
pub use module::HttpModule;
