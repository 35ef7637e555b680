use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{DecisionCache, MembershipSource, StaticDirectory};
use crate::docs::ApiDoc;
use crate::events::{init_event_bus, EventBus};
use crate::models::permission::ResourceCatalog;
use crate::registry::TenantRegistries;
use crate::routes::{check, health, roles, tenants};

#[derive(Clone)]
pub struct AppState {
    pub registries: Arc<TenantRegistries>,
    pub cache: Arc<DecisionCache>,
    pub directory: Arc<dyn MembershipSource>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(directory: Arc<dyn MembershipSource>, cache_capacity: usize) -> Self {
        let catalog = Arc::new(ResourceCatalog::with_defaults());
        let (event_bus, _) = init_event_bus();
        Self {
            registries: Arc::new(TenantRegistries::new(catalog)),
            cache: Arc::new(DecisionCache::new(cache_capacity)),
            directory,
            event_bus,
        }
    }

    /// State wired from environment variables, backed by the in-memory
    /// membership directory.
    pub fn from_env() -> Self {
        let capacity = std::env::var("AUTHZ_CACHE_CAPACITY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(crate::authz::DEFAULT_CACHE_CAPACITY);
        Self::new(Arc::new(StaticDirectory::new()), capacity)
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .merge(tenants::routes())
        .merge(roles::routes())
        .merge(check::routes())
        .route("/api/health", get(health::health))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
