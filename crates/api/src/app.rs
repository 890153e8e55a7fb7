use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::{AllocationService, ContributionService, InventoryService, InviteStore};
use shared::jwt::{AdminTokenConfig, JwtError};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_admin, trace_id,
    RateLimiterState,
};
use crate::routes::{admin, auth, codes, health};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn InviteStore>,
    pub allocation: AllocationService,
    pub contribution: ContributionService,
    pub inventory: InventoryService,
    pub tokens: AdminTokenConfig,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
}

impl AppState {
    /// Wires the services over `store`. Fails only on an unusable token secret.
    pub fn new(config: Config, store: Arc<dyn InviteStore>) -> Result<Self, JwtError> {
        let config = Arc::new(config);
        let policy = config.codes.policy();
        let tokens =
            AdminTokenConfig::new(&config.admin.jwt_secret, config.admin.token_expiry_secs)?;

        // Rate limiting is enabled when rate_limit_per_minute > 0
        let rate_limiter = RateLimiterState::new(config.security.rate_limit_per_minute).map(Arc::new);

        Ok(Self {
            allocation: AllocationService::new(store.clone()),
            contribution: ContributionService::new(store.clone(), policy),
            inventory: InventoryService::new(store.clone(), policy),
            store,
            tokens,
            rate_limiter,
            config,
        })
    }
}

pub fn create_app(config: Config, store: Arc<dyn InviteStore>) -> Result<Router, JwtError> {
    let state = AppState::new(config, store)?;
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Public code routes that change state, limited per caller
    let code_routes = Router::new()
        .route("/api/codes/request", post(codes::request_code))
        .route("/api/codes/contribute", post(codes::contribute_code))
        .route("/api/codes/feedback", post(codes::submit_feedback))
        .route("/api/codes/mark-used", post(codes::mark_used))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    // Admin inventory routes (require a bearer session token)
    let admin_routes = Router::new()
        .route(
            "/api/admin/codes",
            get(admin::list_codes).post(admin::add_codes),
        )
        .route(
            "/api/admin/codes/:code_id",
            get(admin::get_code)
                .patch(admin::update_code_status)
                .delete(admin::delete_code),
        )
        .route("/api/admin/codes/:code_id/usages", get(admin::list_usages))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler))
        .route("/api/codes/stats", get(codes::get_stats))
        .route("/api/admin/login", post(auth::login))
        .route("/api/admin/check", get(auth::check));

    Router::new()
        .merge(public_routes)
        .merge(code_routes)
        .merge(admin_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
