//! HTTP server assembly
//! Mission: Wire stores, the auth layer and every route into one axum router

use crate::{
    accounts::{admin_api, client_api},
    api::ApiError,
    auth::{
        api as auth_api, auth_middleware,
        models::{Account, AccountKind, AccountStatus, Claims, NewAccount},
        AccountStore, AuthService, JwtHandler,
    },
    config::AppConfig,
    middleware::{rate_limit_middleware, request_logging, RateLimitConfig, RateLimitLayer},
    roles::{api as roles_api, RoleStore},
};
use anyhow::Result;
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

pub const API_PREFIX: &str = "/api/v1";

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub accounts: Arc<AccountStore>,
    pub roles: Arc<RoleStore>,
}

impl AppState {
    /// Open the stores, seed the bootstrap admin and build the auth layer
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let accounts = Arc::new(AccountStore::new(&config.db_path, config.bcrypt_cost)?);
        let roles = Arc::new(RoleStore::new(&config.db_path)?);
        let jwt = Arc::new(JwtHandler::new(
            &config.access_token_secret,
            config.access_token_life_secs,
        ));

        seed_bootstrap_admin(
            &accounts,
            &roles,
            &config.bootstrap_admin_email,
            &config.bootstrap_admin_password,
        )?;

        Ok(Self {
            auth: AuthService::new(accounts.clone(), jwt),
            accounts,
            roles,
        })
    }

    /// The live, active admin behind the token
    pub fn current_admin(&self, claims: &Claims) -> Result<Account, ApiError> {
        self.current_account(claims, AccountKind::Admin)
    }

    /// The live, active client behind the token
    pub fn current_client(&self, claims: &Claims) -> Result<Account, ApiError> {
        self.current_account(claims, AccountKind::Client)
    }

    fn current_account(&self, claims: &Claims, kind: AccountKind) -> Result<Account, ApiError> {
        if claims.kind != kind {
            return Err(ApiError::Forbidden);
        }
        let id = claims.account_id().ok_or(ApiError::Unauthorized)?;
        let account = self
            .accounts
            .get_by_id(&id)?
            .filter(|a| a.kind == kind)
            .ok_or(ApiError::Unauthorized)?;

        if !account.is_active() {
            return Err(ApiError::AccountBlocked);
        }
        Ok(account)
    }

    /// Resolve the caller's role permissions and require `key`
    pub fn require_permission(&self, claims: &Claims, key: &str) -> Result<Account, ApiError> {
        let admin = self.current_admin(claims)?;
        let permissions = self.roles.permissions_for(admin.role_id.as_ref())?;

        if !permissions.allows(key) {
            debug!(account_id = %admin.id, permission = key, "Permission denied");
            return Err(ApiError::Forbidden);
        }
        Ok(admin)
    }
}

/// Ensure the "Super Admin" role exists and, when no admin account exists yet,
/// create the bootstrap admin bound to it.
pub fn seed_bootstrap_admin(
    accounts: &AccountStore,
    roles: &RoleStore,
    email: &str,
    password: &str,
) -> Result<()> {
    let role = roles.ensure_super_admin()?;

    if accounts.count(AccountKind::Admin)? > 0 {
        return Ok(());
    }

    accounts.create_account(&NewAccount {
        kind: AccountKind::Admin,
        full_name: "Administrator".to_string(),
        email: email.to_string(),
        password: password.to_string(),
        phone: None,
        avatar: None,
        role_id: Some(role.id),
        status: AccountStatus::Active,
    })?;

    info!(email = %email, "Bootstrap admin account created");
    if password == "admin123" {
        warn!("Bootstrap admin uses the default password, change it in production");
    }
    Ok(())
}

/// Build the full router. Routes live under [`API_PREFIX`]; `/health` sits at the root.
pub fn build_router(state: AppState, limiter: RateLimitLayer) -> Router {
    let login_routes = Router::new()
        .route("/admin/auth/login", post(auth_api::admin_login))
        .route("/auth/login", post(auth_api::client_login))
        .route("/auth/register", post(auth_api::client_register))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

    let refresh_routes = Router::new()
        .route("/admin/auth/refresh", post(auth_api::admin_refresh))
        .route("/auth/refresh", post(auth_api::client_refresh));

    let protected_routes = Router::new()
        .route("/admin/roles", get(roles_api::list_roles))
        .route("/admin/roles/create", post(roles_api::create_role))
        .route("/admin/roles/permissions", get(roles_api::my_permissions))
        .route(
            "/admin/roles/permissions/:role_id",
            patch(roles_api::update_permissions),
        )
        .route("/admin/accounts", get(admin_api::index))
        .route("/admin/accounts/detail/:account_id", get(admin_api::detail))
        .route("/admin/accounts/create", post(admin_api::create))
        .route("/admin/accounts/edit/:account_id", patch(admin_api::edit))
        .route(
            "/admin/accounts/change-status/:status/:account_id",
            patch(admin_api::change_status),
        )
        .route(
            "/admin/accounts/delete/:account_id",
            delete(admin_api::delete),
        )
        .route("/accounts/detail/local", get(client_api::local_detail))
        .route(
            "/accounts/detail/:account_type/:id",
            get(client_api::detail),
        )
        .route(
            "/accounts/favorite-posts",
            patch(client_api::toggle_favorite),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .merge(login_routes)
        .merge(refresh_routes)
        .merge(protected_routes)
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "Realty backend operational"
}

/// Login limiter settings derived from configuration
pub fn login_rate_limit(config: &AppConfig) -> RateLimitConfig {
    RateLimitConfig {
        max_requests: config.login_rate_limit,
        window: Duration::from_secs(60),
        ..RateLimitConfig::default()
    }
}
