pub mod handlers;
pub mod multipart;

use crate::{
    auth::{AccountService, CredentialService},
    config::Config,
    error::{Result, StudioError},
    generation::{GenerationService, SimulationPolicy},
    models::generation::file_too_large,
    storage::{StorageManager, UploadStore},
};
use actix_cors::Cors;
use actix_web::{
    dev::{Payload, Server},
    error::{JsonPayloadError, QueryPayloadError},
    guard,
    http::header,
    middleware, web, App, FromRequest, HttpRequest, HttpServer,
};
use std::future::{ready, Ready};
use std::net::TcpListener;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state behind every handler.
pub struct AppState {
    pub accounts: AccountService,
    pub generations: Arc<GenerationService>,
    pub uploads: Arc<UploadStore>,
    pub storage: StorageManager,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &Config, storage: StorageManager) -> Self {
        let uploads = Arc::new(UploadStore::new(&config.uploads));
        let generations = Arc::new(GenerationService::new(
            storage.store(),
            Arc::clone(&uploads),
            SimulationPolicy::from(&config.simulation),
        ));
        Self {
            accounts: AccountService::new(storage.store(), CredentialService::new(&config.auth)),
            generations,
            uploads,
            storage,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for one request; fires when the server shuts down.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Caller identity taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = StudioError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| StudioError::Internal("application state not configured".to_string()))?;

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| StudioError::Unauthorized("Access token required".to_string()))?;

    let claims = state.accounts.credentials().verify_token(token)?;
    Ok(AuthenticatedUser {
        id: claims.user_id,
        email: claims.email,
    })
}

/// Base64 inflates the image by a third; leave room for the rest of the body.
fn json_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes / 3 * 4 + 64 * 1024
}

fn json_config(max_upload_bytes: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(json_body_limit(max_upload_bytes))
        .error_handler(move |err, _req| {
            let error = match err {
                JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
                    file_too_large(max_upload_bytes)
                }
                other => StudioError::Validation(format!("Invalid request body: {}", other)),
            };
            error.into()
        })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err: QueryPayloadError, _req| {
        StudioError::Validation(format!("Invalid query: {}", err)).into()
    })
}

/// Registers state, extractor settings and every route.
pub fn configure(state: web::Data<AppState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        let max_upload_bytes = state.uploads.max_bytes();
        cfg.app_data(state)
            .app_data(json_config(max_upload_bytes))
            .app_data(query_config())
            .service(
                web::scope("/api")
                    .route("/auth/signup", web::post().to(handlers::signup))
                    .route("/auth/login", web::post().to(handlers::login))
                    .route(
                        "/generations",
                        web::post()
                            .guard(guard::fn_guard(multipart::is_multipart))
                            .to(handlers::create_generation_form),
                    )
                    .route("/generations", web::post().to(handlers::create_generation))
                    .route("/generations", web::get().to(handlers::list_generations))
                    .route("/generations/{id}", web::get().to(handlers::get_generation)),
            )
            .route("/uploads/{filename}", web::get().to(handlers::serve_upload))
            .route("/health", web::get().to(handlers::health));
    }
}

/// Any origin may call the API; credentials travel in the bearer header.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(["GET", "POST", "OPTIONS"])
        .allowed_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(3600)
}

/// Starts the HTTP server on an already bound listener.
pub fn run(listener: TcpListener, state: web::Data<AppState>) -> Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .wrap(middleware::Logger::new("%r %s %b %Dms"))
            .configure(configure(state.clone()))
    })
    .listen(listener)?
    .run();
    Ok(server)
}

/// Builds storage and state from `config` and serves until shutdown.
pub async fn serve(config: Config) -> Result<()> {
    let storage = StorageManager::new(&config).await?;
    let state = web::Data::new(AppState::new(&config, storage));

    let address = ("0.0.0.0", config.port());
    let listener = TcpListener::bind(address)?;
    log::info!("🚀 Listening on http://{}:{}", address.0, address.1);

    let server = run(listener, state.clone())?;
    let handle = server.handle();
    let shutdown_state = state.clone();
    actix_web::rt::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("🛑 Shutdown requested, cancelling in-flight generations");
            shutdown_state.shutdown();
            handle.stop(true).await;
        }
    });

    server.await?;
    log::info!("👋 Server stopped");
    Ok(())
}
