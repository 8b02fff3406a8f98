use crate::{
    error::{Result, StudioError},
    models::{CreateGenerationBody, Credentials, GenerationRequest, GenerationResult, HistoryQuery},
    server::{multipart::read_generation_form, AppState, AuthenticatedUser},
};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn signup(
    state: web::Data<AppState>,
    body: web::Json<Credentials>,
) -> Result<HttpResponse> {
    let response = state.accounts.signup(&body).await?;
    Ok(HttpResponse::Created().json(response))
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<Credentials>,
) -> Result<HttpResponse> {
    let response = state.accounts.login(&body).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn create_generation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateGenerationBody>,
) -> Result<HttpResponse> {
    let request = GenerationRequest::try_from(body.into_inner())?;
    submit(&state, &user, request).await
}

/// Form variant of [`create_generation`]: `prompt`, `style`, `imageUpload`.
pub async fn create_generation_form(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: Multipart,
) -> Result<HttpResponse> {
    let request = read_generation_form(form, state.uploads.max_bytes()).await?;
    submit(&state, &user, request).await
}

async fn submit(
    state: &AppState,
    user: &AuthenticatedUser,
    request: GenerationRequest,
) -> Result<HttpResponse> {
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let generation = state.generations.create(user.id, &request, &cancel).await?;
    Ok(HttpResponse::Created().json(GenerationResult::from(generation)))
}

pub async fn list_generations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit()?;
    let results: Vec<GenerationResult> = state
        .generations
        .recent(user.id, limit)
        .await?
        .into_iter()
        .map(GenerationResult::from)
        .collect();
    Ok(HttpResponse::Ok().json(results))
}

pub async fn get_generation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id: i64 = path
        .parse()
        .map_err(|_| StudioError::NotFound("Generation not found".to_string()))?;
    let generation = state.generations.get(user.id, id).await?;
    Ok(HttpResponse::Ok().json(GenerationResult::from(generation)))
}

pub async fn serve_upload(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let (bytes, content_type) = state.uploads.read(&path).await?;
    Ok(HttpResponse::Ok().content_type(content_type).body(bytes))
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.storage.health_check().await {
        Ok(true) => HttpResponse::Ok().json(json!({ "status": "ok", "storage": "ok" })),
        Ok(false) | Err(_) => HttpResponse::ServiceUnavailable()
            .json(json!({ "status": "degraded", "storage": "unavailable" })),
    }
}
