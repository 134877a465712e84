//! HTTP surface (spec section 6): handlers plus [`build_router`], which layers middleware
//! outermost-to-innermost as body-size-limit, CORS, tracing, request-id, rate-limiting,
//! auth-context-extraction, then metrics, matching the corpus's `tower`/`tower-http` plus
//! hand-rolled-middleware composition style.

use crate::auth::{AuthContext, Permission};
use crate::dto::{
    AsyncJobAccepted, JobResponse, LifecycleResponse, OptimizeRequest, OptimizeResponse, ParityRequest, ParityResponse,
    VersionsResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::idempotency::BeginOutcome;
use crate::middleware::{auth_context_middleware, metrics_middleware, rate_limit_middleware, request_id_middleware};
use crate::service::OrchestrationService;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use flowforge_core::enums::{AgentLifecycle, JobType};
use flowforge_core::error::ForgeError;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers.get("idempotency-key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

async fn optimize(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(req): Json<OptimizeRequest>,
) -> ApiResult<Response> {
    ctx.require_permission(Permission::OptimizeRun)?;

    let scope = format!("{}:optimize", ctx.tenant_id);
    let idempotency = idempotency_key(&headers);
    if let Some(key) = &idempotency {
        if let BeginOutcome::Replay(response) = state.idempotency.begin(&scope, key)? {
            return Ok(Json(response).into_response());
        }
    }

    let service = OrchestrationService::new(
        Arc::clone(&state.repository),
        Arc::clone(&state.artifact_store),
        Arc::clone(&state.settings),
    );
    let result = service
        .optimize(&ctx, &req.agent_name, &req.task_desc, req.dataset_size, &req.profile, req.seed)
        .await;

    match result {
        Ok(response) => {
            let body = serde_json::to_value(&response).map_err(ForgeError::from)?;
            if let Some(key) = &idempotency {
                state.idempotency.complete(&scope, key, body.clone());
            }
            Ok((StatusCode::OK, Json(response)).into_response())
        }
        Err(err) => {
            if let Some(key) = &idempotency {
                state.idempotency.discard(&scope, key);
            }
            Err(ApiError::from(err))
        }
    }
}

async fn optimize_async(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<OptimizeRequest>,
) -> ApiResult<Response> {
    ctx.require_permission(Permission::OptimizeRun)?;

    let repository = Arc::clone(&state.repository);
    let artifact_store = Arc::clone(&state.artifact_store);
    let settings = Arc::clone(&state.settings);
    let ctx_owned = ctx.clone();
    let agent_name = req.agent_name.clone();

    let future: crate::jobs::JobFuture = Box::pin(async move {
        let service = OrchestrationService::new(repository, artifact_store, settings);
        let result: OptimizeResponse = service
            .optimize(&ctx_owned, &req.agent_name, &req.task_desc, req.dataset_size, &req.profile, req.seed)
            .await?;
        serde_json::to_value(result).map_err(ForgeError::from)
    });

    let record = state
        .jobs
        .submit(JobType::Optimize, &ctx.tenant_id, &agent_name, HashMap::new(), future)
        .await;

    Ok((StatusCode::ACCEPTED, Json(AsyncJobAccepted { job_id: record.job_id, status: record.status })).into_response())
}

async fn benchmark_manual_parity(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<ParityRequest>,
) -> ApiResult<Json<ParityResponse>> {
    ctx.require_permission(Permission::ParityRun)?;
    let service = OrchestrationService::new(
        Arc::clone(&state.repository),
        Arc::clone(&state.artifact_store),
        Arc::clone(&state.settings),
    );
    let response = service
        .benchmark_manual_parity(
            &ctx,
            &req.agent_name,
            &req.task_desc,
            &req.manual_blueprint_path,
            req.dataset_size,
            req.seed,
            req.parity_margin,
        )
        .await?;
    Ok(Json(response))
}

async fn benchmark_manual_parity_async(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<ParityRequest>,
) -> ApiResult<Response> {
    ctx.require_permission(Permission::ParityRun)?;

    let repository = Arc::clone(&state.repository);
    let artifact_store = Arc::clone(&state.artifact_store);
    let settings = Arc::clone(&state.settings);
    let ctx_owned = ctx.clone();
    let agent_name = req.agent_name.clone();

    let future: crate::jobs::JobFuture = Box::pin(async move {
        let service = OrchestrationService::new(repository, artifact_store, settings);
        let response = service
            .benchmark_manual_parity(
                &ctx_owned,
                &req.agent_name,
                &req.task_desc,
                &req.manual_blueprint_path,
                req.dataset_size,
                req.seed,
                req.parity_margin,
            )
            .await?;
        serde_json::to_value(response).map_err(ForgeError::from)
    });

    let record = state
        .jobs
        .submit(JobType::ManualParity, &ctx.tenant_id, &agent_name, HashMap::new(), future)
        .await;

    Ok((StatusCode::ACCEPTED, Json(AsyncJobAccepted { job_id: record.job_id, status: record.status })).into_response())
}

async fn list_versions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(agent_name): Path<String>,
) -> ApiResult<Json<VersionsResponse>> {
    ctx.require_permission(Permission::VersionsRead)?;
    let scoped = ctx.scoped_agent_name(&agent_name);
    let versions = state.repository.list_versions(&scoped).await?;
    Ok(Json(VersionsResponse { agent_name, versions }))
}

async fn deploy_version(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((agent_name, version)): Path<(String, u32)>,
) -> ApiResult<Json<LifecycleResponse>> {
    ctx.require_permission(Permission::VersionsDeploy)?;
    let scoped = ctx.scoped_agent_name(&agent_name);
    state.repository.set_lifecycle(&scoped, version, AgentLifecycle::Deployed).await?;
    Ok(Json(LifecycleResponse { agent_name, version, lifecycle: AgentLifecycle::Deployed }))
}

/// Rollback is a literal alias of deploy: it re-promotes an earlier version to `Deployed`,
/// demoting whatever is currently deployed, the same transition `deploy_version` performs.
async fn rollback_version(
    state: State<AppState>,
    ctx: Extension<AuthContext>,
    path: Path<(String, u32)>,
) -> ApiResult<Json<LifecycleResponse>> {
    ctx.0.require_permission(Permission::VersionsRollback)?;
    deploy_version(state, ctx, path).await
}

async fn get_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let record = state
        .jobs
        .get(&ctx.tenant_id, &job_id)
        .ok_or_else(|| ForgeError::NotFound(format!("job '{job_id}' not found")))?;
    Ok(Json(JobResponse::from(record)))
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/agents/optimize", post(optimize))
        .route("/v1/agents/optimize/async", post(optimize_async))
        .route("/v1/agents/{agent_name}/versions", get(list_versions))
        .route("/v1/agents/{agent_name}/versions/{version}/deploy", post(deploy_version))
        .route("/v1/agents/{agent_name}/versions/{version}/rollback", post(rollback_version))
        .route("/v1/agents/benchmark/manual-parity", post(benchmark_manual_parity))
        .route("/v1/agents/benchmark/manual-parity/async", post(benchmark_manual_parity_async))
        .route("/v1/agents/jobs/{job_id}", get(get_job))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_context_middleware));

    let public = Router::new().route("/healthz", get(healthz)).route("/metrics", get(metrics));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(state.settings.http_body_limit_bytes))
                .layer(CorsLayer::permissive())
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), metrics_middleware)),
        )
        .with_state(state)
}
