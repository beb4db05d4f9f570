#![deny(unsafe_code)]

pub mod error;
pub mod queue;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use greeting_adapters::{
    AcceptAllLedger, AlwaysDeclineLedger, ConfirmedCodesLedger, FixtureMusicCatalog,
    FixturePoemCatalog, ManualReviewLedger, TemplateSuggestionSource,
};
use greeting_core::tokens::hash_secret;
use greeting_core::{
    ContentDraft, ContentSources, CreatedGreeting, GreetingEngine, GreetingEngineConfig,
    GreetingError, GreetingView, LedgerEntry, LedgerEntryKind, ManagementView,
    ManualPaymentReceipt, PaymentLedger, PaymentMethod, PaymentState, Poem, PoemQuery,
    ResponseReceipt, RevealReceipt, ReviewDecision, StoreConfig, Suggestion, SuggestionRequest,
    Track, UnlockReceipt,
};
use queue::{PendingReview, ReviewQueue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::{ApiError, ErrorResponse, ServiceError};

/// Header carrying the owner token on fetch.
pub const OWNER_TOKEN_HEADER: &str = "x-owner-token";

/// Header carrying the operator credential on review and ledger routes.
pub const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";

/// Which payment ledger the engine consults for submitted codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PaymentLedgerConfig {
    /// Nothing confirms on its own; every publish payment goes to the review queue.
    #[default]
    Manual,
    AcceptAll,
    ConfirmedCodes(Vec<String>),
    AlwaysDecline(String),
}

impl PaymentLedgerConfig {
    pub fn build(&self) -> Arc<dyn PaymentLedger> {
        match self {
            Self::Manual => Arc::new(ManualReviewLedger),
            Self::AcceptAll => Arc::new(AcceptAllLedger),
            Self::ConfirmedCodes(codes) => Arc::new(ConfirmedCodesLedger::new(codes.clone())),
            Self::AlwaysDecline(reason) => Arc::new(AlwaysDeclineLedger::new(reason.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub review_queue_path: PathBuf,
    pub store: StoreConfig,
    pub payment_ledger: PaymentLedgerConfig,
    /// Credential for review and ledger routes. Without one those routes refuse everyone.
    pub operator_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            review_queue_path: PathBuf::from("data/reviews.json"),
            store: StoreConfig::Memory,
            payment_ledger: PaymentLedgerConfig::Manual,
            operator_token: None,
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<GreetingEngine>,
    pub queue: Arc<Mutex<ReviewQueue>>,
    pub sources: ContentSources,
    operator_token_hash: Option<Arc<str>>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let ServiceConfig {
            review_queue_path,
            store,
            payment_ledger,
            operator_token,
        } = config;

        let engine =
            GreetingEngine::bootstrap(GreetingEngineConfig { store }, payment_ledger.build())
                .await?;
        let queue = ReviewQueue::load(review_queue_path)?;
        info!(
            queue = %queue.path().display(),
            pending = queue.list().len(),
            "Review queue loaded"
        );

        let operator_token_hash: Option<Arc<str>> = operator_token
            .filter(|token| !token.trim().is_empty())
            .map(|token| Arc::from(hash_secret(&token)));
        if operator_token_hash.is_none() {
            warn!("No operator token configured; review and ledger routes are disabled");
        }

        let sources = ContentSources::new(
            Arc::new(TemplateSuggestionSource),
            Arc::new(FixtureMusicCatalog::default()),
            Arc::new(FixturePoemCatalog::default()),
        );

        Ok(Self {
            engine: Arc::new(engine),
            queue: Arc::new(Mutex::new(queue)),
            sources,
            operator_token_hash,
        })
    }

    /// Check the operator credential sent with a request.
    pub fn authorize_operator(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = self.operator_token_hash.as_deref() else {
            return Err(ApiError::unauthorized("operator routes are disabled"));
        };
        let presented = headers
            .get(OPERATOR_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ApiError::unauthorized("operator credential required"))?;

        if hash_secret(presented) != expected {
            warn!("Rejected operator request with a wrong credential");
            return Err(ApiError::unauthorized("operator credential rejected"));
        }
        Ok(())
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/greetings", post(create_greeting))
        .route("/v1/greetings/:id", get(fetch_greeting))
        .route("/v1/greetings/:id/unlock", post(unlock_greeting))
        .route("/v1/greetings/:id/payments/manual", post(submit_manual_payment))
        .route("/v1/greetings/:id/payments/reveal", post(submit_reveal_payment))
        .route("/v1/greetings/:id/response", post(record_response))
        .route("/v1/manage/:owner_token", get(management_view))
        .route("/v1/reviews/pending", get(list_pending))
        .route("/v1/reviews/:id/approve", post(approve_pending))
        .route("/v1/reviews/:id/reject", post(reject_pending))
        .route("/v1/ledger/entries", get(list_ledger_entries))
        .route("/v1/suggestions", post(suggest))
        .route("/v1/catalog/music", get(search_music))
        .route("/v1/catalog/poems", get(find_poems))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Submit a creator payment and keep the review queue in step with the outcome.
pub async fn submit_manual_payment_with_queue(
    state: &ServiceState,
    greeting_id: &str,
    code: &str,
    method: PaymentMethod,
) -> Result<ManualPaymentReceipt, ApiError> {
    let receipt = state
        .engine
        .submit_manual_payment(greeting_id, code, method)
        .await?;

    let mut queue = state.queue.lock().await;
    if receipt.payment_state == PaymentState::PendingManualReview {
        queue.upsert(greeting_id, code.trim(), method)?;
    } else {
        let _ = queue.remove(greeting_id)?;
    }

    Ok(receipt)
}

pub async fn list_pending_items(state: &ServiceState) -> Result<Vec<PendingReview>, ApiError> {
    let queue = state.queue.lock().await;
    Ok(queue.list())
}

pub async fn approve_pending_review(
    state: &ServiceState,
    greeting_id: &str,
    reviewer_id: String,
    note: Option<String>,
) -> Result<ManagementView, ApiError> {
    let pending = pending_review(state, greeting_id).await?;
    let result = state
        .engine
        .approve_manual_review(
            greeting_id,
            ReviewDecision {
                reviewer_id,
                method: pending.method,
                note,
            },
        )
        .await;
    settle_queue_entry(state, greeting_id, &result).await?;
    Ok(result?)
}

pub async fn reject_pending_review(
    state: &ServiceState,
    greeting_id: &str,
    reviewer_id: String,
    note: Option<String>,
) -> Result<ManagementView, ApiError> {
    let pending = pending_review(state, greeting_id).await?;
    let result = state
        .engine
        .reject_manual_review(
            greeting_id,
            ReviewDecision {
                reviewer_id,
                method: pending.method,
                note,
            },
        )
        .await;
    settle_queue_entry(state, greeting_id, &result).await?;
    Ok(result?)
}

async fn pending_review(state: &ServiceState, greeting_id: &str) -> Result<PendingReview, ApiError> {
    let queue = state.queue.lock().await;
    queue.get(greeting_id).cloned().ok_or_else(|| {
        ApiError::not_found(format!("pending review for '{greeting_id}' not found"))
    })
}

/// Drop the queue entry once the greeting has left manual review, including when the
/// engine reports it already moved on.
async fn settle_queue_entry(
    state: &ServiceState,
    greeting_id: &str,
    result: &Result<ManagementView, GreetingError>,
) -> Result<(), ApiError> {
    if matches!(result, Ok(_) | Err(GreetingError::VerificationMismatch(_))) {
        let mut queue = state.queue.lock().await;
        let _ = queue.remove(greeting_id)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    store_backend: &'static str,
    ledger_backend: &'static str,
    payment_ledger: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "greeting-service",
        store_backend: state.engine.store_backend(),
        ledger_backend: state.engine.ledger_backend().await,
        payment_ledger: state.engine.payment_ledger_id(),
    })
}

async fn create_greeting(
    State(state): State<ServiceState>,
    Json(draft): Json<ContentDraft>,
) -> Result<(StatusCode, Json<CreatedGreeting>), ApiError> {
    let created = state.engine.create(&draft).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FetchQuery {
    preview: Option<bool>,
}

async fn fetch_greeting(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    Query(query): Query<FetchQuery>,
    headers: HeaderMap,
) -> Result<Json<GreetingView>, ApiError> {
    let owner_token = headers
        .get(OWNER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty());
    let preview = query.preview.unwrap_or(false);

    Ok(Json(state.engine.fetch(&id, owner_token, preview).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct UnlockRequest {
    answer: String,
}

async fn unlock_greeting(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<UnlockRequest>,
) -> Result<Json<UnlockReceipt>, ApiError> {
    Ok(Json(state.engine.submit_answer(&id, &request.answer).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct PaymentRequest {
    code: String,
    #[serde(default)]
    method: PaymentMethod,
}

async fn submit_manual_payment(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<ManualPaymentReceipt>, ApiError> {
    Ok(Json(
        submit_manual_payment_with_queue(&state, &id, &request.code, request.method).await?,
    ))
}

async fn submit_reveal_payment(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<RevealReceipt>, ApiError> {
    Ok(Json(
        state
            .engine
            .submit_payment_proof(&id, &request.code, request.method)
            .await?,
    ))
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseRequest {
    accepted: bool,
}

async fn record_response(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<ResponseRequest>,
) -> Result<Json<ResponseReceipt>, ApiError> {
    Ok(Json(state.engine.record_response(&id, request.accepted).await?))
}

async fn management_view(
    Path(owner_token): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Json<ManagementView>, ApiError> {
    Ok(Json(state.engine.management_view(&owner_token).await?))
}

#[derive(Debug, Clone, Serialize)]
struct PendingListResponse {
    items: Vec<PendingReview>,
}

async fn list_pending(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<PendingListResponse>, ApiError> {
    state.authorize_operator(&headers)?;
    Ok(Json(PendingListResponse {
        items: list_pending_items(&state).await?,
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct ReviewRequest {
    reviewer_id: String,
    note: Option<String>,
}

async fn approve_pending(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<ManagementView>, ApiError> {
    state.authorize_operator(&headers)?;
    Ok(Json(
        approve_pending_review(&state, &id, review.reviewer_id, review.note).await?,
    ))
}

async fn reject_pending(
    Path(id): Path<String>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<ManagementView>, ApiError> {
    state.authorize_operator(&headers)?;
    Ok(Json(
        reject_pending_review(&state, &id, review.reviewer_id, review.note).await?,
    ))
}

#[derive(Debug, Clone, Deserialize)]
struct LedgerEntriesQuery {
    greeting_id: Option<String>,
    kind: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    order: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct LedgerEntriesResponse {
    backend: &'static str,
    chain_valid: bool,
    total: usize,
    returned: usize,
    items: Vec<LedgerEntry>,
}

fn parse_kind_filter(kind: Option<&str>) -> Result<Option<LedgerEntryKind>, ApiError> {
    match kind {
        None => Ok(None),
        Some(value) => LedgerEntryKind::parse(value).map(Some).ok_or_else(|| {
            ApiError::bad_request(format!(
                "invalid kind '{value}'; expected one of: payment, audit"
            ))
        }),
    }
}

async fn list_ledger_entries(
    State(state): State<ServiceState>,
    Query(query): Query<LedgerEntriesQuery>,
    headers: HeaderMap,
) -> Result<Json<LedgerEntriesResponse>, ApiError> {
    state.authorize_operator(&headers)?;
    let kind_filter = parse_kind_filter(query.kind.as_deref())?;

    let mut entries = state.engine.ledger_entries().await?;

    if let Some(greeting_id) = query.greeting_id.as_deref() {
        entries.retain(|entry| entry.greeting_id == greeting_id);
    }

    if let Some(kind) = kind_filter {
        entries.retain(|entry| entry.kind == kind);
    }

    let order = query
        .order
        .as_deref()
        .unwrap_or("desc")
        .to_ascii_lowercase();
    if order == "desc" {
        entries.reverse();
    } else if order != "asc" {
        return Err(ApiError::bad_request(format!(
            "invalid order '{order}'; expected asc or desc"
        )));
    }

    let total = entries.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);
    let items = entries
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect::<Vec<_>>();
    let returned = items.len();

    Ok(Json(LedgerEntriesResponse {
        backend: state.engine.ledger_backend().await,
        chain_valid: state.engine.verify_ledger_chain().await,
        total,
        returned,
        items,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

async fn suggest(
    State(state): State<ServiceState>,
    Json(request): Json<SuggestionRequest>,
) -> Result<Json<ItemsResponse<Suggestion>>, ApiError> {
    Ok(Json(ItemsResponse {
        items: state.sources.suggest(&request).await?,
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MusicQuery {
    q: Option<String>,
}

async fn search_music(
    State(state): State<ServiceState>,
    Query(query): Query<MusicQuery>,
) -> Result<Json<ItemsResponse<Track>>, ApiError> {
    let q = query.q.unwrap_or_default();
    Ok(Json(ItemsResponse {
        items: state.sources.search_music(&q).await?,
    }))
}

async fn find_poems(
    State(state): State<ServiceState>,
    Query(query): Query<PoemQuery>,
) -> Result<Json<ItemsResponse<Poem>>, ApiError> {
    Ok(Json(ItemsResponse {
        items: state.sources.find_poems(&query).await?,
    }))
}
