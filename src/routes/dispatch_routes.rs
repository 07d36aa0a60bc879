use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::controllers::dispatch_controller::DispatchController;
use crate::dto::dispatch_dto::{
    ApiResponse, CancelRequest, CreateDispatchRequest, DepartRequest, DepartureOrderRequest,
    DispatchListQuery, DispatchListResponse, DispatchResponse, DropPassengersRequest, ExitRequest,
    IssuePermitRequest, PaymentRequest, TransitionResponse,
};
use crate::middleware::actor::Actor;
use crate::middleware::json_body::{JsonBody, OptionalJsonBody};
use crate::models::dispatch_event::StatusChange;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_dispatch_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_dispatch).get(list_dispatches))
        .route("/events", get(stream_events))
        .route("/:id", get(get_dispatch).delete(delete_dispatch))
        .route("/:id/history", get(get_history))
        .route("/:id/drop-passengers", post(drop_passengers))
        .route("/:id/permit", post(issue_permit))
        .route("/:id/retry", post(retry_after_rejection))
        .route("/:id/payment", post(pay))
        .route("/:id/departure-order", post(order_departure))
        .route("/:id/depart", post(depart))
        .route("/:id/exit", post(exit))
        .route("/:id/cancel", post(cancel))
}

type TransitionResult = Result<Json<ApiResponse<TransitionResponse>>, AppError>;

fn controller(state: &AppState) -> DispatchController {
    DispatchController::new(state.workflow.clone())
}

async fn create_dispatch(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(request): JsonBody<CreateDispatchRequest>,
) -> Result<Json<ApiResponse<DispatchResponse>>, AppError> {
    let response = controller(&state).create(request, actor.into_inner()).await?;
    Ok(Json(response))
}

async fn list_dispatches(
    State(state): State<AppState>,
    Query(query): Query<DispatchListQuery>,
) -> Result<Json<ApiResponse<DispatchListResponse>>, AppError> {
    let response = controller(&state).list(query).await?;
    Ok(Json(response))
}

async fn get_dispatch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DispatchResponse>>, AppError> {
    let response = controller(&state).get_by_id(id).await?;
    Ok(Json(response))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<StatusChange>>>, AppError> {
    let response = controller(&state).history(id).await?;
    Ok(Json(response))
}

async fn drop_passengers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    JsonBody(request): JsonBody<DropPassengersRequest>,
) -> TransitionResult {
    let response = controller(&state)
        .drop_passengers(id, request, actor.into_inner())
        .await?;
    Ok(Json(response))
}

async fn issue_permit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    JsonBody(request): JsonBody<IssuePermitRequest>,
) -> TransitionResult {
    let response = controller(&state)
        .issue_permit(id, request, actor.into_inner())
        .await?;
    Ok(Json(response))
}

async fn retry_after_rejection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> TransitionResult {
    let response = controller(&state).retry(id, actor.into_inner()).await?;
    Ok(Json(response))
}

async fn pay(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    JsonBody(request): JsonBody<PaymentRequest>,
) -> TransitionResult {
    let response = controller(&state).pay(id, request, actor.into_inner()).await?;
    Ok(Json(response))
}

async fn order_departure(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    JsonBody(request): JsonBody<DepartureOrderRequest>,
) -> TransitionResult {
    let response = controller(&state)
        .order_departure(id, request, actor.into_inner())
        .await?;
    Ok(Json(response))
}

// Cuerpo opcional: vacío sella la salida con la hora actual
async fn depart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    OptionalJsonBody(request): OptionalJsonBody<DepartRequest>,
) -> TransitionResult {
    let response = controller(&state).depart(id, request, actor.into_inner()).await?;
    Ok(Json(response))
}

async fn exit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    OptionalJsonBody(request): OptionalJsonBody<ExitRequest>,
) -> TransitionResult {
    let response = controller(&state).exit(id, request, actor.into_inner()).await?;
    Ok(Json(response))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    OptionalJsonBody(request): OptionalJsonBody<CancelRequest>,
) -> TransitionResult {
    let response = controller(&state).cancel(id, request, actor.into_inner()).await?;
    Ok(Json(response))
}

async fn delete_dispatch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let response = controller(&state).delete(id, actor.into_inner()).await?;
    Ok(Json(response))
}

/// Flujo SSE de cambios de estado confirmados
async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.workflow.events().subscribe();
    debug!("📡 Nuevo suscriptor SSE");

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(change) => match Event::default().event("status_changed").json_data(&change) {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(e) => warn!("⚠️ Evento no serializable: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Suscriptor SSE retrasado, {} eventos perdidos", skipped)
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
