use std::sync::Arc;
use uuid::Uuid;

use crate::dto::dispatch_dto::{
    ApiResponse, CancelRequest, CreateDispatchRequest, DepartRequest, DepartureOrderRequest,
    DispatchListQuery, DispatchListResponse, DispatchResponse, DropPassengersRequest, ExitRequest,
    IssuePermitRequest, PaymentRequest, TransitionResponse,
};
use crate::models::dispatch::TransitionOutcome;
use crate::models::dispatch_event::StatusChange;
use crate::services::dispatch_workflow::DispatchWorkflow;
use crate::utils::errors::AppError;

pub struct DispatchController {
    workflow: Arc<DispatchWorkflow>,
}

impl DispatchController {
    pub fn new(workflow: Arc<DispatchWorkflow>) -> Self {
        Self { workflow }
    }

    pub async fn create(
        &self,
        request: CreateDispatchRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<DispatchResponse>, AppError> {
        let record = self.workflow.enter(request, actor).await?;

        Ok(ApiResponse::success_with_message(
            record.into(),
            "Vehicle entry registered".to_string(),
        ))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<ApiResponse<DispatchResponse>, AppError> {
        let record = self.workflow.find_by_id(id).await?;
        Ok(ApiResponse::success(record.into()))
    }

    pub async fn list(
        &self,
        query: DispatchListQuery,
    ) -> Result<ApiResponse<DispatchListResponse>, AppError> {
        let filters = query.into_filters()?;
        let records = self.workflow.find_all(&filters).await?;

        let items: Vec<DispatchResponse> = records.into_iter().map(Into::into).collect();
        Ok(ApiResponse::success(DispatchListResponse {
            count: items.len(),
            items,
            limit: filters.limit(),
            offset: filters.offset(),
        }))
    }

    pub async fn history(&self, id: Uuid) -> Result<ApiResponse<Vec<StatusChange>>, AppError> {
        let history = self.workflow.history(id).await?;
        Ok(ApiResponse::success(history))
    }

    pub async fn drop_passengers(
        &self,
        id: Uuid,
        request: DropPassengersRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let outcome = self.workflow.drop_passengers(id, request, actor).await?;
        Ok(transition_response(outcome, "Passengers dropped"))
    }

    pub async fn issue_permit(
        &self,
        id: Uuid,
        request: IssuePermitRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let message = if request.is_rejection() {
            "Boarding permit rejected"
        } else {
            "Boarding permit issued"
        };
        let outcome = self.workflow.issue_permit(id, request, actor).await?;
        Ok(transition_response(outcome, message))
    }

    pub async fn retry(
        &self,
        id: Uuid,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let outcome = self.workflow.retry_after_rejection(id, actor).await?;
        Ok(transition_response(outcome, "Ready for a new permit decision"))
    }

    pub async fn pay(
        &self,
        id: Uuid,
        request: PaymentRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let outcome = self.workflow.pay(id, request, actor).await?;
        Ok(transition_response(outcome, "Payment recorded"))
    }

    pub async fn order_departure(
        &self,
        id: Uuid,
        request: DepartureOrderRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let outcome = self.workflow.order_departure(id, request, actor).await?;
        Ok(transition_response(outcome, "Departure ordered"))
    }

    pub async fn depart(
        &self,
        id: Uuid,
        request: DepartRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let outcome = self.workflow.depart(id, request, actor).await?;
        Ok(transition_response(outcome, "Vehicle departed"))
    }

    pub async fn exit(
        &self,
        id: Uuid,
        request: ExitRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let outcome = self.workflow.exit(id, request, actor).await?;
        Ok(transition_response(outcome, "Vehicle exited the station"))
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        request: CancelRequest,
        actor: Option<String>,
    ) -> Result<ApiResponse<TransitionResponse>, AppError> {
        let outcome = self.workflow.cancel(id, request, actor).await?;
        Ok(transition_response(outcome, "Dispatch cancelled"))
    }

    pub async fn delete(&self, id: Uuid, actor: Option<String>) -> Result<ApiResponse<()>, AppError> {
        self.workflow.delete(id, actor).await?;
        Ok(ApiResponse::message(format!("Dispatch {} deleted", id)))
    }
}

fn transition_response(outcome: TransitionOutcome, message: &str) -> ApiResponse<TransitionResponse> {
    ApiResponse::success_with_message(
        TransitionResponse {
            dispatch: outcome.record.into(),
            changes: outcome.changes,
        },
        message.to_string(),
    )
}
