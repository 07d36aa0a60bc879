use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::dispatch::DispatchRecord;
use crate::models::dispatch_event::StatusChange;
use crate::models::dispatch_status::DispatchStatus;
use crate::repositories::dispatch_store::DispatchFilters;
use crate::utils::errors::DispatchError;
use crate::utils::validation::{
    validate_datetime, validate_enum, validate_non_negative_amount, validate_not_empty,
    validate_rfc3339,
};

// Request para registrar la entrada de un vehículo
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateDispatchRequest {
    #[serde(default)]
    #[validate(length(max = 64), custom = "validate_not_empty")]
    pub vehicle_id: String,
    #[serde(default)]
    #[validate(length(max = 64), custom = "validate_not_empty")]
    pub driver_id: String,
    #[validate(length(max = 64))]
    pub route_id: Option<String>,
    #[validate(length(max = 64))]
    pub schedule_id: Option<String>,
    #[validate(required, custom = "validate_rfc3339")]
    pub entry_time: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub shift_id: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DropPassengersRequest {
    #[validate(range(min = 0))]
    pub passengers_arrived: Option<i32>,
    #[validate(custom = "validate_rfc3339")]
    pub passenger_drop_time: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub shift_id: Option<String>,
}

// Request de decisión sobre el permiso de embarque (approved | rejected)
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_permit_decision"))]
pub struct IssuePermitRequest {
    #[serde(default)]
    #[validate(custom = "validate_permit_status")]
    pub permit_status: String,
    #[validate(length(max = 64))]
    pub transport_order_code: Option<String>,
    #[validate(custom = "validate_rfc3339")]
    pub planned_departure_time: Option<String>,
    #[validate(range(min = 0))]
    pub seat_count: Option<i32>,
    #[validate(length(max = 500))]
    pub rejection_reason: Option<String>,
    #[validate(custom = "validate_rfc3339")]
    pub boarding_permit_time: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub shift_id: Option<String>,
}

impl IssuePermitRequest {
    pub fn is_rejection(&self) -> bool {
        self.permit_status == PERMIT_REJECTED
    }
}

pub const PERMIT_APPROVED: &str = "approved";
pub const PERMIT_REJECTED: &str = "rejected";

fn validate_permit_status(value: &str) -> Result<(), ValidationError> {
    validate_enum(value, &[PERMIT_APPROVED, PERMIT_REJECTED])
}

fn validate_permit_decision(request: &IssuePermitRequest) -> Result<(), ValidationError> {
    let has_code = request
        .transport_order_code
        .as_deref()
        .map_or(false, |code| !code.trim().is_empty());

    if request.permit_status == PERMIT_APPROVED && !has_code {
        let mut error = ValidationError::new("transport_order_code_required");
        error.message = Some("an approved permit needs a transport_order_code".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PaymentRequest {
    #[validate(required, custom = "validate_non_negative_amount")]
    pub payment_amount: Option<Decimal>,
    #[validate(length(max = 32))]
    pub payment_method: Option<String>,
    #[validate(length(max = 64))]
    pub invoice_number: Option<String>,
    #[validate(custom = "validate_rfc3339")]
    pub payment_time: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub shift_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DepartureOrderRequest {
    #[validate(range(min = 0))]
    pub passengers_departing: Option<i32>,
    #[validate(custom = "validate_rfc3339")]
    pub departure_order_time: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub shift_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DepartRequest {
    #[validate(custom = "validate_rfc3339")]
    pub departure_time: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub shift_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ExitRequest {
    #[validate(custom = "validate_rfc3339")]
    pub exit_time: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub shift_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

// Query string de listado
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DispatchListQuery {
    #[validate(custom = "validate_status_filter")]
    pub status: Option<String>,
    #[validate(custom = "validate_rfc3339")]
    pub entered_from: Option<String>,
    #[validate(custom = "validate_rfc3339")]
    pub entered_to: Option<String>,
    pub vehicle_id: Option<String>,
    pub operator_id: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

fn validate_status_filter(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<DispatchStatus>()
        .map(|_| ())
        .map_err(|_| {
            let mut error = ValidationError::new("status");
            error.add_param("value".into(), &value.to_string());
            error
        })
}

impl DispatchListQuery {
    pub fn into_filters(self) -> Result<DispatchFilters, DispatchError> {
        self.validate()?;

        let parse = |field: &'static str,
                     value: Option<String>|
         -> Result<Option<DateTime<Utc>>, DispatchError> {
            value
                .map(|v| validate_datetime(&v))
                .transpose()
                .map_err(|_| crate::utils::errors::validation_error(field, "invalid date"))
        };

        Ok(DispatchFilters {
            status: self.status.map(|s| s.parse()).transpose()?,
            entered_from: parse("entered_from", self.entered_from)?,
            entered_to: parse("entered_to", self.entered_to)?,
            vehicle_id: self.vehicle_id,
            operator_id: self.operator_id,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

// Response de despacho con el siguiente paso posible
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    #[serde(flatten)]
    pub record: DispatchRecord,
    pub allowed_next: Vec<DispatchStatus>,
    pub is_terminal: bool,
}

impl From<DispatchRecord> for DispatchResponse {
    fn from(record: DispatchRecord) -> Self {
        Self {
            allowed_next: record.current_status.allowed_next().to_vec(),
            is_terminal: record.current_status.is_terminal(),
            record,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionResponse {
    pub dispatch: DispatchResponse,
    pub changes: Vec<StatusChange>,
}

#[derive(Debug, Serialize)]
pub struct DispatchListResponse {
    pub items: Vec<DispatchResponse>,
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
}

// Response genérica
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: None,
        }
    }
}
