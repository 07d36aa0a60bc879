//! Notificadores posteriores a cada transición
//!
//! Se ejecutan después de confirmar la mutación. Un fallo se registra y se
//! cuenta, pero el registro ya guardado no se revierte.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::RedisClient;
use crate::models::dispatch::DispatchRecord;
use crate::models::dispatch_event::StatusChange;
use crate::models::dispatch_status::DispatchStatus;
use crate::utils::errors::CollaboratorError;

#[async_trait]
pub trait DispatchNotifier: Send + Sync {
    /// Nombre usado en logs y en la métrica de fallos
    fn name(&self) -> &'static str;

    async fn notify(&self, record: &DispatchRecord, changes: &[StatusChange]) -> Result<(), CollaboratorError>;
}

/// Aviso al sistema de facturación cuando un despacho queda pagado
#[derive(Debug, Serialize, PartialEq)]
pub struct InvoiceRequest {
    pub dispatch_id: Uuid,
    pub vehicle_id: String,
    pub plate_number: Option<String>,
    pub operator_id: Option<String>,
    pub operator_code: Option<String>,
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub invoice_number: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub paid_by: Option<String>,
}

impl InvoiceRequest {
    pub fn from_record(record: &DispatchRecord) -> Option<Self> {
        let payment = record.payment.as_ref()?;
        Some(Self {
            dispatch_id: record.id,
            vehicle_id: record.vehicle_id.clone(),
            plate_number: record.snapshot.plate_number.clone(),
            operator_id: record.snapshot.operator_id.clone(),
            operator_code: record.snapshot.operator_code.clone(),
            amount: payment.amount,
            payment_method: payment.method.clone(),
            invoice_number: payment.invoice_number.clone(),
            paid_at: payment.stamp.at,
            paid_by: payment.stamp.by.clone(),
        })
    }
}

pub struct InvoiceWebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl InvoiceWebhookNotifier {
    pub fn new(webhook_url: String) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CollaboratorError::Invoice(e.to_string()))?;
        Ok(Self { client, webhook_url })
    }
}

#[async_trait]
impl DispatchNotifier for InvoiceWebhookNotifier {
    fn name(&self) -> &'static str {
        "invoice"
    }

    async fn notify(&self, record: &DispatchRecord, changes: &[StatusChange]) -> Result<(), CollaboratorError> {
        if !changes.iter().any(|c| c.to_status == DispatchStatus::Paid) {
            return Ok(());
        }
        let Some(invoice) = InvoiceRequest::from_record(record) else {
            return Ok(());
        };

        info!("🧾 Enviando factura del despacho {} ({})", record.id, invoice.amount);
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&invoice)
            .send()
            .await
            .map_err(|e| CollaboratorError::Invoice(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Invoice(format!("HTTP {}: {}", status, body)));
        }

        debug!("✅ Factura aceptada para despacho {}", record.id);
        Ok(())
    }
}

/// Publica cada cambio de estado en un canal Redis para proyecciones
pub struct RedisEventPublisher {
    redis: RedisClient,
    channel: String,
}

impl RedisEventPublisher {
    pub fn new(redis: RedisClient, channel: String) -> Self {
        Self { redis, channel }
    }
}

#[async_trait]
impl DispatchNotifier for RedisEventPublisher {
    fn name(&self) -> &'static str {
        "event_publisher"
    }

    async fn notify(&self, _record: &DispatchRecord, changes: &[StatusChange]) -> Result<(), CollaboratorError> {
        for change in changes {
            self.redis
                .publish_json(&self.channel, change)
                .await
                .map_err(|e| CollaboratorError::EventPublish(e.to_string()))?;
        }
        Ok(())
    }
}
