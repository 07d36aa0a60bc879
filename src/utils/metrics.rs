//! Métricas Prometheus del flujo de despacho

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::models::dispatch_status::DispatchStatus;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref DISPATCH_TRANSITIONS: IntCounterVec = register(IntCounterVec::new(
        Opts::new("dispatch_transitions_total", "Transiciones de estado confirmadas"),
        &["from", "to"],
    ));

    pub static ref DISPATCH_REJECTIONS: IntCounterVec = register(IntCounterVec::new(
        Opts::new("dispatch_rejections_total", "Operaciones rechazadas antes de mutar"),
        &["reason"],
    ));

    pub static ref COLLABORATOR_FAILURES: IntCounterVec = register(IntCounterVec::new(
        Opts::new(
            "dispatch_collaborator_failures_total",
            "Fallos de colaboradores externos tras confirmar",
        ),
        &["collaborator"],
    ));
}

fn register(counter: prometheus::Result<IntCounterVec>) -> IntCounterVec {
    // Nombres y etiquetas constantes
    let counter = counter.unwrap_or_else(|e| panic!("invalid metric definition: {}", e));
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        error!("❌ Error registrando métrica: {}", e);
    }
    counter
}

pub fn record_transition(from: DispatchStatus, to: DispatchStatus) {
    DISPATCH_TRANSITIONS
        .with_label_values(&[from.as_str(), to.as_str()])
        .inc();
}

pub fn record_rejection(reason: &str) {
    DISPATCH_REJECTIONS.with_label_values(&[reason]).inc();
}

pub fn record_collaborator_failure(collaborator: &str) {
    COLLABORATOR_FAILURES.with_label_values(&[collaborator]).inc();
}

/// Exportar todas las métricas en formato de texto Prometheus
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("❌ Error codificando métricas: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
