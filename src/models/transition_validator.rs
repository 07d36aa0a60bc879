//! Validador de transiciones
//!
//! Decide si un registro puede pasar de un estado a otro según la tabla de
//! estados. Funciones puras: sin I/O, deterministas, seguras entre hilos.

use thiserror::Error;

use crate::models::dispatch_status::{DispatchStatus, UnknownStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unknown dispatch status '{0}'")]
    UnknownStatus(String),

    #[error("{}", missing_step(*.current, *.target))]
    IllegalTransition {
        current: DispatchStatus,
        target: DispatchStatus,
        allowed_next: Vec<DispatchStatus>,
    },
}

impl From<UnknownStatus> for TransitionError {
    fn from(err: UnknownStatus) -> Self {
        TransitionError::UnknownStatus(err.0)
    }
}

impl TransitionError {
    fn illegal(current: DispatchStatus, target: DispatchStatus) -> Self {
        TransitionError::IllegalTransition {
            current,
            target,
            allowed_next: current.allowed_next().to_vec(),
        }
    }
}

/// Validar una transición a un solo salto
pub fn validate(current: DispatchStatus, target: DispatchStatus) -> Result<(), TransitionError> {
    if current.can_transition_to(target) {
        Ok(())
    } else {
        Err(TransitionError::illegal(current, target))
    }
}

/// Validar a partir de valores crudos (por ejemplo, leídos de la base de datos)
pub fn validate_raw(
    current: &str,
    target: &str,
) -> Result<(DispatchStatus, DispatchStatus), TransitionError> {
    let current: DispatchStatus = current.parse()?;
    let target: DispatchStatus = target.parse()?;
    validate(current, target)?;
    Ok((current, target))
}

/// La cancelación no sigue el grafo: se permite desde cualquier estado no terminal
pub fn validate_cancellation(current: DispatchStatus) -> Result<(), TransitionError> {
    if current.is_terminal() {
        return Err(TransitionError::illegal(current, DispatchStatus::Cancelled));
    }
    Ok(())
}

/// Mensaje para el usuario con el paso previo que falta
pub fn missing_step(current: DispatchStatus, target: DispatchStatus) -> String {
    use DispatchStatus::*;

    let action = match target {
        Entered => "register entry",
        PassengersDropped => "drop passengers",
        PermitIssued => "issue permit",
        PermitRejected => "reject permit",
        Paid => "record payment",
        DepartureOrdered => "order departure",
        Departed => "depart",
        Exited => "exit",
        Cancelled => "cancel",
    };

    let reason = match (current, target) {
        (Exited, _) => "the vehicle has already exited the station".to_string(),
        (Cancelled, _) => "the dispatch has been cancelled".to_string(),
        // Solo alcanzable por un reintento sin rechazo previo
        (Entered, PassengersDropped) => "there is no rejected permit to retry".to_string(),
        (Entered, PermitIssued | PermitRejected) => {
            "passengers have not been dropped yet".to_string()
        }
        (Entered | PassengersDropped | PermitRejected, Paid) => {
            "the boarding permit has not been issued yet".to_string()
        }
        (_, DepartureOrdered) if current.progress() < Paid.progress() => {
            "payment has not been recorded yet".to_string()
        }
        (_, Departed) if current.progress() < DepartureOrdered.progress() => {
            "departure has not been ordered yet".to_string()
        }
        (_, Exited) if current.progress() < DepartureOrdered.progress() => {
            "departure has not been ordered yet".to_string()
        }
        _ => format!("dispatch is '{}'", current),
    };

    let allowed: Vec<&str> = current.allowed_next().iter().map(|s| s.as_str()).collect();
    if allowed.is_empty() {
        format!("cannot {}: {}", action, reason)
    } else {
        format!(
            "cannot {}: {} (allowed next: {})",
            action,
            reason,
            allowed.join(", ")
        )
    }
}
