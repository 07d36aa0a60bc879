//! Modelos del sistema
//!
//! Este módulo contiene el registro de despacho, su tabla de estados, el
//! validador de transiciones y las acciones que lo hacen avanzar.

pub mod dispatch;
pub mod dispatch_action;
pub mod dispatch_event;
pub mod dispatch_status;
pub mod transition_validator;

pub use dispatch::{DispatchRecord, DisplaySnapshot, NewDispatch, TransitionOutcome};
pub use dispatch_action::*;
pub use dispatch_event::StatusChange;
pub use dispatch_status::{DispatchStatus, UnknownStatus};
