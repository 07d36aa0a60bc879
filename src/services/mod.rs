//! Services module
//!
//! Este módulo contiene la lógica de negocio del despacho: el orquestador
//! del flujo y los colaboradores externos (flota, turnos, notificadores y
//! bus de eventos).

pub mod dispatch_notifier;
pub mod dispatch_workflow;
pub mod event_bus;
pub mod fleet_lookup;
pub mod shift_resolver;

pub use dispatch_notifier::{DispatchNotifier, InvoiceWebhookNotifier, RedisEventPublisher};
pub use dispatch_workflow::DispatchWorkflow;
pub use event_bus::DispatchEventBus;
pub use fleet_lookup::{FleetLookup, PgFleetLookup, StaticFleetLookup};
pub use shift_resolver::{NoShiftResolver, ShiftResolver, TimeOfDayShiftResolver};
