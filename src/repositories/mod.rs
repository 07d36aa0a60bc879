//! Repositorios de datos
//!
//! Implementaciones del almacén de despachos: PostgreSQL para producción y
//! memoria para desarrollo y tests.

pub mod dispatch_repository;
pub mod dispatch_store;
pub mod memory_dispatch_repository;

pub use dispatch_repository::PgDispatchRepository;
pub use dispatch_store::{DispatchFilters, DispatchStore};
pub use memory_dispatch_repository::InMemoryDispatchRepository;
