//! Middleware del sistema
//!
//! Este módulo contiene el middleware de CORS, la extracción del operador
//! que ejecuta cada petición y la extracción de cuerpos JSON.

pub mod actor;
pub mod cors;
pub mod json_body;

pub use actor::Actor;
pub use cors::*;
pub use json_body::{JsonBody, OptionalJsonBody};
