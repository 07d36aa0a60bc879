//! Identificación del operador que ejecuta cada acción
//!
//! El usuario llega en la cabecera `x-user-id`, fijada por el gateway de la
//! estación. Sin cabecera la acción queda sin autor.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;

pub const ACTOR_HEADER: &str = "x-user-id";

/// Usuario que ejecuta la petición, si se conoce
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Actor(pub Option<String>);

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user = headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Actor(user)
    }

    pub fn into_inner(self) -> Option<String> {
        self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Actor::from_headers(&parts.headers))
    }
}
