//! Redis
//!
//! Este módulo contiene el cliente Redis compartido.

pub mod redis_client;

pub use redis_client::RedisClient;
