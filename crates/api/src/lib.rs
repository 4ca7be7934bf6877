//! HTTP surface of the push relay.
//!
//! - `POST /send-notification`: database webhook for inserted notification rows
//! - `GET  /health`: liveness probe

pub mod routes;
pub mod state;
