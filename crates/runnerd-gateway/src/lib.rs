//! HTTP control surface for the supervisor: a thin axum layer that maps
//! registry operations to routes and error kinds to status codes.

pub mod routes;
pub mod server;

pub use server::{AppState, serve};
