//! Seguimiento de equipos en vivo
//!
//! Ingesta de posiciones de los equipos de mudanza y entrega, sesiones de
//! seguimiento por trabajo, difusión en vivo al dashboard y reportes de fin
//! de día por equipo.

pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::create_router;
pub use state::AppState;
