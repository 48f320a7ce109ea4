//! Storefront API Library
//!
//! Cart management, checkout orchestration, and order lifecycle for an
//! e-commerce store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod pricing;
pub mod request_id;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub use handlers::api_routes;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
}

impl AppState {
    /// Builds the full application state from its parts.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        event_sender: events::EventSender,
        payment_processor: Arc<dyn services::payments::PaymentProcessor>,
    ) -> Self {
        let services = services::AppServices::new(
            db.clone(),
            Arc::new(event_sender.clone()),
            config.clone(),
            payment_processor,
        );

        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}
