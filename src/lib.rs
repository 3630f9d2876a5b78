//! VolunteerHub - volunteer event management
//!
//! This library provides the REST backend (events, registrations,
//! discussions, notifications, administration) and a typed client for it.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
