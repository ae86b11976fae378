//! Blog - web application bootstrap
//!
//! Builds the HTTP application for the blog platform: configuration profiles,
//! database, server-side sessions, CSRF protection, CORS, logging, templates
//! and the route groups for blog content, authentication, user profiles,
//! administration and the JSON API.
//!
//! Every response passes through a response finalizer that sets a fresh
//! `csrf_token` cookie and fixed cross-origin headers.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod modules;
pub mod services;
pub mod session;
pub mod templates;

pub use app::{create_app, App};
