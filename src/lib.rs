//! Cache consistency layer for a study platform.
//!
//! The server side ([`cache`], [`infra::http`]) keeps typed entries with
//! dependency cascades and exposes admin and conditional-read routers. The
//! client side ([`client`]) keeps a local resource cache revalidated with
//! `If-None-Match` / `If-Modified-Since`.

pub mod application;
pub mod cache;
pub mod client;
pub mod conditional;
pub mod config;
pub mod infra;
