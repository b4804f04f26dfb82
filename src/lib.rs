//! HTTP service that renders a ChatGPT share link in headless Chrome and
//! returns the visible conversation as structured JSON.

pub mod browser;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod ready;
pub mod routes;
