//! Image delivery for a photography portfolio: URL rewriting to an
//! on-the-fly render endpoint, WebP variant encoding at upload time, an
//! adaptive `<img>` source state machine and paged album browsing, plus the
//! local storage backends and HTTP surface that serve them.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod imaging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
