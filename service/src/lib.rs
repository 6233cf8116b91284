//! GuestWave - guest Wi-Fi marketing backend.
//!
//! Two loosely related flows share this service:
//! - the captive-portal connect flow: persist a splash-page submission
//!   and authorize the guest's device through the wireless controller
//! - the campaign pipeline: render templated HTML email and dispatch it
//!   through the transactional email provider, recording outcomes
//!
//! ## Architecture
//!
//! ```text
//! Splash page → web → portal → store / unifi controller
//! Admin console → web → campaign → render → mail provider / store
//! ```

pub mod campaign;
pub mod config;
pub mod error;
pub mod mail;
pub mod portal;
pub mod render;
pub mod storage;
pub mod store;
pub mod unifi;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use render::{render, RenderedEmail};
pub use web::{router, AppState};
