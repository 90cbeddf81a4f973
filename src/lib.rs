//! Account backend for users with visual impairments: registration, email
//! verification codes, brute-force protection, signed session tokens and
//! accessibility preferences.

pub mod accessibility;
pub mod app;
pub mod audit;
pub mod cli;
pub mod config;
pub mod database;
pub mod email;
pub mod security;
pub mod user;

pub use app::App;
pub use config::Config;
