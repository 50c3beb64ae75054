//! Client core for the household management API: request pipeline with
//! anti-forgery token handling, session state machine, typed query cache with
//! consistency helpers, and the active-household context.

pub mod app;
pub mod cache;
pub mod config;
pub mod net;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_helpers;

pub use app::App;
pub use config::{ClientConfig, ConfigError};
pub use net::{ApiClient, ApiError};
pub use state::{AuthStatus, HouseholdContext, HouseholdSnapshot, Session, SessionManager};
