//! Client-side state: the session state machine and the active-household
//! selection derived from it.

pub mod auth;
pub mod household;

pub use auth::{AuthStatus, Session, SessionManager};
pub use household::{HouseholdContext, HouseholdSnapshot};
