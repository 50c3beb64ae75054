//! Domain services.
//!
//! ARCHITECTURE
//! ============
//! Each service pairs the HTTP calls for one area with the cache touchpoints
//! that keep derived views correct after a mutation, so callers never write
//! to the query cache directly.

pub mod auth;
pub mod household;
pub mod invitation;
pub mod member;

pub use household::HouseholdService;
pub use invitation::InvitationService;
pub use member::MemberService;
