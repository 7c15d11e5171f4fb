//! Session coordination engine.
//!
//! - `coordinator` - phase state machine and per-party critical sections
//! - `tally` - instant-runoff winner selection
//! - `auth` - session-scoped credentials

pub mod auth;
pub mod coordinator;
pub mod tally;

pub use auth::{AuthToken, TokenAuthority};
pub use coordinator::{CoordinatorSettings, CreatedParty, JoinedParty, PartyCoordinator};
pub use tally::{tally, TallyError, TallyOutcome};
