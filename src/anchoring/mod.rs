//! Calendar-server anchoring
//!
//! Submits message digests to an OpenTimestamps-style calendar server and
//! matures pending sequences by polling the calendar for the completed,
//! Bitcoin-attested form.

pub mod calendar;
pub mod error;
pub mod mock;
pub mod service;

pub use error::AnchorError;
pub use mock::MockAttestationService;
pub use service::{AttestationService, CalendarAttestor};
