//! Coordination services for builders, the server and lease requesters.

mod authority;
mod builder;
mod housekeeping;
mod ingest;
mod lease;
mod ledger;
mod uplink;

pub use authority::{LeaseReply, ResourceAuthority};
pub use builder::{ARTIFACT_CHUNK_LEN, Admission, BuilderCoordinator};
pub use housekeeping::{Housekeeper, Housekeeping};
pub use ingest::{Ingested, ServerIngest};
pub use lease::LeaseRequester;
pub use ledger::{RejectionLedger, RejectionVerdict};
pub use uplink::Uplink;
