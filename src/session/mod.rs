//! Session routing between connections and live matches

pub mod links;
pub mod router;

pub use router::{ConnId, Dispatch, SessionRouter};
