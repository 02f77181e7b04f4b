// Wall-clock cadence for frames and notifications
pub mod cadence;
pub mod tracker;

pub use cadence::{next_boundary, wait_for_next_boundary};
pub use tracker::NotificationGate;
