pub mod retry;
pub mod service;
pub mod sweeper;

pub use retry::RetryPolicy;
pub use service::{ExpiryOutcome, PositionView, TripWaitlist, WaitlistService};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperHandle};
