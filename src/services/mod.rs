pub mod cleanup;
pub mod clock;
pub mod commit;
pub mod ledger;
pub mod pricing;

pub use cleanup::CleanupService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use commit::{BookingService, Committed};
pub use ledger::{HoldReceipt, LedgerSettings, SeatLedger, SweepStats};
