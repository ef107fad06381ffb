//! Services - check-in business logic
//!
//! - `session` - Scan session state machine and cancellation
//! - `validator` - Status transition rules
//! - `coordinator` - Scan -> lookup -> validate -> persist cycle and session counters

pub mod coordinator;
pub mod session;
pub mod validator;

// Re-export commonly used types
pub use coordinator::{
    CheckinCoordinator, CoordinatorError, CoordinatorSettings, CycleOutcome, CyclePhase, Failure,
    NextAction,
};
pub use session::{CancelHandle, ScanAttempt, ScanSession, SessionState};
pub use validator::{validate, Verdict};
