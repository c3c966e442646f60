mod assembler;
mod plan;
mod workflow;

// Public API of the session subsystem.
pub use assembler::SessionAssembler;
pub use plan::SessionBuilder;
pub use workflow::{AttemptOutcome, SessionCompletion, SessionWorkflow};
