pub mod types;
pub mod router;

pub use types::{ButtonState, LogicalInput, VisualChange};
pub use router::{EventRouter, RouteOutcome};
