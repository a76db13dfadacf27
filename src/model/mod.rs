pub mod clock;
pub mod metadata;
pub mod mode_state;

pub use clock::{ClockOrdering, VectorClock};
pub use metadata::{ChunkRef, Mode, ModeHint, ObjectMetadata};
pub use mode_state::{ControllerState, ObjectModeState};
