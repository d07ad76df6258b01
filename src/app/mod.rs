pub mod effects;
pub mod reducer;
mod session;


pub use effects::{Coordinator, Effect};
pub use reducer::{CyclePhase, ReduceOutcome};
pub use session::{Notice, NoticeLevel, SendError, Session};
