pub mod blocklist;
pub mod engine;
pub mod pacer;
pub mod states;

pub use blocklist::HostBlocklist;
pub use engine::{ProductSearchLoop, SearchSettings};
pub use pacer::{CyclePacer, RecordingPacer, TokioPacer};
pub use states::{SearchCapability, SearchOutcome, SearchRequest, SearchState};
