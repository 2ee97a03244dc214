pub mod channel;
pub mod dispatcher;
pub mod outlet;
pub mod templates;

pub use channel::{EmailMessage, NotificationChannel, RecordingChannel};
pub use dispatcher::{NotificationDispatcher, NotificationRequest};
pub use outlet::{FallbackOutlet, MemoryOutlet, StderrOutlet, StdoutOutlet};
