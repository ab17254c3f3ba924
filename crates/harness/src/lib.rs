pub mod samples;
pub mod store;

pub use store::{ADMIN, FailingNotifier, RecordingNotifier, TestStore};
