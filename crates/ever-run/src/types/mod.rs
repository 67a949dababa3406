mod error;
mod event;
mod id;
mod run_status;
mod snapshot;

pub use error::*;
pub use event::*;
pub use id::*;
pub use run_status::*;
pub use snapshot::*;

pub type Time = chrono::DateTime<chrono::Utc>;
