use derive_new::new;
use serde::{Deserialize, Serialize};

pub use entry::*;
pub use event::*;
pub use map_id::*;
pub use snapshot::*;

mod entry;
mod event;
mod map_id;
mod snapshot;
