mod cache;
mod descriptor;
mod engine;
mod snapshot;
mod traits;
mod version;

pub use cache::PackageCache;
pub use descriptor::{Descriptor, Source};
pub use engine::{ComposerRepository, EngineOptions, UpdateSummary};
pub use snapshot::Snapshot;
pub use traits::RemoteState;
pub use version::{classify, is_release};
