pub mod artifacts;

pub use artifacts::{ArtifactKind, ArtifactStore};
