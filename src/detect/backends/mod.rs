pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubBackend, SyntheticDocument};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
