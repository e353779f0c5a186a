//! Parse and validate `keeper.toml`, the host's `variants.json`, and `keeper.lock`.

pub mod lockfile;
pub mod manifest;
pub mod variants;

pub use lockfile::Lockfile;
pub use manifest::Manifest;
pub use variants::VariantModel;
