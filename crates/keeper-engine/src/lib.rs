//! Keep-rule inference: archives, analyzer runs, and wiring into host tasks.

pub mod analyzer;
pub mod archive;
pub mod cache;
pub mod error;
pub mod l8;
pub mod layout;
pub mod merge;
pub mod pipeline;
pub mod provider;
pub mod tasks;
pub mod trace;
pub mod variant;

pub use archive::{build_archive, Archive, ArchiveOptions, ArchiveSide, ClassUniverse};
pub use cache::{Fingerprint, FingerprintInputs};
pub use error::EngineError;
pub use layout::Layout;
pub use pipeline::{Configured, Keeper, RunOptions};
pub use provider::Provider;
pub use tasks::{L8DexTask, MinifyTask, TaskContainer};
pub use trace::{infer_rules, InvocationSpec, RulesFile};
pub use variant::{select_pairs, IgnoreRules, VariantFilter, VariantInfo, VariantPair};
