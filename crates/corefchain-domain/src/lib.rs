//! Corefchain Domain Layer
//!
//! Data model shared by every stage of the category-chained coreference
//! pipeline. It holds no I/O: persistence and completion calls live behind
//! traits implemented in other crates.
//!
//! ## Key Concepts
//!
//! - **Document**: immutable text targeted by one category pass
//! - **Segment**: token-bounded contiguous slice of a document
//! - **Mention**: one extracted occurrence of the target category
//! - **Candidate / Confirmed Cluster**: co-reference hypotheses and the
//!   verified subset carrying a canonical label
//! - **Run State**: which stages of a (document, category) pass have
//!   committed, enabling resumption
//!
//! ## Category chain
//!
//! ```text
//! person → location → route → means-of-transport → organization
//!        → means-of-communication → smuggled-item
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod category;
pub mod cluster;
pub mod document;
pub mod mention;
pub mod run;
pub mod traits;

// Re-exports for convenience
pub use category::EntityCategory;
pub use cluster::{
    find_shared_member, CandidateCluster, ClusterDecision, ClusterId, ConfirmedCluster,
    PassOutcome, VerificationRecord,
};
pub use document::{Document, Segment};
pub use mention::{Mention, MentionId, MentionKind};
pub use run::{
    ArtifactHandle, ArtifactKind, RunId, RunKey, RunState, RunStatus, Stage, StageRecord,
};
