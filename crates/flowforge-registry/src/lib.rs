//! Content-addressed artifact store and relational repository (components C10, C11).
//!
//! The artifact store addresses blobs by scheme URI (`local://`, `memory://`) rather than by
//! raw content hash, so a caller can ask for "the workflow.yml under this run's prefix"
//! without round-tripping through a separate index. The repository persists agents, their
//! deployed versions, optimization runs, round traces, and the run's artifact index behind a
//! backend-agnostic trait so callers can swap the default SQLite store for the in-memory test
//! double without touching call sites.

pub mod content_hash;
pub mod repository;
pub mod storage;

pub use content_hash::ContentHash;
pub use repository::{InMemoryRepository, Repository, SharedRepository, SqliteRepository};
pub use storage::{normalize_path, ArtifactStore, LocalArtifactStore, MemoryArtifactStore, PutResult};
