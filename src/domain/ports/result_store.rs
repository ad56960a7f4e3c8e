//! Result store port: durable key-addressed blob storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// Kind of artifact stored for a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Partial solver log uploaded on timeout so a continuation on
    /// another host can resume from it.
    SolverLog,
    /// Serialized `RelaxationState`, persisted after every iteration.
    ControllerState,
    /// Final relaxed geometry in the solver's input format.
    RelaxedGeometry,
    /// Serialized `RelaxedResult`.
    Result,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SolverLog => "solver_log",
            Self::ControllerState => "controller_state",
            Self::RelaxedGeometry => "relaxed_geometry",
            Self::Result => "result",
        }
    }
}

/// Storage key: one artifact per `(structure_id, kind)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub structure_id: String,
    pub kind: ArtifactKind,
}

impl StoreKey {
    pub fn new(structure_id: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            structure_id: structure_id.into(),
            kind,
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.structure_id, self.kind.as_str())
    }
}

/// Durable blob storage shared across workers.
///
/// Storage must be idempotent-safe: writing the same key with the same
/// content and `overwrite` set is always safe, so a crash between "result
/// stored" and "job marked complete" is tolerated.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store `bytes` under `key`. Fails with `RelaxError::AlreadyExists`
    /// when the key is occupied and `overwrite` is not requested.
    async fn put(&self, key: &StoreKey, bytes: Vec<u8>, overwrite: bool) -> DomainResult<()>;

    /// Fails with `RelaxError::NotFound` for absent keys.
    async fn get(&self, key: &StoreKey) -> DomainResult<Vec<u8>>;

    /// Fails with `RelaxError::NotFound` for absent keys.
    async fn delete(&self, key: &StoreKey) -> DomainResult<()>;
}
