//! Ref resolver: revision specifier to immutable commit id.
//!
//! Fixed specifiers are answered from the local slot when possible. Symbolic
//! specifiers always refresh the slot from the location first, so a moved tag
//! or branch is never resolved against stale local state.

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheError, SourceCache};
use crate::identity::ToolIdentity;
use crate::revision::{ResolvedRevision, RevisionSpec};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("cannot reach '{location}': {source}")]
  Unreachable {
    location: String,
    #[source]
    source: CacheError,
  },

  #[error("revision '{spec}' does not exist in '{location}'")]
  NotFound { spec: String, location: String },
}

pub struct RefResolver<'a> {
  cache: &'a SourceCache,
}

impl<'a> RefResolver<'a> {
  pub fn new(cache: &'a SourceCache) -> Self {
    Self { cache }
  }

  pub fn resolve(
    &self,
    identity: &ToolIdentity,
    location: &str,
    spec: &RevisionSpec,
  ) -> Result<ResolvedRevision, ResolveError> {
    match spec {
      RevisionSpec::Fixed(rev) => {
        if self.cache.has_commit(identity, rev) {
          debug!(identity = %identity, rev = %rev, "fixed revision present locally");
          return Ok(rev.clone());
        }

        self.refresh(identity, location)?;
        if self.cache.has_commit(identity, rev) {
          return Ok(rev.clone());
        }
        Err(ResolveError::NotFound {
          spec: rev.to_string(),
          location: location.to_string(),
        })
      }
      RevisionSpec::Symbolic(name) => {
        self.refresh(identity, location)?;

        let rev = self.resolve_cached(identity, name).ok_or_else(|| ResolveError::NotFound {
          spec: name.clone(),
          location: location.to_string(),
        })?;
        info!(identity = %identity, spec = %name, rev = %rev, "resolved");
        Ok(rev)
      }
    }
  }

  /// Resolve a symbolic name against the slot as last fetched, without
  /// touching the network. Tags win over branches.
  pub fn resolve_cached(&self, identity: &ToolIdentity, name: &str) -> Option<ResolvedRevision> {
    let candidates = [
      format!("refs/tags/{}", name),
      format!("refs/remotes/origin/{}", name),
      name.to_string(),
    ];
    candidates
      .iter()
      .find_map(|candidate| self.cache.resolve_local(identity, candidate).ok())
  }

  fn refresh(&self, identity: &ToolIdentity, location: &str) -> Result<(), ResolveError> {
    self.cache.refresh(identity, location).map_err(|source| ResolveError::Unreachable {
      location: location.to_string(),
      source,
    })
  }
}
