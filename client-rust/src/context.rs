use crate::ContextArtifact;
use std::collections::HashSet;

/// Artifacts attached to the next outgoing message, deduplicated by id.
///
/// Entries keep the position of their first insertion. Merging is additive:
/// an artifact missing from a later batch stays in the store until it is
/// removed or the store is cleared.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    artifacts: Vec<ContextArtifact>,
    ids: HashSet<String>,
}

impl ContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every artifact whose id is not already present. Returns the number
    /// of artifacts added.
    pub fn merge<I>(&mut self, artifacts: I) -> usize
    where
        I: IntoIterator<Item = ContextArtifact>,
    {
        let before = self.artifacts.len();
        for artifact in artifacts {
            if self.ids.insert(artifact.id.clone()) {
                self.artifacts.push(artifact);
            }
        }
        self.artifacts.len() - before
    }

    /// Remove the artifact with the given id, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<ContextArtifact> {
        if !self.ids.remove(id) {
            return None;
        }
        let position = self.artifacts.iter().position(|a| a.id == id)?;
        Some(self.artifacts.remove(position))
    }

    pub fn clear(&mut self) {
        self.artifacts.clear();
        self.ids.clear();
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ContextArtifact> {
        self.artifacts.clone()
    }

    /// Take every artifact out of the store, leaving it empty.
    pub fn drain(&mut self) -> Vec<ContextArtifact> {
        self.ids.clear();
        std::mem::take(&mut self.artifacts)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextArtifact> {
        self.artifacts.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
