//! Runtime cycle detection for a single resolution pass.

use crate::error::{DiResult, ResolutionError};
use crate::key::DependencyKey;

/// Stack of keys currently being resolved.
///
/// Registration already rejects cycles, so this is the safety net for graphs
/// that only become cyclic through a combination the registry could not see.
#[derive(Debug)]
pub(crate) struct ResolutionPath {
    stack: Vec<DependencyKey>,
    max_depth: usize,
}

impl ResolutionPath {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth,
        }
    }

    /// Pushes `key`, failing if it is already on the path.
    pub(crate) fn enter(&mut self, key: &DependencyKey) -> DiResult<()> {
        // Circular detection BEFORE pushing the new key
        if let Some(start) = self.stack.iter().position(|k| k == key) {
            let mut cycle = self.stack[start..].to_vec();
            cycle.push(key.clone());
            return Err(ResolutionError::CircularDependency { cycle });
        }

        if self.stack.len() >= self.max_depth {
            return Err(ResolutionError::DepthExceeded {
                depth: self.stack.len(),
            });
        }

        self.stack.push(key.clone());
        Ok(())
    }

    pub(crate) fn exit(&mut self, key: &DependencyKey) {
        let last = self.stack.pop();
        debug_assert_eq!(last.as_ref(), Some(key));
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}
