//! Reference management: loose refs, symbolic HEAD, and transactional
//! compare-and-swap updates.

use crate::{ObjectId, Result, StorageError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A git reference (branch, tag, or symbolic ref).
#[derive(Debug, Clone)]
pub enum Reference {
    /// Direct reference to an object.
    Direct(ObjectId),
    /// Symbolic reference (e.g., HEAD -> refs/heads/main).
    Symbolic(String),
}

impl Reference {
    /// Returns the object ID if this is a direct reference.
    pub fn as_direct(&self) -> Option<ObjectId> {
        match self {
            Self::Direct(id) => Some(*id),
            Self::Symbolic(_) => None,
        }
    }
}

/// A single ref edit inside a transaction.
///
/// `expected` is the value the ref must still hold at commit time:
/// `None` means the ref must not exist. `target` is the new value,
/// `None` meaning deletion.
#[derive(Debug, Clone)]
pub struct RefEdit {
    /// Full ref name (e.g., refs/heads/main).
    pub name: String,
    /// Required current value, or `None` for "must not exist".
    pub expected: Option<ObjectId>,
    /// New value, or `None` to delete the ref.
    pub target: Option<ObjectId>,
}

/// A batch of ref edits applied atomically under one write lock.
#[derive(Debug, Default)]
pub struct RefTransaction {
    edits: Vec<RefEdit>,
    head_target: Option<String>,
}

impl RefTransaction {
    /// Creates an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edit to the batch.
    pub fn edit(&mut self, edit: RefEdit) {
        self.edits.push(edit);
    }

    /// Requests that HEAD be pointed at `target` if HEAD does not
    /// exist yet when the transaction commits.
    pub fn set_head_if_unborn(&mut self, target: impl Into<String>) {
        self.head_target = Some(target.into());
    }

    /// The edits in this transaction.
    pub fn edits(&self) -> &[RefEdit] {
        &self.edits
    }

    /// True if the transaction carries no edits.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Thread-safe reference store.
#[derive(Debug, Default)]
pub struct RefStore {
    refs: RwLock<HashMap<String, Reference>>,
}

impl RefStore {
    /// Creates a new empty reference store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a reference by name.
    pub fn get(&self, name: &str) -> Result<Reference> {
        self.refs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::RefNotFound(name.to_string()))
    }

    /// Sets a reference to point to an object.
    pub fn set(&self, name: &str, target: ObjectId) {
        self.refs
            .write()
            .insert(name.to_string(), Reference::Direct(target));
    }

    /// Sets a symbolic reference.
    pub fn set_symbolic(&self, name: &str, target: &str) {
        self.refs
            .write()
            .insert(name.to_string(), Reference::Symbolic(target.to_string()));
    }

    /// Deletes a reference.
    pub fn delete(&self, name: &str) -> Result<()> {
        self.refs
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::RefNotFound(name.to_string()))
    }

    /// Lists all references with a given prefix.
    pub fn list(&self, prefix: &str) -> Vec<(String, Reference)> {
        self.refs
            .read()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, refr)| (name.clone(), refr.clone()))
            .collect()
    }

    /// Lists all references.
    pub fn list_all(&self) -> Vec<(String, Reference)> {
        self.refs
            .read()
            .iter()
            .map(|(name, refr)| (name.clone(), refr.clone()))
            .collect()
    }

    /// Snapshot of all direct refs and their targets.
    ///
    /// Symbolic entries (HEAD) are excluded; callers that need HEAD use
    /// [`RefStore::head_target`].
    pub fn current_refs(&self) -> HashMap<String, ObjectId> {
        self.refs
            .read()
            .iter()
            .filter_map(|(name, refr)| refr.as_direct().map(|id| (name.clone(), id)))
            .collect()
    }

    /// The symbolic target of HEAD, if HEAD exists and is symbolic.
    pub fn head_target(&self) -> Option<String> {
        match self.refs.read().get("HEAD")? {
            Reference::Symbolic(target) => Some(target.clone()),
            Reference::Direct(_) => None,
        }
    }

    /// Resolves HEAD to a commit id.
    pub fn resolve_head(&self) -> Result<ObjectId> {
        let head = self.get("HEAD")?;
        match head {
            Reference::Direct(id) => Ok(id),
            Reference::Symbolic(target) => {
                let target_ref = self.get(&target)?;
                match target_ref {
                    Reference::Direct(id) => Ok(id),
                    Reference::Symbolic(_) => Err(StorageError::InvalidRef(
                        "nested symbolic refs not supported".to_string(),
                    )),
                }
            }
        }
    }

    /// Gets the current branch name (if HEAD is symbolic).
    pub fn current_branch(&self) -> Option<String> {
        match self.get("HEAD").ok()? {
            Reference::Symbolic(target) => {
                target.strip_prefix("refs/heads/").map(|s| s.to_string())
            }
            Reference::Direct(_) => None,
        }
    }

    /// Commits a transaction: every edit's `expected` value is
    /// re-verified against the live map under the write lock, and only
    /// if all of them still hold are the edits applied. A mismatch
    /// leaves the store untouched and reports the first conflicting
    /// ref name.
    pub fn commit(&self, tx: &RefTransaction) -> Result<()> {
        let mut refs = self.refs.write();

        for edit in &tx.edits {
            let current = refs.get(&edit.name).and_then(Reference::as_direct);
            let holds = match (current, edit.expected) {
                (None, None) => true,
                (Some(cur), Some(exp)) => cur == exp,
                _ => false,
            };
            if !holds {
                return Err(StorageError::CommitConflict(edit.name.clone()));
            }
        }

        for edit in &tx.edits {
            match edit.target {
                Some(id) => {
                    refs.insert(edit.name.clone(), Reference::Direct(id));
                }
                None => {
                    refs.remove(&edit.name);
                }
            }
        }

        if let Some(target) = &tx.head_target {
            refs.entry("HEAD".to_string())
                .or_insert_with(|| Reference::Symbolic(target.clone()));
        }

        Ok(())
    }
}
