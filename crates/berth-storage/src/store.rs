//! Object store and repository management.

use crate::{GitObject, ObjectId, RefStore, Reference, Result, StorageError};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Content-addressed object store.
#[derive(Debug, Default)]
pub struct ObjectStore {
    /// Objects indexed by their SHA-1 hash.
    objects: RwLock<HashMap<ObjectId, GitObject>>,
}

impl ObjectStore {
    /// Creates a new empty object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object and returns its ID.
    pub fn write(&self, object: GitObject) -> ObjectId {
        let id = object.id;
        self.objects.write().insert(id, object);
        id
    }

    /// Retrieves an object by ID.
    pub fn get(&self, id: &ObjectId) -> Result<GitObject> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound(id.to_hex()))
    }

    /// Checks if an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.read().contains_key(id)
    }

    /// Returns the number of objects in the store.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Lists all object IDs.
    pub fn list_objects(&self) -> Vec<ObjectId> {
        self.objects.read().keys().copied().collect()
    }

    /// Stores a blob and returns its ID.
    pub fn write_blob(&self, content: impl Into<Bytes>) -> ObjectId {
        self.write(GitObject::blob(content))
    }

    /// Connectivity check: `id` and every object it links to
    /// (transitively, through commit `tree` and `parent` headers) must
    /// be present in the store.
    pub fn reachable(&self, id: &ObjectId) -> bool {
        let objects = self.objects.read();
        let mut seen = HashSet::new();
        let mut queue = vec![*id];

        while let Some(next) = queue.pop() {
            if !seen.insert(next) {
                continue;
            }
            let Some(object) = objects.get(&next) else {
                tracing::debug!(id = %next, "connectivity check missing object");
                return false;
            };
            queue.extend(object.linked_ids());
        }
        true
    }
}

/// A git repository with objects and references.
///
/// A fresh repository has no refs at all, not even HEAD. The first
/// successful push establishes HEAD.
#[derive(Debug)]
pub struct Repository {
    /// Repository name.
    pub name: String,
    /// Repository owner.
    pub owner: String,
    /// Object store.
    pub objects: Arc<ObjectStore>,
    /// Reference store.
    pub refs: Arc<RefStore>,
    /// Serializes pushes to this repository. Held across the whole
    /// validate-then-commit span of a push so two concurrent pushes
    /// cannot interleave.
    push_lock: Mutex<()>,
}

impl Repository {
    /// Creates a new empty repository with an unborn HEAD.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            objects: Arc::new(ObjectStore::new()),
            refs: Arc::new(RefStore::new()),
            push_lock: Mutex::new(()),
        }
    }

    /// The push serialization lock.
    pub fn push_lock(&self) -> &Mutex<()> {
        &self.push_lock
    }

    /// True if the repository has no refs yet.
    pub fn is_unborn(&self) -> bool {
        self.refs.list_all().is_empty()
    }

    /// Gets the current HEAD commit.
    pub fn head(&self) -> Result<ObjectId> {
        self.refs.resolve_head()
    }

    /// Gets the current branch name.
    pub fn current_branch(&self) -> Option<String> {
        self.refs.current_branch()
    }

    /// Lists all references.
    pub fn list_refs(&self) -> Vec<(String, Reference)> {
        self.refs.list_all()
    }
}

/// Global repository store.
#[derive(Debug, Default)]
pub struct RepoStore {
    repos: RwLock<HashMap<String, Arc<Repository>>>,
}

impl RepoStore {
    /// Creates a new empty repository store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new repository.
    pub fn create(&self, name: &str, owner: &str) -> Result<Arc<Repository>> {
        let mut repos = self.repos.write();
        let key = format!("{}/{}", owner, name);

        if repos.contains_key(&key) {
            return Err(StorageError::RepoExists(key));
        }

        let repo = Arc::new(Repository::new(name, owner));
        repos.insert(key.clone(), repo.clone());
        tracing::debug!(repo = %key, "created repository");
        Ok(repo)
    }

    /// Gets a repository by owner and name.
    pub fn get(&self, owner: &str, name: &str) -> Result<Arc<Repository>> {
        let key = format!("{}/{}", owner, name);
        self.repos
            .read()
            .get(&key)
            .cloned()
            .ok_or(StorageError::RepoNotFound(key))
    }

    /// Lists all repositories.
    pub fn list(&self) -> Vec<Arc<Repository>> {
        self.repos.read().values().cloned().collect()
    }
}
