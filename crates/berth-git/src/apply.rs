//! Ref update validation and application.
//!
//! Every command is checked against a snapshot of the repository taken
//! under the push lock: the old id must match the ref's current value,
//! the new object must exist and be fully connected, and deletions
//! must name a ref that exists. Commands that pass become one ref
//! transaction; the first branch created in an unborn repository also
//! establishes HEAD.

use crate::commands::RefUpdateCommand;
use crate::report::{RefStatus, RejectReason};
use crate::Result;
use berth_storage::{ObjectId, ObjectStore, RefEdit, RefTransaction, Repository};
use std::collections::{HashMap, HashSet};

/// Policy knobs for a push.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Apply all commands or none.
    pub atomic: bool,
    /// Whether ref deletion commands are honored.
    pub allow_deletes: bool,
    /// Whether updates may discard commits.
    pub allow_non_fast_forward: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            atomic: false,
            allow_deletes: true,
            allow_non_fast_forward: true,
        }
    }
}

/// Validates and applies a command list against one repository.
#[derive(Debug)]
pub struct Applier<'a> {
    repo: &'a Repository,
    options: ApplyOptions,
}

impl<'a> Applier<'a> {
    pub fn new(repo: &'a Repository, options: ApplyOptions) -> Self {
        Self { repo, options }
    }

    /// Applies the commands and returns one status per command, in
    /// command order.
    ///
    /// The repository's push lock is held from snapshot to commit so a
    /// concurrent push cannot change a ref between its check and its
    /// update.
    pub fn apply(&self, commands: &[RefUpdateCommand]) -> Result<Vec<RefStatus>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.repo.push_lock().lock();
        let snapshot = self.repo.refs.current_refs();
        let bootstrap = snapshot.is_empty() && self.repo.refs.head_target().is_none();

        let checked: Vec<_> = commands
            .iter()
            .map(|cmd| self.check(cmd, &snapshot))
            .collect();

        if self.options.atomic && checked.iter().any(std::result::Result::is_err) {
            let statuses = commands
                .iter()
                .zip(&checked)
                .map(|(cmd, outcome)| match outcome {
                    Err(reason) => RefStatus::rejected(&cmd.name, reason),
                    Ok(_) => RefStatus::rejected(&cmd.name, RejectReason::AtomicAborted),
                })
                .collect();
            tracing::debug!(
                repo = %self.repo.name,
                commands = commands.len(),
                "atomic push aborted"
            );
            return Ok(statuses);
        }

        let mut tx = RefTransaction::new();
        for (cmd, outcome) in commands.iter().zip(&checked) {
            if let Ok(edit) = outcome {
                if bootstrap
                    && self.repo.refs.head_target().is_none()
                    && edit.target.is_some()
                    && edit.name.starts_with("refs/heads/")
                    && tx.edits().iter().all(|e| !e.name.starts_with("refs/heads/"))
                {
                    tx.set_head_if_unborn(edit.name.clone());
                }
                tx.edit(edit.clone());
            }
        }

        // Cannot conflict while the push lock is held; the store
        // re-verifies anyway.
        self.repo.refs.commit(&tx)?;

        let statuses: Vec<_> = commands
            .iter()
            .zip(checked)
            .map(|(cmd, outcome)| match outcome {
                Ok(_) => RefStatus::ok(&cmd.name),
                Err(reason) => RefStatus::rejected(&cmd.name, reason),
            })
            .collect();

        tracing::debug!(
            repo = %self.repo.name,
            applied = statuses.iter().filter(|s| s.is_ok()).count(),
            rejected = statuses.iter().filter(|s| !s.is_ok()).count(),
            "push applied"
        );
        Ok(statuses)
    }

    fn check(
        &self,
        cmd: &RefUpdateCommand,
        snapshot: &HashMap<String, ObjectId>,
    ) -> std::result::Result<RefEdit, RejectReason> {
        let current = snapshot.get(&cmd.name).copied();

        if cmd.is_delete() {
            if !self.options.allow_deletes {
                return Err(RejectReason::DeletionProhibited);
            }
            let Some(current) = current else {
                return Err(RejectReason::NoSuchRef);
            };
            if cmd.old_id != current {
                return Err(RejectReason::Stale);
            }
            return Ok(RefEdit {
                name: cmd.name.clone(),
                expected: Some(current),
                target: None,
            });
        }

        match current {
            None if !cmd.is_create() => return Err(RejectReason::Stale),
            Some(_) if cmd.is_create() => return Err(RejectReason::Stale),
            Some(cur) if cmd.old_id != cur => return Err(RejectReason::Stale),
            _ => {}
        }

        if current == Some(cmd.new_id) {
            // Re-push of the value already held. Report ok, change nothing.
            return Ok(RefEdit {
                name: cmd.name.clone(),
                expected: current,
                target: Some(cmd.new_id),
            });
        }

        if !self.repo.objects.contains(&cmd.new_id) || !self.repo.objects.reachable(&cmd.new_id) {
            return Err(RejectReason::UnknownObject);
        }

        if let Some(cur) = current {
            if !self.options.allow_non_fast_forward
                && !is_fast_forward(&self.repo.objects, &cur, &cmd.new_id)
            {
                return Err(RejectReason::NonFastForward);
            }
        }

        Ok(RefEdit {
            name: cmd.name.clone(),
            expected: current,
            target: Some(cmd.new_id),
        })
    }
}

/// True when `new` has `old` in its ancestry, so moving the ref from
/// `old` to `new` discards nothing.
fn is_fast_forward(objects: &ObjectStore, old: &ObjectId, new: &ObjectId) -> bool {
    if old == new {
        return true;
    }
    // A ref pointing at an object the store no longer holds cannot be
    // walked; treat the move as a replacement rather than a rejection.
    if !objects.contains(old) {
        return true;
    }

    let mut seen = HashSet::new();
    let mut queue = vec![*new];
    while let Some(id) = queue.pop() {
        if id == *old {
            return true;
        }
        if !seen.insert(id) {
            continue;
        }
        let Ok(object) = objects.get(&id) else {
            continue;
        };
        queue.extend(object.parent_ids());
    }
    false
}
