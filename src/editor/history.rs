use crate::scene::{DataModel, GraphError, InstanceId, ParentChange, PropertyValue};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// One reversible mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoChange {
    /// `instance` was created under `parent`. The index is captured when the
    /// change is first undone so redo can put the instance back in place.
    InstanceCreated {
        instance: InstanceId,
        parent: InstanceId,
        index: Option<usize>,
    },
    /// `instance` was detached from `parent` at `index`.
    InstanceDeleted {
        instance: InstanceId,
        parent: InstanceId,
        index: usize,
    },
    InstanceReparented {
        instance: InstanceId,
        old_parent: Option<InstanceId>,
        old_index: Option<usize>,
        new_parent: Option<InstanceId>,
        new_index: Option<usize>,
    },
    PropertyChanged {
        instance: InstanceId,
        property: String,
        old_value: PropertyValue,
        new_value: PropertyValue,
    },
}

impl UndoChange {
    pub fn created(instance: InstanceId, parent: InstanceId) -> Self {
        UndoChange::InstanceCreated {
            instance,
            parent,
            index: None,
        }
    }

    pub fn reparented(change: &ParentChange) -> Self {
        UndoChange::InstanceReparented {
            instance: change.instance,
            old_parent: change.old_parent,
            old_index: change.old_index,
            new_parent: change.new_parent,
            new_index: change.new_index,
        }
    }

    fn referenced(&self) -> Vec<InstanceId> {
        match self {
            UndoChange::InstanceCreated {
                instance, parent, ..
            }
            | UndoChange::InstanceDeleted {
                instance, parent, ..
            } => vec![*instance, *parent],
            UndoChange::InstanceReparented {
                instance,
                old_parent,
                new_parent,
                ..
            } => std::iter::once(*instance)
                .chain(*old_parent)
                .chain(*new_parent)
                .collect(),
            UndoChange::PropertyChanged { instance, .. } => vec![*instance],
        }
    }

    fn revert(&mut self, model: &mut DataModel) -> Result<(), GraphError> {
        match self {
            UndoChange::InstanceCreated {
                instance, index, ..
            } => {
                let change = model.set_parent(*instance, None)?;
                *index = change.old_index;
            }
            UndoChange::InstanceDeleted {
                instance,
                parent,
                index,
            } => {
                model.set_parent_at(*instance, *parent, *index)?;
            }
            UndoChange::InstanceReparented {
                instance,
                old_parent,
                old_index,
                ..
            } => place(model, *instance, *old_parent, *old_index)?,
            UndoChange::PropertyChanged {
                instance,
                property,
                old_value,
                ..
            } => {
                model.set_property(*instance, property, old_value.clone())?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, model: &mut DataModel) -> Result<(), GraphError> {
        match self {
            UndoChange::InstanceCreated {
                instance,
                parent,
                index,
            } => place(model, *instance, Some(*parent), *index)?,
            UndoChange::InstanceDeleted { instance, .. } => {
                model.set_parent(*instance, None)?;
            }
            UndoChange::InstanceReparented {
                instance,
                new_parent,
                new_index,
                ..
            } => place(model, *instance, *new_parent, *new_index)?,
            UndoChange::PropertyChanged {
                instance,
                property,
                new_value,
                ..
            } => {
                model.set_property(*instance, property, new_value.clone())?;
            }
        }
        Ok(())
    }
}

fn place(
    model: &mut DataModel,
    instance: InstanceId,
    parent: Option<InstanceId>,
    index: Option<usize>,
) -> Result<(), GraphError> {
    match (parent, index) {
        (Some(parent), Some(index)) => model.set_parent_at(instance, parent, index)?,
        (parent, _) => model.set_parent(instance, parent)?,
    };
    Ok(())
}

/// A labelled group of changes undone and redone as one step.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoState {
    pub label: String,
    pub changes: Vec<UndoChange>,
}

impl UndoState {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            changes: Vec::new(),
        }
    }

    pub fn with_change(mut self, change: UndoChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn push(&mut self, change: UndoChange) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn referenced(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.changes.iter().flat_map(UndoChange::referenced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    Empty,
    HasUndo,
    HasRedo,
    HasBoth,
}

/// Bounded undo stack with a cursor. States below the cursor can be undone;
/// states at or above it can be redone.
#[derive(Debug)]
pub struct UndoHistory {
    states: VecDeque<UndoState>,
    cursor: usize,
    capacity: usize,
}

impl UndoHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Records a state. Every instance it mentions is retained until the
    /// state leaves the history; the redo branch is discarded.
    pub fn push_state(&mut self, model: &mut DataModel, state: UndoState) -> Result<(), HistoryError> {
        if let Some(missing) = state.referenced().find(|id| !model.contains(*id)) {
            return Err(GraphError::NoSuchInstance(missing).into());
        }
        for id in state.referenced() {
            model.retain(id)?;
        }

        while self.states.len() > self.cursor {
            if let Some(discarded) = self.states.pop_back() {
                log::trace!("[history] discarding redo state '{}'", discarded.label);
                release_state(model, &discarded);
            }
        }

        log::debug!("[history] recorded '{}' ({} changes)", state.label, state.changes.len());
        self.states.push_back(state);
        self.cursor = self.states.len();

        while self.states.len() > self.capacity {
            if let Some(evicted) = self.states.pop_front() {
                log::trace!("[history] evicting '{}'", evicted.label);
                release_state(model, &evicted);
                self.cursor -= 1;
            }
        }
        Ok(())
    }

    /// Reverts the state below the cursor. If a change fails, the changes
    /// already reverted are re-applied and the cursor stays put.
    pub fn undo(&mut self, model: &mut DataModel) -> Result<&str, HistoryError> {
        if self.cursor == 0 {
            return Err(HistoryError::NothingToUndo);
        }
        let state = &mut self.states[self.cursor - 1];
        let count = state.changes.len();
        for position in (0..count).rev() {
            if let Err(err) = state.changes[position].revert(model) {
                log::warn!("[history] undo of '{}' failed: {err}", state.label);
                for change in &mut state.changes[position + 1..] {
                    if let Err(err) = change.apply(model) {
                        log::error!("[history] failed to restore after undo error: {err}");
                    }
                }
                return Err(err.into());
            }
        }
        self.cursor -= 1;
        let label = &self.states[self.cursor].label;
        log::debug!("[history] undid '{label}'");
        Ok(label)
    }

    /// Re-applies the state at the cursor, with the same rollback rule as
    /// [`UndoHistory::undo`].
    pub fn redo(&mut self, model: &mut DataModel) -> Result<&str, HistoryError> {
        if self.cursor >= self.states.len() {
            return Err(HistoryError::NothingToRedo);
        }
        let state = &mut self.states[self.cursor];
        let count = state.changes.len();
        for position in 0..count {
            if let Err(err) = state.changes[position].apply(model) {
                log::warn!("[history] redo of '{}' failed: {err}", state.label);
                for change in state.changes[..position].iter_mut().rev() {
                    if let Err(err) = change.revert(model) {
                        log::error!("[history] failed to restore after redo error: {err}");
                    }
                }
                return Err(err.into());
            }
        }
        self.cursor += 1;
        let label = &self.states[self.cursor - 1].label;
        log::debug!("[history] redid '{label}'");
        Ok(label)
    }

    pub fn status(&self) -> HistoryStatus {
        match (self.cursor > 0, self.cursor < self.states.len()) {
            (false, false) => HistoryStatus::Empty,
            (true, false) => HistoryStatus::HasUndo,
            (false, true) => HistoryStatus::HasRedo,
            (true, true) => HistoryStatus::HasBoth,
        }
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|index| self.states.get(index))
            .map(|state| state.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.states
            .get(self.cursor)
            .map(|state| state.label.as_str())
    }

    /// Drops every state and releases what they held.
    pub fn clear(&mut self, model: &mut DataModel) {
        for state in self.states.drain(..) {
            release_state(model, &state);
        }
        self.cursor = 0;
    }
}

fn release_state(model: &mut DataModel, state: &UndoState) {
    for id in state.referenced() {
        model.release(id);
    }
}
