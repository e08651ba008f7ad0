pub mod commands;
pub mod history;
pub mod selection;

pub use commands::{CommandQueue, CommandReport, CommandSender, GraphCommand};
pub use history::{HistoryError, HistoryStatus, UndoChange, UndoHistory, UndoState};
pub use selection::{Selection, SelectionChanged, SelectionOrigin};

use crate::config::EditorConfig;
use crate::physics::{ContactHandler, PartContact};
use crate::registry::TypeRegistry;
use crate::scene::{DataModel, GraphError, InstanceId, ParentChange, PropertyValue};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Part-side contacts handed to contact handlers.
    pub dispatched: usize,
    /// Contact sides whose body did not resolve to a live part.
    pub unresolved: usize,
    pub commands: CommandReport,
}

/// Editing context tying the graph to its selection, history, clipboard and
/// command queue. Every user-facing mutation goes through here so it lands in
/// the undo history.
pub struct EditorSession {
    model: DataModel,
    selection: Selection,
    history: UndoHistory,
    commands: CommandQueue,
    clipboard: Vec<InstanceId>,
    contact_handlers: Vec<Box<dyn ContactHandler>>,
}

impl EditorSession {
    pub fn new(config: &EditorConfig) -> Result<Self, SessionError> {
        Self::with_registry(crate::registry::builtin(), config)
    }

    pub fn with_registry(registry: Arc<TypeRegistry>, config: &EditorConfig) -> Result<Self, SessionError> {
        let model = DataModel::new(registry, config.physics.clone())?;
        Ok(Self {
            model,
            selection: Selection::new(),
            history: UndoHistory::new(config.undo_capacity),
            commands: CommandQueue::new(),
            clipboard: Vec::new(),
            contact_handlers: Vec::new(),
        })
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    /// Direct graph access. Mutations made here bypass the undo history.
    pub fn model_mut(&mut self) -> &mut DataModel {
        &mut self.model
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn select<I>(&mut self, ids: I, origin: SelectionOrigin) -> bool
    where
        I: IntoIterator<Item = InstanceId>,
    {
        self.selection.set(&self.model, ids, origin)
    }

    pub fn selected(&self) -> Vec<InstanceId> {
        self.selection.get(&self.model).collect()
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    /// Records a caller-built state, e.g. a multi-change edit from a tool.
    pub fn push_state(&mut self, state: UndoState) -> Result<(), SessionError> {
        self.history.push_state(&mut self.model, state)?;
        Ok(())
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn add_contact_handler<H>(&mut self, handler: H)
    where
        H: ContactHandler + 'static,
    {
        self.contact_handlers.push(Box::new(handler));
    }

    pub fn clipboard_len(&self) -> usize {
        self.clipboard.len()
    }

    /// Creates `class` under the primary selection and selects it. Returns
    /// `None` when nothing is selected.
    pub fn insert_object(&mut self, class: &str) -> Result<Option<InstanceId>, SessionError> {
        let Some(parent) = self.selection.primary(&self.model) else {
            log::debug!("[session] insert {class} ignored: nothing selected");
            return Ok(None);
        };
        let instance = self.model.create(class)?;
        if let Err(err) = self.model.set_parent(instance, Some(parent)) {
            self.model.destroy(instance)?;
            return Err(err.into());
        }
        self.history.push_state(
            &mut self.model,
            UndoState::new(format!("Insert {class}")).with_change(UndoChange::created(instance, parent)),
        )?;
        self.selection
            .set(&self.model, [instance], SelectionOrigin::Command);
        log::info!("[session] inserted {class} {instance} under {parent}");
        Ok(Some(instance))
    }

    /// Detaches every selected instance as one undoable step. Instances
    /// stay alive while the history can still restore them. Returns the
    /// number of deleted instances.
    pub fn delete_selection(&mut self) -> Result<usize, SessionError> {
        let targets = self.top_level_selection();
        if targets.is_empty() {
            return Ok(0);
        }

        let mut done: Vec<ParentChange> = Vec::with_capacity(targets.len());
        for id in &targets {
            match self.model.set_parent(*id, None) {
                Ok(change) => done.push(change),
                Err(err) => {
                    self.restore_detached(&done);
                    return Err(err.into());
                }
            }
        }

        let mut state = UndoState::new(match targets.as_slice() {
            [single] => format!("Delete {}", self.model.name(*single).unwrap_or("object")),
            many => format!("Delete {} objects", many.len()),
        });
        for change in &done {
            if let (Some(parent), Some(index)) = (change.old_parent, change.old_index) {
                state.push(UndoChange::InstanceDeleted {
                    instance: change.instance,
                    parent,
                    index,
                });
            }
        }
        self.history.push_state(&mut self.model, state)?;
        self.selection
            .clear(&self.model, SelectionOrigin::Command);
        log::info!("[session] deleted {} instance(s)", done.len());
        Ok(done.len())
    }

    fn restore_detached(&mut self, done: &[ParentChange]) {
        for change in done.iter().rev() {
            if let (Some(parent), Some(index)) = (change.old_parent, change.old_index) {
                if let Err(err) = self.model.set_parent_at(change.instance, parent, index) {
                    log::error!("[session] failed to restore {}: {err}", change.instance);
                }
            }
        }
    }

    /// Selected, parented, non-service instances whose ancestors are not
    /// selected themselves.
    fn top_level_selection(&self) -> Vec<InstanceId> {
        let selected: Vec<InstanceId> = self.selection.get(&self.model).collect();
        selected
            .iter()
            .copied()
            .filter(|id| {
                self.model.parent(*id).is_some()
                    && !self
                        .model
                        .descriptor(*id)
                        .is_some_and(|descriptor| descriptor.is_service())
                    && !self
                        .model
                        .ancestors(*id)
                        .any(|ancestor| selected.contains(&ancestor))
            })
            .collect()
    }

    /// Moves `node` and records the move. A no-op move records nothing.
    pub fn reparent(
        &mut self,
        node: InstanceId,
        parent: Option<InstanceId>,
        index: Option<usize>,
    ) -> Result<ParentChange, SessionError> {
        let change = match (parent, index) {
            (Some(parent), Some(index)) => self.model.set_parent_at(node, parent, index)?,
            (parent, _) => self.model.set_parent(node, parent)?,
        };
        if !change.is_noop() {
            let label = format!("Move {}", self.model.name(node).unwrap_or("object"));
            self.history.push_state(
                &mut self.model,
                UndoState::new(label).with_change(UndoChange::reparented(&change)),
            )?;
        }
        Ok(change)
    }

    /// Writes a property and records the change unless the value is
    /// unchanged. Returns the previous value.
    pub fn set_property(
        &mut self,
        node: InstanceId,
        property: &str,
        value: PropertyValue,
    ) -> Result<PropertyValue, SessionError> {
        let old_value = self.model.set_property(node, property, value.clone())?;
        if old_value != value {
            self.history.push_state(
                &mut self.model,
                UndoState::new(format!("Change {property}")).with_change(UndoChange::PropertyChanged {
                    instance: node,
                    property: property.to_string(),
                    old_value: old_value.clone(),
                    new_value: value,
                }),
            )?;
        }
        Ok(old_value)
    }

    /// Replaces the clipboard with detached copies of the selection.
    pub fn copy_selection(&mut self) -> Result<usize, SessionError> {
        let sources = self.top_level_selection();
        self.clear_clipboard();
        for source in sources {
            let copy = self.model.clone_subtree(source)?;
            self.model.retain(copy)?;
            self.clipboard.push(copy);
        }
        log::debug!("[session] copied {} instance(s)", self.clipboard.len());
        Ok(self.clipboard.len())
    }

    pub fn cut_selection(&mut self) -> Result<usize, SessionError> {
        self.copy_selection()?;
        self.delete_selection()
    }

    /// Pastes fresh copies of the clipboard under `parent` as one undoable
    /// step and selects them.
    pub fn paste_into(&mut self, parent: InstanceId) -> Result<Vec<InstanceId>, SessionError> {
        if self.clipboard.is_empty() {
            return Ok(Vec::new());
        }
        let mut pasted = Vec::with_capacity(self.clipboard.len());
        for source in self.clipboard.clone() {
            let copy = self.model.clone_subtree(source)?;
            if let Err(err) = self.model.set_parent(copy, Some(parent)) {
                for placed in pasted.iter().chain(std::iter::once(&copy)) {
                    if let Err(cleanup) = self.model.destroy(*placed) {
                        log::error!("[session] failed to discard pasted {placed}: {cleanup}");
                    }
                }
                return Err(err.into());
            }
            pasted.push(copy);
        }

        let mut state = UndoState::new("Paste");
        for copy in &pasted {
            state.push(UndoChange::created(*copy, parent));
        }
        self.history.push_state(&mut self.model, state)?;
        self.selection
            .set(&self.model, pasted.iter().copied(), SelectionOrigin::Command);
        Ok(pasted)
    }

    fn clear_clipboard(&mut self) {
        for held in self.clipboard.drain(..) {
            self.model.release(held);
        }
    }

    pub fn undo(&mut self) -> Result<String, SessionError> {
        let label = self.history.undo(&mut self.model)?.to_string();
        self.after_history_move();
        Ok(label)
    }

    pub fn redo(&mut self) -> Result<String, SessionError> {
        let label = self.history.redo(&mut self.model)?.to_string();
        self.after_history_move();
        Ok(label)
    }

    fn after_history_move(&mut self) {
        self.selection.prune(&self.model);
        self.model.collect_garbage();
    }

    /// Advances the simulation, hands every resolvable contact to the
    /// registered handlers and applies the commands they queued.
    pub fn step(&mut self, dt: f32) -> StepReport {
        let contacts = self.model.step_simulation(dt);
        let sender = self.commands.sender();
        let mut report = StepReport::default();

        for contact in contacts {
            for (body, other) in [(contact.a, contact.b), (contact.b, contact.a)] {
                let part = match self.model.resolve_owner(body) {
                    Ok(part) => part,
                    Err(err) => {
                        log::warn!("[session] skipping contact callback: {err}");
                        report.unresolved += 1;
                        continue;
                    }
                };
                let part_contact = PartContact {
                    part,
                    other: self.model.resolve_owner(other).ok(),
                    phase: contact.phase,
                };
                for handler in &mut self.contact_handlers {
                    handler.on_contact(&part_contact, &self.model, &sender);
                }
                report.dispatched += 1;
            }
        }

        report.commands = self.commands.apply_pending(&mut self.model);
        if report.commands.applied > 0 {
            self.selection.prune(&self.model);
            self.model.collect_garbage();
        }
        report
    }
}
