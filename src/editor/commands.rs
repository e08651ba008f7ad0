use crate::scene::{DataModel, GraphError, InstanceId, PropertyValue};
use crossbeam_channel::{Receiver, Sender};

/// A graph mutation requested from outside the editing thread.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCommand {
    Destroy(InstanceId),
    SetParent {
        instance: InstanceId,
        parent: Option<InstanceId>,
    },
    SetProperty {
        instance: InstanceId,
        property: String,
        value: PropertyValue,
    },
}

impl GraphCommand {
    pub fn target(&self) -> InstanceId {
        match self {
            GraphCommand::Destroy(instance)
            | GraphCommand::SetParent { instance, .. }
            | GraphCommand::SetProperty { instance, .. } => *instance,
        }
    }

    fn apply(self, model: &mut DataModel) -> Result<(), GraphError> {
        match self {
            GraphCommand::Destroy(instance) => {
                model.destroy(instance)?;
            }
            GraphCommand::SetParent { instance, parent } => {
                model.set_parent(instance, parent)?;
            }
            GraphCommand::SetProperty {
                instance,
                property,
                value,
            } => {
                model.set_property(instance, &property, value)?;
            }
        }
        Ok(())
    }
}

/// Cloneable, `Send` handle for enqueueing commands.
#[derive(Debug, Clone)]
pub struct CommandSender {
    sender: Sender<GraphCommand>,
}

impl CommandSender {
    /// Returns false once the queue has been dropped.
    pub fn submit(&self, command: GraphCommand) -> bool {
        match self.sender.send(command) {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    "[commands] queue closed, dropping command for {}",
                    err.0.target()
                );
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub applied: usize,
    pub failed: usize,
}

/// Commands waiting for the editing thread. Applied commands are not
/// recorded in the undo history.
#[derive(Debug)]
pub struct CommandQueue {
    sender: Sender<GraphCommand>,
    receiver: Receiver<GraphCommand>,
    total_applied: usize,
    total_failed: usize,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            total_applied: 0,
            total_failed: 0,
        }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    pub fn pending_depth(&self) -> usize {
        self.receiver.len()
    }

    pub fn drain_pending(&mut self) -> Vec<GraphCommand> {
        self.receiver.try_iter().collect()
    }

    /// Applies every pending command in submission order. Failures are
    /// logged and skipped.
    pub fn apply_pending(&mut self, model: &mut DataModel) -> CommandReport {
        let mut report = CommandReport::default();
        for command in self.drain_pending() {
            let target = command.target();
            match command.apply(model) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    log::warn!("[commands] skipping command for {target}: {err}");
                    report.failed += 1;
                }
            }
        }
        self.total_applied += report.applied;
        self.total_failed += report.failed;
        report
    }

    pub fn total_applied(&self) -> usize {
        self.total_applied
    }

    pub fn total_failed(&self) -> usize {
        self.total_failed
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
