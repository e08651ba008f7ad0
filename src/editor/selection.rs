use crate::scene::{DataModel, InstanceId};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Which surface asked for a selection change. Observers use it to ignore
/// changes they caused themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionOrigin {
    Explorer,
    Viewport,
    Command,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChanged {
    pub origin: SelectionOrigin,
    pub selected: Vec<InstanceId>,
    pub revision: u64,
}

/// Ordered set of selected instances. Entries are non-owning: destroyed
/// instances simply stop showing up.
#[derive(Debug, Default)]
pub struct Selection {
    items: Vec<InstanceId>,
    revision: u64,
    subscribers: Vec<Sender<SelectionChanged>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<SelectionChanged> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replaces the selection. Duplicates keep their first position and
    /// expired ids are dropped. Returns false when nothing changed.
    pub fn set<I>(&mut self, model: &DataModel, ids: I, origin: SelectionOrigin) -> bool
    where
        I: IntoIterator<Item = InstanceId>,
    {
        let mut next: Vec<InstanceId> = Vec::new();
        for id in ids {
            if model.contains(id) && !next.contains(&id) {
                next.push(id);
            }
        }
        let current: Vec<InstanceId> = self.get(model).collect();
        if current == next {
            self.items = next;
            return false;
        }
        self.items = next;
        self.revision += 1;
        log::debug!(
            "[selection] {} item(s) selected via {origin:?} (revision {})",
            self.items.len(),
            self.revision
        );
        self.notify(origin);
        true
    }

    pub fn clear(&mut self, model: &DataModel, origin: SelectionOrigin) -> bool {
        self.set(model, std::iter::empty(), origin)
    }

    /// Live selected ids, in selection order.
    pub fn get<'a>(&'a self, model: &'a DataModel) -> impl Iterator<Item = InstanceId> + 'a {
        self.items.iter().copied().filter(|id| model.contains(*id))
    }

    pub fn primary(&self, model: &DataModel) -> Option<InstanceId> {
        self.get(model).next()
    }

    pub fn contains(&self, model: &DataModel, id: InstanceId) -> bool {
        model.contains(id) && self.items.contains(&id)
    }

    pub fn len(&self, model: &DataModel) -> usize {
        self.get(model).count()
    }

    pub fn is_empty(&self, model: &DataModel) -> bool {
        self.get(model).next().is_none()
    }

    /// Drops expired ids from storage. Not a change from the observers'
    /// point of view, so nobody is notified.
    pub fn prune(&mut self, model: &DataModel) -> usize {
        let before = self.items.len();
        self.items.retain(|id| model.contains(*id));
        before - self.items.len()
    }

    fn notify(&mut self, origin: SelectionOrigin) {
        let event = SelectionChanged {
            origin,
            selected: self.items.clone(),
            revision: self.revision,
        };
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => {
                    log::trace!("[selection] dropping disconnected subscriber");
                    false
                }
            });
    }
}
