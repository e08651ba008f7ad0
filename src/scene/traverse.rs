use super::{DataModel, InstanceId};

/// Lazy pre-order walk below a node. Parents are yielded before their
/// children and siblings keep their child order, so the sequence is stable
/// for serializers.
pub struct Descendants<'a> {
    model: &'a DataModel,
    stack: Vec<InstanceId>,
}

impl<'a> Descendants<'a> {
    pub(super) fn below(model: &'a DataModel, root: InstanceId) -> Self {
        let mut stack = Vec::new();
        stack.extend(model.children(root).iter().rev().copied());
        Self { model, stack }
    }

    pub(super) fn including(model: &'a DataModel, root: InstanceId) -> Self {
        let stack = if model.contains(root) { vec![root] } else { Vec::new() };
        Self { model, stack }
    }
}

impl Iterator for Descendants<'_> {
    type Item = InstanceId;

    fn next(&mut self) -> Option<InstanceId> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.model.children(next).iter().rev().copied());
        Some(next)
    }
}

/// Walks parent links upwards, starting with the parent of the given node.
pub struct Ancestors<'a> {
    model: &'a DataModel,
    current: Option<InstanceId>,
}

impl<'a> Ancestors<'a> {
    pub(super) fn of(model: &'a DataModel, node: InstanceId) -> Self {
        Self {
            model,
            current: model.parent(node),
        }
    }
}

impl Iterator for Ancestors<'_> {
    type Item = InstanceId;

    fn next(&mut self) -> Option<InstanceId> {
        let current = self.current?;
        self.current = self.model.parent(current);
        Some(current)
    }
}
