use proptest::prelude::*;
use studio_core::editor::{HistoryStatus, SelectionOrigin, UndoChange, UndoHistory, UndoState};
use studio_core::scene::{GraphError, PropertyValue};
use studio_core::{DataModel, EditorConfig, EditorSession, InstanceId};

fn folder_under_workspace(model: &mut DataModel) -> InstanceId {
    let folder = model.create("Folder").expect("folder");
    model
        .set_parent(folder, Some(model.workspace()))
        .expect("parent folder");
    folder
}

#[test]
fn created_instance_returns_to_its_original_index_on_redo() {
    let mut model = DataModel::builtin();
    let root = folder_under_workspace(&mut model);
    let before = model.create("Part").expect("before");
    model.set_parent(before, Some(root)).expect("before");
    let p1 = model.create("Part").expect("p1");
    model.set_parent(p1, Some(root)).expect("p1");
    let after = model.create("Part").expect("after");
    model.set_parent(after, Some(root)).expect("after");

    let change = model.set_parent(p1, Some(root)).expect("same parent");
    assert!(change.is_noop());
    assert_eq!(model.children(root), &[before, p1, after]);

    let mut history = UndoHistory::new(16);
    history
        .push_state(
            &mut model,
            UndoState::new("Insert Part").with_change(UndoChange::created(p1, root)),
        )
        .expect("push");

    history.undo(&mut model).expect("undo");
    assert_eq!(model.children(root), &[before, after]);
    assert!(model.contains(p1));

    history.redo(&mut model).expect("redo");
    assert_eq!(model.children(root), &[before, p1, after]);
    assert_eq!(history.status(), HistoryStatus::HasUndo);
}

#[test]
fn reorder_to_front_is_undone() {
    let config = EditorConfig::default();
    let mut session = EditorSession::new(&config).expect("session");
    let root = folder_under_workspace(session.model_mut());
    session.select([root], SelectionOrigin::Explorer);
    let p1 = session.insert_object("Part").expect("insert").expect("p1");
    session.select([root], SelectionOrigin::Explorer);
    let p2 = session.insert_object("Part").expect("insert").expect("p2");
    assert_eq!(session.model().children(root), &[p1, p2]);

    let change = session.reparent(p2, Some(root), Some(0)).expect("reorder");
    assert_eq!(change.old_index, Some(1));
    assert_eq!(change.new_index, Some(0));
    assert_eq!(session.model().descendants(root).collect::<Vec<_>>(), vec![p2, p1]);

    session.undo().expect("undo");
    assert_eq!(session.model().descendants(root).collect::<Vec<_>>(), vec![p1, p2]);
    session.redo().expect("redo");
    assert_eq!(session.model().children(root), &[p2, p1]);
}

#[test]
fn undo_then_redo_restores_snapshots_for_every_action() {
    let mut session = EditorSession::new(&EditorConfig::default()).expect("session");
    let workspace = session.model().workspace();
    session.select([workspace], SelectionOrigin::Explorer);
    let folder = session.insert_object("Folder").expect("insert").expect("folder");
    let part = session.insert_object("Part").expect("insert").expect("part");

    type Action = Box<dyn Fn(&mut EditorSession)>;
    let actions: Vec<Action> = vec![
        Box::new(move |session: &mut EditorSession| {
            session
                .set_property(part, "Transparency", PropertyValue::Number(0.5))
                .expect("transparency");
        }),
        Box::new(move |session: &mut EditorSession| {
            session.reparent(part, Some(workspace), None).expect("move out");
        }),
        Box::new(move |session: &mut EditorSession| {
            session.select([part], SelectionOrigin::Viewport);
            session.delete_selection().expect("delete");
        }),
        Box::new(move |session: &mut EditorSession| {
            session.select([folder], SelectionOrigin::Viewport);
            session.insert_object("Script").expect("insert script");
        }),
    ];

    for action in actions {
        let before = session.model().snapshot(workspace).expect("before");
        action(&mut session);
        let after = session.model().snapshot(workspace).expect("after");
        assert_ne!(before, after);

        session.undo().expect("undo");
        assert_eq!(session.model().snapshot(workspace).expect("undone"), before);
        session.redo().expect("redo");
        assert_eq!(session.model().snapshot(workspace).expect("redone"), after);
    }
}

#[test]
fn undone_insert_is_collected_once_history_forgets_it() {
    let mut session = EditorSession::new(&EditorConfig {
        undo_capacity: 1,
        ..EditorConfig::default()
    })
    .expect("session");
    let workspace = session.model().workspace();
    session.select([workspace], SelectionOrigin::Explorer);
    let part = session.insert_object("Part").expect("insert").expect("part");
    session.undo().expect("undo");
    assert!(session.model().contains(part));

    session.select([workspace], SelectionOrigin::Explorer);
    session.insert_object("Folder").expect("insert folder");
    assert!(!session.model().contains(part));
    assert!(matches!(
        session.model().get_property(part, "Name"),
        Err(GraphError::NoSuchInstance(_))
    ));
}

proptest! {
    #[test]
    fn cyclic_parenting_never_changes_the_tree(
        moves in prop::collection::vec((0usize..6, 0usize..6), 1..40)
    ) {
        let mut model = DataModel::builtin();
        let nodes: Vec<InstanceId> = (0..6)
            .map(|_| folder_under_workspace(&mut model))
            .collect();

        for (child, parent) in moves {
            let (child, parent) = (nodes[child], nodes[parent]);
            let parent_before = model.parent(child);
            let children_before = model.children(parent).to_vec();
            match model.set_parent(child, Some(parent)) {
                Ok(change) => prop_assert_eq!(change.new_parent, Some(parent)),
                Err(GraphError::CyclicParenting { .. }) => {
                    prop_assert_eq!(model.parent(child), parent_before);
                    prop_assert_eq!(model.children(parent), children_before.as_slice());
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }

            for node in &nodes {
                prop_assert!(!model.is_ancestor_of(*node, *node));
                if let Some(parent) = model.parent(*node) {
                    prop_assert!(model.children(parent).contains(node));
                }
                prop_assert!(model.is_rooted(*node));
            }
        }
    }
}
