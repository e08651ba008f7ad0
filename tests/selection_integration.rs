use studio_core::editor::{GraphCommand, SelectionOrigin};
use studio_core::{EditorConfig, EditorSession, InstanceId};

/// Parts placed straight into the graph, so no undo record holds them.
fn session_with_parts(count: usize) -> (EditorSession, Vec<InstanceId>) {
    let mut session = EditorSession::new(&EditorConfig::default()).expect("session");
    let workspace = session.model().workspace();
    let parts = (0..count)
        .map(|_| {
            let model = session.model_mut();
            let part = model.create("Part").expect("part");
            model.set_parent(part, Some(workspace)).expect("parent");
            part
        })
        .collect();
    (session, parts)
}

#[test]
fn selection_never_yields_destroyed_instances() {
    let (mut session, parts) = session_with_parts(3);
    session.select(parts.iter().copied(), SelectionOrigin::Viewport);
    assert_eq!(session.selected(), parts);

    session
        .model_mut()
        .destroy(parts[1])
        .expect("destroy middle part");
    assert_eq!(session.selected(), vec![parts[0], parts[2]]);
    assert_eq!(session.selection().len(session.model()), 2);
    assert_eq!(session.selection().primary(session.model()), Some(parts[0]));
}

#[test]
fn queued_destroy_prunes_selection() {
    let (mut session, parts) = session_with_parts(2);
    session.select([parts[0]], SelectionOrigin::Explorer);

    let sender = session.command_sender();
    assert!(sender.submit(GraphCommand::Destroy(parts[0])));
    let report = session.step(0.0);
    assert_eq!(report.commands.applied, 1);

    assert!(session.selected().is_empty());
    assert!(session.selection().is_empty(session.model()));
}

#[test]
fn observers_can_filter_their_own_changes() {
    let (mut session, parts) = session_with_parts(2);
    let receiver = session.selection_mut().subscribe();

    session.select([parts[0]], SelectionOrigin::Explorer);
    session.select([parts[1]], SelectionOrigin::Viewport);
    session.select([parts[1]], SelectionOrigin::Viewport);

    let events: Vec<_> = receiver.try_iter().collect();
    assert_eq!(events.len(), 2);
    let from_viewport: Vec<_> = events
        .iter()
        .filter(|event| event.origin != SelectionOrigin::Explorer)
        .map(|event| event.selected.clone())
        .collect();
    assert_eq!(from_viewport, vec![vec![parts[1]]]);
    assert!(events[0].revision < events[1].revision);
}

#[test]
fn deleting_a_selected_parent_and_child_detaches_only_the_parent() {
    let mut session = EditorSession::new(&EditorConfig::default()).expect("session");
    let workspace = session.model().workspace();
    session.select([workspace], SelectionOrigin::Explorer);
    let folder = session.insert_object("Folder").expect("insert").expect("folder");
    let part = session.insert_object("Part").expect("insert").expect("part");

    session.select([part, folder], SelectionOrigin::Explorer);
    assert_eq!(session.delete_selection(), Ok(1));
    assert_eq!(session.model().parent(part), Some(folder));
    assert_eq!(session.model().parent(folder), None);

    session.undo().expect("undo delete");
    assert_eq!(session.model().parent(folder), Some(workspace));
}
