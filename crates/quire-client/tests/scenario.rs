//! End-to-end: editors, blocks, grants and revocation against the memory
//! backend.

mod common;

use quire_client::backend::methods;
use quire_client::{ClientError, NotificationKind};
use quire_types::capability::TEXT_WRITE;
use quire_types::{BlockContent, BlockKind, CapabilityId, EditorKind};

use common::setup;

#[tokio::test]
async fn test_grant_then_revoke_write_access() {
    let (client, _backend, doc) = setup().await;
    let dispatcher = client.dispatcher();
    let write = CapabilityId::new(TEXT_WRITE);

    let bob = dispatcher
        .create_editor(&doc, None, "Bob", EditorKind::Human)
        .await
        .unwrap();
    let notes = dispatcher
        .create_block(&doc, None, "Notes", BlockKind::Text)
        .await
        .unwrap();
    dispatcher
        .write_block(&doc, None, &notes, BlockContent::text("hello"))
        .await
        .unwrap();

    let cached = client.store().block(&doc, &notes).unwrap().unwrap();
    assert_eq!(cached.text(), Some("hello"));
    assert!(client.store().editors(&doc).unwrap().iter().any(|e| e.id == bob));
    assert!(!client.store().can_perform(&doc, &bob, &write, &notes).unwrap());

    dispatcher
        .grant(&doc, None, &bob, &write, &notes)
        .await
        .unwrap();
    assert!(client.store().can_perform(&doc, &bob, &write, &notes).unwrap());
    dispatcher
        .write_block(&doc, Some(&bob), &notes, BlockContent::text("from bob"))
        .await
        .unwrap();
    assert_eq!(
        client.store().block(&doc, &notes).unwrap().unwrap().text(),
        Some("from bob")
    );

    dispatcher
        .revoke(&doc, None, &bob, &write, &notes)
        .await
        .unwrap();
    assert!(!client.store().can_perform(&doc, &bob, &write, &notes).unwrap());
    assert_eq!(client.notifications().count_of(NotificationKind::Error), 0);

    let err = dispatcher
        .write_block(&doc, Some(&bob), &notes, BlockContent::text("denied"))
        .await
        .unwrap_err();
    assert!(err.is_rejection(), "{err:?}");
    assert!(matches!(err, ClientError::CommandRejected { .. }));
    assert_eq!(client.notifications().count_of(NotificationKind::Error), 1);
    assert_eq!(
        client.store().block(&doc, &notes).unwrap().unwrap().text(),
        Some("from bob")
    );

    // Events are cached most recent first.
    let events = client.store().events(&doc).unwrap();
    assert_eq!(
        events.first().and_then(|e| e.capability_id()),
        Some(CapabilityId::new("core.revoke"))
    );
}

#[tokio::test]
async fn test_concurrent_creates_each_refresh_once() {
    let (client, backend, doc) = setup().await;
    let dispatcher = client.dispatcher();
    backend.reset_calls();

    let (a, b, c) = tokio::join!(
        dispatcher.create_block(&doc, None, "a", BlockKind::Text),
        dispatcher.create_block(&doc, None, "b", BlockKind::Code),
        dispatcher.create_block(&doc, None, "c", BlockKind::Directory),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(a != b && b != c && a != c);

    assert_eq!(backend.calls(methods::EXECUTE), 3);
    assert_eq!(backend.calls(methods::LIST_BLOCKS), 3);
    assert_eq!(backend.calls(methods::LIST_EVENTS), 3);
    assert_eq!(backend.calls(methods::LIST_GRANTS), 0);

    let mut names = common::block_names(&client, &doc);
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(client.store().events(&doc).unwrap().len(), 3);
}
