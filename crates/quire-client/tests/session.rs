//! Document lifecycle: bring-up, self-heal, attach, close, save.

mod common;

use std::sync::Arc;

use quire_client::backend::methods;
use quire_client::{
    Backend, BackendError, ClientConfig, ClientError, MemoryBackend, NotificationKind, QuireClient,
};
use quire_types::EditorId;

use common::{setup, system};

fn fresh() -> (QuireClient, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let client = QuireClient::new(backend.clone(), ClientConfig::default());
    (client, backend)
}

#[tokio::test]
async fn test_failed_bring_up_registers_nothing_and_releases_handle() {
    let (client, backend) = fresh();
    backend.inject_failure(methods::LIST_GRANTS, BackendError::Unavailable("grants down".into()));

    let err = client.sessions().create("/tmp/broken.elf").await.unwrap_err();

    assert!(matches!(err, ClientError::Backend(BackendError::Unavailable(_))));
    assert!(client.store().is_empty());
    assert_eq!(client.active_document(), None);
    assert_eq!(backend.calls(methods::CLOSE_DOCUMENT), 1);
    assert!(backend.list_open_documents().await.unwrap().is_empty());
    assert_eq!(client.notifications().count_of(NotificationKind::Error), 1);

    // The document exists on disk now; opening it once the backend recovers works.
    backend.clear_failure(methods::LIST_GRANTS);
    let doc = client.sessions().open("/tmp/broken.elf").await.unwrap();
    assert_eq!(client.active_document(), Some(doc));
}

#[tokio::test]
async fn test_unknown_active_editor_heals_to_system_and_is_pushed_back() {
    let (client, backend) = fresh();
    let doc = backend.create_document("/tmp/ghost.elf").await.unwrap();
    backend
        .force_active_editor(&doc, Some(EditorId::new("ghost")))
        .unwrap();

    let opened = client.sessions().open("/tmp/ghost.elf").await.unwrap();
    assert_eq!(opened, doc);

    assert_eq!(client.store().active_editor_id(&doc).unwrap(), Some(system()));
    assert_eq!(backend.get_active_editor(&doc).await.unwrap(), Some(system()));
    assert_eq!(backend.calls(methods::SET_ACTIVE_EDITOR), 1);
}

#[tokio::test]
async fn test_reported_no_active_editor_is_kept() {
    let (client, backend) = fresh();
    let doc = backend.create_document("/tmp/nobody.elf").await.unwrap();
    backend.force_active_editor(&doc, None).unwrap();

    client.sessions().open("/tmp/nobody.elf").await.unwrap();

    assert_eq!(client.store().active_editor_id(&doc).unwrap(), None);
    assert_eq!(backend.calls(methods::SET_ACTIVE_EDITOR), 0);
}

#[tokio::test]
async fn test_attach_brings_up_only_unregistered_documents() {
    let (client, backend) = fresh();
    let mine = client.sessions().create("/tmp/mine.elf").await.unwrap();
    let theirs = backend.create_document("/tmp/theirs.elf").await.unwrap();
    let closed = backend.create_document("/tmp/closed.elf").await.unwrap();
    backend.close_document(&closed).await.unwrap();

    let attached = client.sessions().attach_open_documents().await.unwrap();

    assert_eq!(attached, vec![theirs.clone()]);
    assert!(client.store().contains(&mine));
    assert!(!client.store().contains(&closed));
    assert_eq!(client.store().len(), 2);

    let again = client.sessions().attach_open_documents().await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_attach_skips_failures_without_releasing_them() {
    let (client, backend) = fresh();
    let theirs = backend.create_document("/tmp/theirs.elf").await.unwrap();
    backend.inject_failure(methods::LIST_EVENTS, BackendError::Unavailable("events down".into()));

    let attached = client.sessions().attach_open_documents().await.unwrap();

    assert!(attached.is_empty());
    assert!(client.store().is_empty());
    assert!(backend.is_open(&theirs));
    assert_eq!(backend.calls(methods::CLOSE_DOCUMENT), 0);
    assert_eq!(client.notifications().count_of(NotificationKind::Warning), 1);
}

#[tokio::test]
async fn test_close_moves_active_document_to_latest_remaining() {
    let (client, backend) = fresh();
    let sessions = client.sessions();
    let a = sessions.create("/tmp/a.elf").await.unwrap();
    let b = sessions.create("/tmp/b.elf").await.unwrap();
    let c = sessions.create("/tmp/c.elf").await.unwrap();
    assert_eq!(client.active_document(), Some(c.clone()));

    sessions.close(&c).await.unwrap();
    assert_eq!(client.active_document(), Some(b.clone()));
    assert!(!backend.is_open(&c));
    assert!(client.store().get(&c).is_none());

    sessions.close(&b).await.unwrap();
    sessions.close(&a).await.unwrap();
    assert_eq!(client.active_document(), None);
    assert!(client.store().is_empty());
}

#[tokio::test]
async fn test_close_unknown_document_fails() {
    let (client, _backend, doc) = setup().await;
    client.sessions().close(&doc).await.unwrap();

    let err = client.sessions().close(&doc).await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownDocument(_)));
    assert_eq!(client.notifications().count_of(NotificationKind::Error), 1);
}

#[tokio::test]
async fn test_reopening_registered_document_just_activates_it() {
    let (client, backend) = fresh();
    let a = client.sessions().create("/tmp/a.elf").await.unwrap();
    let _b = client.sessions().create("/tmp/b.elf").await.unwrap();
    backend.reset_calls();

    let again = client.sessions().open("/tmp/a.elf").await.unwrap();

    assert_eq!(again, a);
    assert_eq!(client.active_document(), Some(a));
    assert_eq!(client.store().len(), 2);
    assert_eq!(backend.calls(methods::LIST_BLOCKS), 0);
}

#[tokio::test]
async fn test_open_missing_path_reports_once() {
    let (client, _backend) = fresh();
    let err = client.sessions().open("/tmp/nowhere.elf").await.unwrap_err();
    assert!(matches!(err, ClientError::Backend(BackendError::NotFound(_))));
    assert_eq!(client.notifications().count_of(NotificationKind::Error), 1);
}

#[tokio::test]
async fn test_save_passes_through() {
    let (client, backend, doc) = setup().await;
    client.sessions().save(&doc).await.unwrap();
    assert_eq!(backend.calls(methods::SAVE_DOCUMENT), 1);

    backend.inject_failure(methods::SAVE_DOCUMENT, BackendError::Unavailable("disk full".into()));
    let err = client.sessions().save(&doc).await.unwrap_err();
    assert!(matches!(err, ClientError::Backend(_)));
    assert_eq!(client.notifications().count_of(NotificationKind::Error), 1);
}
