//! The demo scenario and its printers.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::json;

use quire_client::{ClientConfig, MemoryBackend, QuireClient, RefreshOutcome};
use quire_types::capability::TEXT_WRITE;
use quire_types::{BlockContent, BlockId, BlockKind, CapabilityId, DocumentId, EditorKind};

/// What the scenario left behind.
pub struct Scenario {
    pub client: QuireClient,
    pub document: DocumentId,
    pub notes: BlockId,
}

/// Create a document, add an editor, share a block with them and take it back.
///
/// The last write by the second editor is expected to be refused; its
/// rejection ends up in the notification queue rather than failing the run.
pub async fn run_scenario(config: ClientConfig, path: &str) -> Result<Scenario> {
    let client = QuireClient::new(Arc::new(MemoryBackend::new()), config);
    let document = client
        .sessions()
        .create(path)
        .await
        .with_context(|| format!("failed to create {path}"))?;
    let dispatcher = client.dispatcher();
    let write = CapabilityId::new(TEXT_WRITE);

    let bob = dispatcher
        .create_editor(&document, None, "Bob", EditorKind::Human)
        .await?;
    let notes = dispatcher
        .create_block(&document, None, "Notes", BlockKind::Text)
        .await?;
    dispatcher
        .write_block(&document, None, &notes, BlockContent::text("hello"))
        .await?;

    dispatcher.grant(&document, None, &bob, &write, &notes).await?;
    dispatcher
        .write_block(&document, Some(&bob), &notes, BlockContent::text("hello from Bob"))
        .await?;
    dispatcher.revoke(&document, None, &bob, &write, &notes).await?;

    match dispatcher
        .write_block(&document, Some(&bob), &notes, BlockContent::text("too late"))
        .await
    {
        Err(e) if e.is_rejection() => tracing::info!(error = %e, "write after revoke refused"),
        Err(e) => return Err(e.into()),
        Ok(_) => bail!("write after revoke was accepted"),
    }

    Ok(Scenario {
        client,
        document,
        notes,
    })
}

/// Print the cached document as JSON, then the notification queue.
pub fn print_state(scenario: &Scenario) -> Result<()> {
    let store = scenario.client.store();
    let doc = &scenario.document;
    let state = json!({
        "document": store.read(doc, |s| s.info().clone())?,
        "active_editor": store.active_editor_id(doc)?,
        "editors": store.editors(doc)?,
        "blocks": store.blocks(doc)?,
        "grants": store.grants(doc)?,
    });
    println!("{}", serde_json::to_string_pretty(&state)?);
    print_notifications(&scenario.client);
    Ok(())
}

fn print_notifications(client: &QuireClient) {
    for n in client.notifications().snapshot() {
        match n.body {
            Some(body) => println!("[{}] {}: {}", n.kind, n.title, body),
            None => println!("[{}] {}", n.kind, n.title),
        }
    }
}

/// Print the document history, most recent first.
pub fn print_history(scenario: &Scenario) -> Result<()> {
    let history = scenario.client.historian().history(&scenario.document)?;
    for event in &history {
        println!(
            "{:<8}  {:<14}  {:<10}  {}",
            event.id.short(),
            event
                .capability_id()
                .map(|c| c.into_inner())
                .unwrap_or_default(),
            event.entity.chars().take(10).collect::<String>(),
            serde_json::to_string(&event.timestamp)?,
        );
    }
    Ok(())
}

/// Restore the notes block to its `nth` oldest write and print the result.
pub async fn restore_write(scenario: &Scenario, nth: usize) -> Result<()> {
    let historian = scenario.client.historian();
    let writes: Vec<_> = historian
        .history_for(&scenario.document, &scenario.notes)?
        .into_iter()
        .rev()
        .filter(|e| e.capability_id().as_ref().map(CapabilityId::as_str) == Some(TEXT_WRITE))
        .collect();
    let Some(event) = nth.checked_sub(1).and_then(|i| writes.get(i)) else {
        bail!("no write #{nth}; the notes block has {} writes", writes.len());
    };

    match historian
        .restore(&scenario.document, &scenario.notes, &event.id)
        .await?
    {
        RefreshOutcome::Applied { .. } => {
            let block = scenario
                .client
                .store()
                .block(&scenario.document, &scenario.notes)?
                .context("restored block missing from cache")?;
            println!(
                "restored {} to write #{nth}: {:?}",
                block.name,
                block.text().unwrap_or_default()
            );
        }
        RefreshOutcome::Skipped { reason } => {
            println!("restore skipped: {reason:?}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use quire_client::NotificationKind;

    use super::*;

    #[tokio::test]
    async fn test_scenario_ends_with_one_rejection() {
        let scenario = run_scenario(ClientConfig::default(), "/tmp/demo-test.elf")
            .await
            .unwrap();
        let client = &scenario.client;
        assert_eq!(client.notifications().count_of(NotificationKind::Error), 1);
        let notes = client
            .store()
            .block(&scenario.document, &scenario.notes)
            .unwrap()
            .unwrap();
        assert_eq!(notes.text(), Some("hello from Bob"));
        assert!(client.store().grants(&scenario.document).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_first_write() {
        let scenario = run_scenario(ClientConfig::default(), "/tmp/demo-test.elf")
            .await
            .unwrap();
        restore_write(&scenario, 1).await.unwrap();
        let notes = scenario
            .client
            .store()
            .block(&scenario.document, &scenario.notes)
            .unwrap()
            .unwrap();
        assert_eq!(notes.text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_restore_out_of_range() {
        let scenario = run_scenario(ClientConfig::default(), "/tmp/demo-test.elf")
            .await
            .unwrap();
        assert!(restore_write(&scenario, 0).await.is_err());
        assert!(restore_write(&scenario, 9).await.is_err());
    }
}
