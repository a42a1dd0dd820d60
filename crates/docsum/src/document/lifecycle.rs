//! Legal status transitions and their enforcement against a store.

use log::{debug, warn};

use crate::document::{DocumentStatus, DocumentUpdate};
use crate::error::{DocsumError, Result};
use crate::store::{CasOutcome, DocumentStore};

impl DocumentStatus {
    /// `uploaded → processing → done`, plus `→ error` from any non-terminal state.
    ///
    /// `processing → uploaded` is the one backward edge. It is only taken when
    /// a job could not be queued, so the document never reached a worker.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Processing, Done)
                | (Uploaded, Error)
                | (Processing, Error)
                | (Processing, Uploaded)
        )
    }
}

/// Moves `document_id` from `from` to `update.status`.
///
/// The status check and the write happen atomically in the store, so of two
/// concurrent callers expecting the same `from` state only one succeeds; the
/// other gets `InvalidTransition` carrying the status it lost to.
pub async fn transition(
    store: &dyn DocumentStore,
    document_id: &str,
    from: DocumentStatus,
    update: DocumentUpdate,
) -> Result<()> {
    let to = update.status.ok_or_else(|| {
        DocsumError::Internal("transition update carries no target status".to_string())
    })?;

    if !from.can_transition_to(to) {
        return Err(DocsumError::InvalidTransition {
            document_id: document_id.to_string(),
            current: from,
        });
    }

    match store.compare_and_update(document_id, from, &update).await? {
        CasOutcome::Applied => {
            debug!("Document {} moved {} -> {}", document_id, from, to);
            Ok(())
        }
        CasOutcome::NotFound => Err(DocsumError::NotFound(document_id.to_string())),
        CasOutcome::Conflict(current) => {
            warn!(
                "Document {} expected in status {} but found {}",
                document_id, from, current
            );
            Err(DocsumError::InvalidTransition {
                document_id: document_id.to_string(),
                current,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentRecord;
    use crate::store::MemoryStore;

    const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Uploaded,
        DocumentStatus::Processing,
        DocumentStatus::Done,
        DocumentStatus::Error,
    ];

    #[test]
    fn test_forward_edges_allowed() {
        assert!(DocumentStatus::Uploaded.can_transition_to(DocumentStatus::Processing));
        assert!(DocumentStatus::Processing.can_transition_to(DocumentStatus::Done));
        assert!(DocumentStatus::Uploaded.can_transition_to(DocumentStatus::Error));
        assert!(DocumentStatus::Processing.can_transition_to(DocumentStatus::Error));
    }

    #[test]
    fn test_no_skipping_or_self_edges() {
        assert!(!DocumentStatus::Uploaded.can_transition_to(DocumentStatus::Done));
        assert!(!DocumentStatus::Uploaded.can_transition_to(DocumentStatus::Uploaded));
        assert!(!DocumentStatus::Processing.can_transition_to(DocumentStatus::Processing));
    }

    #[test]
    fn test_queue_rollback_is_only_backward_edge() {
        let rank = |s: DocumentStatus| match s {
            DocumentStatus::Uploaded => 0,
            DocumentStatus::Processing => 1,
            DocumentStatus::Done | DocumentStatus::Error => 2,
        };
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) && rank(to) < rank(from) {
                    assert_eq!(
                        (from, to),
                        (DocumentStatus::Processing, DocumentStatus::Uploaded)
                    );
                }
            }
        }
        assert!(DocumentStatus::Processing.can_transition_to(DocumentStatus::Uploaded));
    }

    #[tokio::test]
    async fn test_rollback_requires_processing() {
        let store = MemoryStore::new();
        store
            .create(&DocumentRecord::new("d1", "text", "a.txt", "text/plain"))
            .await
            .unwrap();

        // still uploaded: nothing to roll back
        let early = transition(
            &store,
            "d1",
            DocumentStatus::Processing,
            DocumentUpdate::status(DocumentStatus::Uploaded),
        )
        .await;
        assert!(matches!(
            early,
            Err(DocsumError::InvalidTransition { current: DocumentStatus::Uploaded, .. })
        ));

        transition(
            &store,
            "d1",
            DocumentStatus::Uploaded,
            DocumentUpdate::status(DocumentStatus::Processing),
        )
        .await
        .unwrap();
        transition(
            &store,
            "d1",
            DocumentStatus::Processing,
            DocumentUpdate::status(DocumentStatus::Uploaded),
        )
        .await
        .unwrap();

        let record = store.get("d1").await.unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Uploaded);
        assert!(record.result.is_none());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [DocumentStatus::Done, DocumentStatus::Error] {
            for next in ALL {
                assert!(
                    !terminal.can_transition_to(next),
                    "{} -> {} should be rejected",
                    terminal,
                    next
                );
            }
        }
    }

    #[tokio::test]
    async fn test_transition_applies_once() {
        let store = MemoryStore::new();
        store
            .create(&DocumentRecord::new("d1", "text", "a.txt", "text/plain"))
            .await
            .unwrap();

        transition(
            &store,
            "d1",
            DocumentStatus::Uploaded,
            DocumentUpdate::status(DocumentStatus::Processing),
        )
        .await
        .unwrap();

        let second = transition(
            &store,
            "d1",
            DocumentStatus::Uploaded,
            DocumentUpdate::status(DocumentStatus::Processing),
        )
        .await;

        match second {
            Err(DocsumError::InvalidTransition { current, .. }) => {
                assert_eq!(current, DocumentStatus::Processing)
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transition_unknown_document() {
        let store = MemoryStore::new();
        let result = transition(
            &store,
            "missing",
            DocumentStatus::Uploaded,
            DocumentUpdate::status(DocumentStatus::Processing),
        )
        .await;
        assert!(matches!(result, Err(DocsumError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_illegal_edge_rejected_before_store() {
        let store = MemoryStore::new();
        let result = transition(
            &store,
            "d1",
            DocumentStatus::Done,
            DocumentUpdate::status(DocumentStatus::Processing),
        )
        .await;
        assert!(matches!(
            result,
            Err(DocsumError::InvalidTransition { current: DocumentStatus::Done, .. })
        ));
    }
}
