use aires_core::domain::{AIResearchFinding, ErrorBatch, FileState, OutboxMessage, Stage, Topic};
use aires_core::domain::{CompilerError, ErrorLocation, Severity};
use aires_db::Store;
use chrono::Utc;

fn sample_error() -> CompilerError {
    CompilerError {
        code: "CS0246".to_string(),
        message: "'Foo' not found".to_string(),
        severity: Severity::Error,
        location: ErrorLocation { file_path: "main.c".to_string(), line: 10, column: Some(5) },
        raw_line: "main.c:10:5: error: CS0246: 'Foo' not found".to_string(),
    }
}

#[tokio::test]
async fn claiming_same_file_twice_is_a_no_op() {
    let store = Store::open_in_memory().await.unwrap();

    let first = store.claim_file("build1.log".to_string(), "abc".to_string()).await.unwrap();
    assert!(first.is_some());

    let second = store.claim_file("build1.log".to_string(), "abc".to_string()).await.unwrap();
    assert!(second.is_none(), "duplicate claim must be a no-op");
}

#[tokio::test]
async fn transition_persists_and_rejects_illegal_edges() {
    let store = Store::open_in_memory().await.unwrap();
    store.claim_file("build1.log".to_string(), "abc".to_string()).await.unwrap();

    store.transition_record("build1.log".to_string(), FileState::Parsing, None, None).await.unwrap();
    let record = store.get_record("build1.log".to_string()).await.unwrap().unwrap();
    assert_eq!(record.state, FileState::Parsing);
}

#[tokio::test]
async fn inserting_same_finding_twice_is_idempotent() {
    let store = Store::open_in_memory().await.unwrap();
    let batch_id = uuid::Uuid::now_v7();

    let finding = AIResearchFinding {
        stage: Stage::Docs,
        batch_id,
        produced_at: Utc::now(),
        confidence: 0.9,
        summary: "docs summary".to_string(),
        details: serde_json::Map::new(),
        raw_model_response: "{}".to_string(),
        model: "local-model".to_string(),
    };

    assert!(store.insert_finding(finding.clone()).await.unwrap());
    assert!(!store.insert_finding(finding).await.unwrap(), "second insert must be ignored");

    let findings = store.findings_for_batch(batch_id).await.unwrap();
    assert_eq!(findings.len(), 1);
}

#[tokio::test]
async fn findings_for_batch_are_returned_in_stage_order() {
    let store = Store::open_in_memory().await.unwrap();
    let batch_id = uuid::Uuid::now_v7();

    for stage in [Stage::Synth, Stage::Docs, Stage::Pattern, Stage::Context] {
        let finding = AIResearchFinding {
            stage,
            batch_id,
            produced_at: Utc::now(),
            confidence: 0.5,
            summary: format!("{stage} summary"),
            details: serde_json::Map::new(),
            raw_model_response: "{}".to_string(),
            model: "local-model".to_string(),
        };
        store.insert_finding(finding).await.unwrap();
    }

    let findings = store.findings_for_batch(batch_id).await.unwrap();
    let stages: Vec<Stage> = findings.iter().map(|f| f.stage).collect();
    assert_eq!(stages, vec![Stage::Docs, Stage::Context, Stage::Pattern, Stage::Synth]);
}

#[tokio::test]
async fn outbox_publish_cycle() {
    let store = Store::open_in_memory().await.unwrap();
    let batch_id = uuid::Uuid::now_v7();
    let message = OutboxMessage::new(batch_id, Topic::StageInput(Stage::Docs), b"payload".to_vec());
    let message_id = message.message_id;

    store.insert_outbox_message(message).await.unwrap();

    let unpublished = store.list_unpublished(10).await.unwrap();
    assert_eq!(unpublished.len(), 1);

    store.mark_published(message_id).await.unwrap();
    let unpublished = store.list_unpublished(10).await.unwrap();
    assert!(unpublished.is_empty());
}

#[tokio::test]
async fn batch_round_trips_through_store() {
    let store = Store::open_in_memory().await.unwrap();
    let batch = ErrorBatch::new("build1.log", "checksum", vec![sample_error()], None).unwrap();
    let batch_id = batch.batch_id;

    store.insert_batch(batch).await.unwrap();
    let fetched = store.get_batch(batch_id).await.unwrap().unwrap();
    assert_eq!(fetched.primary_error_code(), "CS0246");
}
