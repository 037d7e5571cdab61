mod common;

use common::{
    RemoteCall, remote_disaster, sample_disaster, sample_victim, server_error, setup_harness,
};
use relief_sync::application::ports::{
    EntityStore, FailureClass, FailureReport, RecordFilter, RemoteError, SuccessOutcome,
};
use relief_sync::application::services::EntryOutcome;
use relief_sync::domain::entities::{Disaster, DisasterVictim};
use relief_sync::domain::sync::RetryPolicy;
use relief_sync::domain::value_objects::{EntityType, OutboxOperation, SyncStatus};
use relief_sync::infrastructure::SqliteEntityStore;
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn assert_store_invariants(store: &SqliteEntityStore) {
    let records = store
        .list(&RecordFilter::default().including_deleted())
        .await
        .unwrap();
    let outbox = store.list_outbox().await.unwrap();

    for record in &records {
        let entry = outbox
            .iter()
            .find(|entry| entry.entity_type == record.entity_type && entry.entity_id == record.id());
        match record.status() {
            SyncStatus::Synced => {
                assert!(record.meta.last_synced_at.is_some(), "{record:?}");
                assert!(entry.is_none(), "synced record still queued: {record:?}");
            }
            SyncStatus::SyncFailed => {
                assert!(entry.is_some_and(|entry| entry.parked), "{record:?}");
            }
            pending => {
                let entry = entry.expect("pending record without outbox entry");
                assert!(!entry.parked);
                assert_eq!(entry.operation.pending_status(), pending);
            }
        }
    }
    for entry in outbox.iter().filter(|entry| entry.is_active()) {
        let record = records
            .iter()
            .find(|record| record.entity_type == entry.entity_type && record.id() == entry.entity_id)
            .expect("outbox entry without record");
        assert!(matches!(
            record.status(),
            SyncStatus::PendingCreate | SyncStatus::PendingUpdate | SyncStatus::PendingDelete
        ));
    }
}

#[tokio::test]
async fn victim_created_and_edited_offline_syncs_under_server_id() {
    let harness = setup_harness().await;
    harness
        .records
        .ingest_remote::<Disaster>(remote_disaster("d-1"))
        .await
        .unwrap();

    let created = harness
        .records
        .create(sample_victim("d-1", "Budi"))
        .await
        .unwrap();
    let local_id = created.id().to_string();
    assert_eq!(created.status(), SyncStatus::PendingCreate);
    let outbox = harness.records.outbox().await.unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].operation, OutboxOperation::Create);

    let mut edited = created.data.clone();
    edited.name = "Budi S.".into();
    let updated = harness.records.update(&local_id, edited).await.unwrap();
    assert_eq!(updated.data.name, "Budi S.");
    let outbox = harness.records.outbox().await.unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].operation, OutboxOperation::Create);
    assert_store_invariants(&harness.store).await;

    harness.remote.respond(Ok(json!({"id": "v-99"})));
    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert!(report.is_clean());

    let calls = harness.remote.calls();
    assert_eq!(calls.len(), 1);
    let RemoteCall::Create { entity_type, body } = &calls[0] else {
        panic!("expected create, got {calls:?}");
    };
    assert_eq!(*entity_type, EntityType::DisasterVictim);
    assert_eq!(body["name"], "Budi S.");
    assert_eq!(body["nik"], "123");
    assert_eq!(body["localId"], local_id.as_str());

    let synced = harness
        .records
        .get::<DisasterVictim>(&local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(synced.id(), "v-99");
    assert_eq!(synced.meta.local_id.as_deref(), Some(local_id.as_str()));
    assert_eq!(synced.status(), SyncStatus::Synced);
    assert!(harness.records.outbox().await.unwrap().is_empty());
    assert_store_invariants(&harness.store).await;
}

#[tokio::test]
async fn server_errors_back_off_until_record_is_parked() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();
    harness.remote.respond_times(5, server_error(500));

    for attempt in 1..=4u32 {
        let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
        assert_eq!(report.retry_scheduled_count(), 1);

        let entry = harness
            .store
            .outbox_entry(EntityType::Disaster, disaster.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.retry_count, attempt);
        let record = harness
            .records
            .get::<Disaster>(disaster.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status(), SyncStatus::PendingCreate);
    }

    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(report.failed_count(), 1);
    let record = harness
        .records
        .get::<Disaster>(disaster.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status(), SyncStatus::SyncFailed);
    assert_eq!(harness.remote.call_count(), 5);
    assert_store_invariants(&harness.store).await;

    // Parked entries are left alone until the user retries.
    let idle = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert!(idle.outcomes.is_empty());
    assert_eq!(harness.remote.call_count(), 5);

    harness
        .records
        .retry_failed(EntityType::Disaster, disaster.id())
        .await
        .unwrap();
    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(report.synced_count(), 1);
    assert_eq!(harness.records.sync_summary().await.unwrap().synced, 1);
}

#[tokio::test]
async fn deleting_unsynced_record_never_reaches_network() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();

    let remaining = harness
        .records
        .delete::<Disaster>(disaster.id())
        .await
        .unwrap();
    assert!(remaining.is_none());
    assert!(harness.records.outbox().await.unwrap().is_empty());
    assert!(
        harness
            .records
            .get::<Disaster>(disaster.id())
            .await
            .unwrap()
            .is_none()
    );

    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert!(report.outcomes.is_empty());
    assert_eq!(harness.remote.call_count(), 0);
}

#[tokio::test]
async fn delete_after_update_collapses_to_one_delete() {
    let harness = setup_harness().await;
    let synced = harness
        .records
        .ingest_remote::<Disaster>(remote_disaster("d-7"))
        .await
        .unwrap();

    let mut edited = synced.data.clone();
    edited.status = "RESOLVED".into();
    harness.records.update("d-7", edited).await.unwrap();
    let pending = harness
        .records
        .delete::<Disaster>("d-7")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status(), SyncStatus::PendingDelete);

    let outbox = harness.records.outbox().await.unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].operation, OutboxOperation::Delete);
    assert!(harness.records.list::<Disaster>().await.unwrap().is_empty());
    assert_store_invariants(&harness.store).await;

    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(
        report.outcome_for(EntityType::Disaster, "d-7"),
        Some(&EntryOutcome::Purged)
    );
    assert_eq!(
        harness.remote.calls(),
        vec![RemoteCall::Delete {
            entity_type: EntityType::Disaster,
            id: "d-7".into()
        }]
    );
    assert!(harness.records.get::<Disaster>("d-7").await.unwrap().is_none());
}

#[tokio::test]
async fn success_handler_is_idempotent() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();
    let entry = harness
        .store
        .outbox_entry(EntityType::Disaster, disaster.id())
        .await
        .unwrap()
        .unwrap();
    let claimed = harness.store.claim(entry.id).await.unwrap().unwrap();

    let first = harness
        .store
        .apply_success(&claimed, Some("d-42".into()), None, 2_000)
        .await
        .unwrap();
    assert_eq!(first, SuccessOutcome::Synced { id: "d-42".into() });

    let second = harness
        .store
        .apply_success(&claimed, Some("d-42".into()), None, 2_001)
        .await
        .unwrap();
    assert_eq!(second, SuccessOutcome::AlreadyResolved);

    let failure = FailureReport {
        message: "late timeout".into(),
        class: FailureClass::Retryable,
    };
    let late = harness
        .store
        .apply_failure(&claimed, &failure, RetryPolicy::default(), 2_002)
        .await
        .unwrap();
    assert!(matches!(
        late,
        relief_sync::application::ports::FailureOutcome::AlreadyResolved
    ));

    let record = harness.records.get::<Disaster>("d-42").await.unwrap().unwrap();
    assert_eq!(record.status(), SyncStatus::Synced);
    assert_eq!(record.meta.last_synced_at, Some(2_000));
    assert_store_invariants(&harness.store).await;
}

#[tokio::test]
async fn offline_disaster_and_children_sync_in_parent_order() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();
    let first = harness
        .records
        .create(sample_victim(disaster.id(), "Budi"))
        .await
        .unwrap();
    let second = harness
        .records
        .create(sample_victim(disaster.id(), "Siti"))
        .await
        .unwrap();

    harness.remote.respond(Ok(json!({"data": {"id": "d-100"}})));
    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(report.synced_count(), 3);

    let calls = harness.remote.calls();
    assert!(matches!(
        &calls[0],
        RemoteCall::Create { entity_type: EntityType::Disaster, .. }
    ));
    for call in &calls[1..] {
        let RemoteCall::Create { entity_type, body } = call else {
            panic!("unexpected call {call:?}");
        };
        assert_eq!(*entity_type, EntityType::DisasterVictim);
        assert_eq!(body["disasterId"], "d-100");
    }

    let victims = harness
        .records
        .list_for_disaster::<DisasterVictim>(disaster.id())
        .await
        .unwrap();
    assert_eq!(victims.len(), 2);
    for victim in &victims {
        assert_eq!(victim.data.disaster_id, "d-100");
        assert_eq!(victim.status(), SyncStatus::Synced);
    }
    for local in [&first, &second] {
        assert!(
            harness
                .records
                .get::<DisasterVictim>(local.id())
                .await
                .unwrap()
                .is_some()
        );
    }
    assert_store_invariants(&harness.store).await;
}

#[tokio::test]
async fn deleting_unsynced_disaster_drops_its_children_and_pictures() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();
    harness
        .records
        .create(sample_victim(disaster.id(), "Budi"))
        .await
        .unwrap();
    let picture = harness
        .records
        .attach_picture(disaster.id(), b"\x89PNG", "image/png", None)
        .await
        .unwrap();
    let path = harness
        .records
        .picture_path(picture.id())
        .await
        .unwrap()
        .unwrap();
    assert!(path.exists());

    harness
        .records
        .delete::<Disaster>(disaster.id())
        .await
        .unwrap();

    assert!(harness.records.outbox().await.unwrap().is_empty());
    assert_eq!(harness.records.sync_summary().await.unwrap().total(), 0);
    assert!(!path.exists());
    harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(harness.remote.call_count(), 0);
}

#[tokio::test]
async fn malformed_create_response_parks_without_retry() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();
    harness.remote.respond(Ok(json!({"ok": true})));

    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    let Some(EntryOutcome::Failed {
        retry_count,
        conflict,
        ..
    }) = report.outcome_for(EntityType::Disaster, disaster.id())
    else {
        panic!("expected failure, got {report:?}");
    };
    assert_eq!(*retry_count, 1);
    assert!(conflict.is_none());
    assert_eq!(harness.records.failed_records().await.unwrap().len(), 1);
    assert_store_invariants(&harness.store).await;
}

#[tokio::test]
async fn connectivity_errors_keep_record_pending() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();
    harness
        .remote
        .respond(Err(RemoteError::Connectivity("no route to host".into())));

    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(report.retry_scheduled_count(), 1);
    let summary = harness.records.sync_summary().await.unwrap();
    assert_eq!(summary.pending_create, 1);
    assert_eq!(summary.sync_failed, 0);

    harness.reconciler.run_pass(&CancellationToken::new()).await;
    let record = harness
        .records
        .get::<Disaster>(disaster.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status(), SyncStatus::Synced);
    assert_store_invariants(&harness.store).await;
}

#[tokio::test]
async fn editing_failed_record_requeues_it() {
    let harness = setup_harness().await;
    let disaster = harness.records.create(sample_disaster()).await.unwrap();
    harness.remote.respond(server_error(422));
    harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(harness.records.failed_records().await.unwrap().len(), 1);

    let mut fixed = sample_disaster();
    fixed.description = "Corrected description".into();
    let revived = harness.records.update(disaster.id(), fixed).await.unwrap();
    assert_eq!(revived.status(), SyncStatus::PendingCreate);
    let entry = harness
        .store
        .outbox_entry(EntityType::Disaster, disaster.id())
        .await
        .unwrap()
        .unwrap();
    assert!(!entry.parked);
    assert_eq!(entry.retry_count, 0);
    assert_eq!(entry.operation, OutboxOperation::Create);
    assert_store_invariants(&harness.store).await;

    let report = harness.reconciler.run_pass(&CancellationToken::new()).await;
    assert_eq!(report.synced_count(), 1);
}
