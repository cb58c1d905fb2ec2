//! Unit tests for the pending request table.

use bytes::Bytes;
use rstest::{fixture, rstest};

use super::*;

#[allow(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[fixture]
fn table() -> PendingRequestTable { PendingRequestTable::new() }

fn register(table: &PendingRequestTable, id: u64) -> ResponseHandle {
    let id = RequestId::new(id);
    let (sink, handle) = result_channel(id);
    table
        .register(PendingRequest::new(id, Bytes::from_static(b"g.V()"), sink))
        .expect("register request");
    handle
}

#[rstest]
#[tokio::test]
async fn rejects_duplicate_registration(table: PendingRequestTable) {
    let _handle = register(&table, 1);
    let (sink, _other) = result_channel(RequestId::new(1));
    let err = table
        .register(PendingRequest::new(RequestId::new(1), Bytes::new(), sink))
        .expect_err("duplicate must fail");
    assert_eq!(err, TableError::DuplicateRequestId(RequestId::new(1)));
}

#[rstest]
#[tokio::test]
async fn complete_delivers_fragments_in_order(table: PendingRequestTable) {
    let handle = register(&table, 7);
    let wire = RequestId::new(7);
    table
        .with_entry(wire, |entry| entry.append(Some(Bytes::from_static(b"a"))))
        .expect("append a");
    table
        .with_entry(wire, |entry| entry.append(Some(Bytes::from_static(b"b"))))
        .expect("append b");
    assert_eq!(
        table.lookup(wire).expect("pending").state(),
        RequestState::Accumulating
    );
    table
        .complete(wire, Some(Bytes::from_static(b"c")))
        .expect("complete");

    let results = handle.await.expect("success");
    assert_eq!(results, vec![
        Bytes::from_static(b"a"),
        Bytes::from_static(b"b"),
        Bytes::from_static(b"c"),
    ]);
    assert!(table.is_empty());
}

#[rstest]
#[tokio::test]
async fn second_finalisation_reports_not_found(table: PendingRequestTable) {
    let handle = register(&table, 3);
    let wire = RequestId::new(3);
    table.fail(wire, RequestError::Cancelled).expect("fail");
    assert_eq!(
        table.complete(wire, None),
        Err(TableError::NotFound(wire))
    );
    assert_eq!(handle.await, Err(RequestError::Cancelled));
}

#[rstest]
#[tokio::test]
async fn reroute_makes_old_id_stale(table: PendingRequestTable) {
    let handle = register(&table, 1);
    let old = RequestId::new(1);
    let new = RequestId::new(2);
    let payload = table.reroute(old, new).expect("reroute");
    assert_eq!(payload, Bytes::from_static(b"g.V()"));

    assert_eq!(table.route(old), Err(TableError::NotFound(old)));
    assert_eq!(table.route(new), Ok(old));
    assert!(table.complete(old, None).is_err());

    table.complete(new, None).expect("complete under new id");
    assert_eq!(handle.await, Ok(Vec::new()));
}

#[rstest]
#[tokio::test]
async fn reroute_rejects_routed_target(table: PendingRequestTable) {
    let _first = register(&table, 1);
    let _second = register(&table, 2);
    assert_eq!(
        table.reroute(RequestId::new(1), RequestId::new(2)),
        Err(TableError::DuplicateRequestId(RequestId::new(2)))
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn expire_idle_respects_activity(table: PendingRequestTable) {
    let handle = register(&table, 4);
    let id = RequestId::new(4);
    let timeout = Duration::from_secs(5);

    tokio::time::advance(Duration::from_secs(3)).await;
    table.with_entry(id, |entry| entry.append(None)).expect("touch");
    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(!table.expire_idle(id, timeout));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(table.expire_idle(id, timeout));
    assert_eq!(handle.await, Err(RequestError::Timeout));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unrepresentable_timeout_never_expires(table: PendingRequestTable) {
    let _handle = register(&table, 5);
    let id = RequestId::new(5);

    assert_eq!(table.idle_deadline(id, Duration::MAX), None);
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert!(!table.expire_idle(id, Duration::MAX));
    assert_eq!(table.len(), 1);
}

#[rstest]
#[tokio::test]
async fn fail_all_resolves_every_request(table: PendingRequestTable) {
    let handles: Vec<_> = (1..=3).map(|id| register(&table, id)).collect();
    let error = RequestError::ConnectionClosed("eof".into());
    assert_eq!(table.fail_all(&error), 3);
    for handle in handles {
        assert_eq!(handle.await, Err(error.clone()));
    }
}

#[rstest]
#[tokio::test]
async fn dropped_sink_reports_connection_closed(table: PendingRequestTable) {
    let handle = register(&table, 9);
    drop(table.remove(RequestId::new(9)));
    assert_eq!(
        handle.await.map_err(|e| e.category()),
        Err(crate::error::ErrorCategory::ConnectionClosed)
    );
}
