//! Worker pool behaviour with stub strategies

use crate::common::{
    drain, harvester, harvester_at, job, status_sequence, table_with, AlwaysFails,
    FailsThenSucceeds, Hangs, Panics, Slow, Succeeds,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::extract::StrategyTable;
use sumi_harvest::JobStatus::{Completed, Failed, Pending, Processing};
use sumi_harvest::SourceType;
use tempfile::TempDir;

#[tokio::test]
async fn test_jobs_complete() {
    let (harvester, _dir) = harvester(table_with(Arc::new(Succeeds("hello"))), 3, 3);
    let orchestrator = harvester.orchestrator();

    let ids: Vec<_> = (0..5)
        .map(|i| {
            orchestrator
                .submit(&format!("https://example.com/page/{}", i), None)
                .unwrap()
                .id
        })
        .collect();

    drain(&harvester).await;

    for id in ids {
        let job = job(orchestrator, id);
        assert_eq!(job.status, Completed);
        assert_eq!(job.attempt_count, 1);
        let result = orchestrator.get_result(id).unwrap();
        assert_eq!(result.clean_text, "hello");
        assert_eq!(
            result.metadata["source_url"],
            format!("https://example.com/page/{}", id - 1)
        );
    }
}

#[tokio::test]
async fn test_always_failing_job_exhausts_attempts() {
    let (harvester, _dir) = harvester(table_with(Arc::new(AlwaysFails)), 3, 2);
    let orchestrator = harvester.orchestrator();
    let id = orchestrator.submit("https://example.com/broken", None).unwrap().id;

    drain(&harvester).await;

    let job = job(orchestrator, id);
    assert_eq!(job.status, Failed);
    assert_eq!(job.attempt_count, 3);
    assert_eq!(
        job.error_message.as_deref(),
        Some("extraction error after 3 attempts: boom")
    );
    assert_eq!(
        status_sequence(orchestrator, id),
        vec![Pending, Processing, Pending, Processing, Pending, Processing, Failed]
    );

    // each re-claim waits out the backoff of the attempt before it
    let policy = orchestrator.retry_policy();
    let history = orchestrator.history(id).unwrap();
    let mut delays = Vec::new();
    for pair in history.windows(2) {
        let (retry, reclaim) = (&pair[0], &pair[1]);
        if retry.from != Some(Processing) || retry.to != Pending {
            continue;
        }
        assert_eq!(reclaim.to, Processing);
        let waited = (reclaim.at - retry.at).to_std().unwrap();
        let delay = policy.delay_for(retry.attempt);
        // visibility is stored in whole milliseconds, scheduled just before the commit
        assert!(
            waited + Duration::from_millis(2) >= delay,
            "attempt {} re-claimed after {:?}, backoff is {:?}",
            retry.attempt,
            waited,
            delay
        );
        delays.push(delay);
    }
    assert_eq!(
        delays,
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}

#[tokio::test]
async fn test_flaky_job_eventually_completes() {
    let (harvester, _dir) = harvester(table_with(Arc::new(FailsThenSucceeds::new(2))), 3, 1);
    let orchestrator = harvester.orchestrator();
    let id = orchestrator.submit("https://example.com/flaky", None).unwrap().id;

    drain(&harvester).await;

    let job = job(orchestrator, id);
    assert_eq!(job.status, Completed);
    assert_eq!(job.attempt_count, 3);
    assert!(job.error_message.is_none());

    let history = orchestrator.history(id).unwrap();
    let retry_details: Vec<_> = history
        .iter()
        .filter(|entry| entry.from == Some(Processing) && entry.to == Pending)
        .filter_map(|entry| entry.detail.clone())
        .collect();
    assert_eq!(retry_details.len(), 2);
    assert!(retry_details
        .iter()
        .all(|d| d == "extraction error: no extractable content"));
}

#[tokio::test]
async fn test_hung_strategy_times_out() {
    let (harvester, _dir) = harvester(table_with(Arc::new(Hangs)), 1, 1);
    let orchestrator = harvester.orchestrator();
    let id = orchestrator.submit("https://example.com/slow", None).unwrap().id;

    drain(&harvester).await;

    let job = job(orchestrator, id);
    assert_eq!(job.status, Failed);
    let message = job.error_message.unwrap();
    assert!(message.starts_with("timeout error after 1 attempt"), "{}", message);
}

#[tokio::test]
async fn test_panicking_strategy_only_fails_its_own_job() {
    let strategies = table_with(Arc::new(Succeeds("fine"))).with(SourceType::News, Arc::new(Panics));
    let (harvester, _dir) = harvester(strategies, 2, 2);
    let orchestrator = harvester.orchestrator();

    let doomed = orchestrator
        .submit("https://example.com/news/1", Some(SourceType::News))
        .unwrap()
        .id;
    let healthy = orchestrator
        .submit("https://example.com/other", Some(SourceType::Generic))
        .unwrap()
        .id;

    drain(&harvester).await;

    let doomed = job(orchestrator, doomed);
    assert_eq!(doomed.status, Failed);
    assert_eq!(
        doomed.error_message.as_deref(),
        Some("panic error after 2 attempts: strategy panicked: strategy exploded")
    );
    assert_eq!(job(orchestrator, healthy).status, Completed);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let slow = Arc::new(Slow::new(Duration::from_millis(100)));
    let (harvester, _dir) = harvester(table_with(slow.clone()), 1, 2);
    let orchestrator = harvester.orchestrator();

    for i in 0..6 {
        orchestrator
            .submit(&format!("https://example.com/{}", i), None)
            .unwrap();
    }

    drain(&harvester).await;

    assert_eq!(slow.calls.load(Ordering::SeqCst), 6);
    assert!(slow.peak.load(Ordering::SeqCst) <= 2);
    assert!(slow.peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_abandoned_claim_is_recovered_on_start() {
    let dir = TempDir::new().unwrap();

    // a worker that claimed the job and then went away
    let id = {
        let harvester = harvester_at(dir.path(), StrategyTable::new(), 3, 1);
        let orchestrator = harvester.orchestrator();
        let id = orchestrator.submit("https://example.com/orphan", None).unwrap().id;
        orchestrator.claim(id).unwrap();
        id
    };

    // older than stale-after-secs
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let harvester = harvester_at(dir.path(), table_with(Arc::new(Succeeds("rescued"))), 3, 1);
    drain(&harvester).await;

    let orchestrator = harvester.orchestrator();
    let job = job(orchestrator, id);
    assert_eq!(job.status, Completed);
    assert_eq!(job.attempt_count, 2);

    let history = orchestrator.history(id).unwrap();
    assert!(history.iter().any(|entry| entry
        .detail
        .as_deref()
        .map_or(false, |d| d.starts_with("interrupted error"))));
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_job() {
    let slow = Arc::new(Slow::new(Duration::from_millis(300)));
    let (harvester, _dir) = harvester(table_with(slow.clone()), 1, 1);
    let orchestrator = harvester.orchestrator();
    let id = orchestrator.submit("https://example.com/in-flight", None).unwrap().id;

    let pool = harvester.start().unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while slow.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job was never picked up");

    pool.shutdown().await;

    assert_eq!(job(orchestrator, id).status, Completed);
}

#[tokio::test]
async fn test_jobs_submitted_while_running_are_picked_up() {
    let (harvester, _dir) = harvester(table_with(Arc::new(Succeeds("late"))), 3, 2);
    let orchestrator = harvester.orchestrator();

    let pool = harvester.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let id = orchestrator.submit("https://example.com/late", None).unwrap().id;

    tokio::time::timeout(Duration::from_secs(10), pool.wait_until_idle())
        .await
        .expect("pool never went idle")
        .unwrap();
    pool.shutdown().await;

    assert_eq!(job(orchestrator, id).status, Completed);
}
