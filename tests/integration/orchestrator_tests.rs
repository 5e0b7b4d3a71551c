//! Orchestrator behaviour against an on-disk database, without workers

use crate::common::{harvester, harvester_at, job, status_sequence, table_with, Succeeds};
use std::sync::Arc;
use sumi_harvest::extract::{ExtractedContent, StrategyTable};
use sumi_harvest::orchestrator::{FailureKind, JobFailure};
use sumi_harvest::storage;
use sumi_harvest::{JobStatus, OrchestratorError, SourceType};
use tempfile::TempDir;

#[test]
fn test_submit_claim_complete_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let job_id = {
        let harvester = harvester_at(dir.path(), StrategyTable::new(), 3, 1);
        let orchestrator = harvester.orchestrator();

        let submitted = orchestrator.submit("https://example.com/a", None).unwrap();
        assert_eq!(submitted.status, JobStatus::Pending);
        assert_eq!(submitted.attempt_count, 0);
        assert_eq!(submitted.source_type, None);

        let claimed = orchestrator.claim(submitted.id).unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempt_count, 1);
        assert_eq!(claimed.source_type, Some(SourceType::Generic));

        let content = ExtractedContent::new("hello").with("title", "Greeting");
        let completed = orchestrator.complete(submitted.id, &content).unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert!(completed.result_ref.is_some());
        assert!(completed.error_message.is_none());
        submitted.id
    };

    let reopened = harvester_at(dir.path(), StrategyTable::new(), 3, 1);
    let result = reopened.orchestrator().get_result(job_id).unwrap();
    assert_eq!(result.clean_text, "hello");
    assert_eq!(result.metadata["title"], "Greeting");
    assert_eq!(
        status_sequence(reopened.orchestrator(), job_id),
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
    );
}

#[test]
fn test_malformed_url_creates_nothing() {
    let (harvester, _dir) = harvester(StrategyTable::new(), 3, 1);

    let err = harvester.orchestrator().submit("not-a-url", None).unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    let err = harvester
        .orchestrator()
        .submit("ftp://example.com/file", None)
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    let storage = storage::lock(harvester.storage()).unwrap();
    assert_eq!(storage.count_total_jobs().unwrap(), 0);
    assert_eq!(storage.queue_len().unwrap(), 0);
}

#[test]
fn test_source_type_is_classified_at_claim() {
    let (harvester, _dir) = harvester(StrategyTable::new(), 3, 1);
    let orchestrator = harvester.orchestrator();

    let social = orchestrator
        .submit("https://twitter.com/someone/status/123", None)
        .unwrap();
    let news = orchestrator
        .submit("https://www.bbc.co.uk/news/world-1", None)
        .unwrap();
    let explicit = orchestrator
        .submit("https://twitter.com/someone/status/456", Some(SourceType::Generic))
        .unwrap();

    assert_eq!(
        orchestrator.claim(social.id).unwrap().source_type,
        Some(SourceType::Social)
    );
    assert_eq!(
        orchestrator.claim(news.id).unwrap().source_type,
        Some(SourceType::News)
    );
    // an explicit type is never overridden
    assert_eq!(
        orchestrator.claim(explicit.id).unwrap().source_type,
        Some(SourceType::Generic)
    );
}

#[test]
fn test_concurrent_claims_have_one_winner() {
    let (harvester, _dir) = harvester(StrategyTable::new(), 3, 1);
    let orchestrator = harvester.orchestrator().clone();
    let job_id = orchestrator.submit("https://example.com/race", None).unwrap().id;

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = Arc::clone(&orchestrator);
                scope.spawn(move || orchestrator.claim(job_id))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e, OrchestratorError::AlreadyClaimed { .. }),
                "unexpected error: {}",
                e
            );
        }
    }
    assert_eq!(job(&orchestrator, job_id).attempt_count, 1);
}

#[test]
fn test_concurrent_complete_and_fail_have_one_winner() {
    let (harvester, _dir) = harvester(StrategyTable::new(), 1, 1);
    let orchestrator = harvester.orchestrator().clone();
    let job_id = orchestrator.submit("https://example.com/race", None).unwrap().id;
    orchestrator.claim(job_id).unwrap();

    let content = ExtractedContent::new("body");
    let failure = JobFailure::new(FailureKind::Extraction, "boom");
    let (completed, failed) = std::thread::scope(|scope| {
        let completing = scope.spawn(|| orchestrator.complete(job_id, &content));
        let failing = scope.spawn(|| orchestrator.fail(job_id, &failure));
        (completing.join().unwrap(), failing.join().unwrap())
    });

    assert_ne!(completed.is_ok(), failed.is_ok());
    let record = job(&orchestrator, job_id);
    if completed.is_ok() {
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.result_ref.is_some());
    } else {
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.result_ref.is_none());
    }
    assert_eq!(orchestrator.history(job_id).unwrap().len(), 3);
}

#[test]
fn test_terminal_jobs_reject_transitions() {
    let (harvester, _dir) = harvester(StrategyTable::new(), 3, 1);
    let orchestrator = harvester.orchestrator();
    let job_id = orchestrator.submit("https://example.com/done", None).unwrap().id;
    orchestrator.claim(job_id).unwrap();
    orchestrator
        .complete(job_id, &ExtractedContent::new("done"))
        .unwrap();

    assert!(matches!(
        orchestrator.claim(job_id),
        Err(OrchestratorError::TerminalState { .. })
    ));
    assert!(matches!(
        orchestrator.fail(job_id, &JobFailure::new(FailureKind::Fetch, "late")),
        Err(OrchestratorError::TerminalState { .. })
    ));
    assert!(matches!(
        orchestrator.complete(job_id, &ExtractedContent::new("again")),
        Err(OrchestratorError::TerminalState { .. })
    ));

    let job = job(orchestrator, job_id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempt_count, 1);
}

#[test]
fn test_complete_requires_a_claim() {
    let (harvester, _dir) = harvester(StrategyTable::new(), 3, 1);
    let orchestrator = harvester.orchestrator();
    let job_id = orchestrator.submit("https://example.com/early", None).unwrap().id;

    assert!(matches!(
        orchestrator.complete(job_id, &ExtractedContent::new("too early")),
        Err(OrchestratorError::InvalidTransition { .. })
    ));
    assert!(matches!(
        orchestrator.get_result(job_id),
        Err(OrchestratorError::NotReady { .. })
    ));
}

#[test]
fn test_unknown_job() {
    let (harvester, _dir) = harvester(table_with(Arc::new(Succeeds("x"))), 3, 1);
    let orchestrator = harvester.orchestrator();

    assert!(matches!(
        orchestrator.get_job(9_999),
        Err(OrchestratorError::NotFound(9_999))
    ));
    assert!(matches!(
        orchestrator.claim(9_999),
        Err(OrchestratorError::NotFound(9_999))
    ));
    assert!(matches!(
        orchestrator.history(9_999),
        Err(OrchestratorError::NotFound(9_999))
    ));
}

#[test]
fn test_failures_retry_then_terminate() {
    let (harvester, _dir) = harvester(StrategyTable::new(), 2, 1);
    let orchestrator = harvester.orchestrator();
    let job_id = orchestrator.submit("https://example.com/flaky", None).unwrap().id;
    let failure = JobFailure::new(FailureKind::Fetch, "HTTP status 503");

    orchestrator.claim(job_id).unwrap();
    let retried = orchestrator.fail(job_id, &failure).unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.error_message.is_none());

    orchestrator.claim(job_id).unwrap();
    let failed = orchestrator.fail(job_id, &failure).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempt_count, 2);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("fetch error after 2 attempts: HTTP status 503")
    );
    assert!(failed.result_ref.is_none());
}
