use async_trait::async_trait;
use profsumma::agent::{AttemptError, GenerationBackend};
use profsumma::fetch::{parse_comments, parse_ratings};
use profsumma::summary::RetryPolicy;
use profsumma::{
    aggregate, AggregateOptions, BatchController, BatchOptions, JsonFileStore, RunMode,
    StateStore, SummaryClient, FALLBACK_SENTINEL,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const RATINGS: &str = "fullName,overallRating,numEvals,id\nA B,3.5,10,1\n";
const COMMENTS: &str = "professor_name,rating_text\nA B,great class\n";

/// Replays canned outcomes; once empty, keeps answering with `default`
struct FakeApi {
    outcomes: Mutex<VecDeque<Result<String, AttemptError>>>,
    default: String,
    calls: AtomicUsize,
}

impl FakeApi {
    fn answering(text: &str) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default: String::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for &FakeApi {
    async fn generate(&self, _prompt: &str) -> Result<String, AttemptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.outcomes.lock().unwrap().pop_front() {
            return outcome;
        }
        if self.default.is_empty() {
            Err(AttemptError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(self.default.clone())
        }
    }
}

fn no_wait() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        rate_limit_base: Duration::ZERO,
        retry_base: Duration::ZERO,
    }
}

fn options(mode: RunMode) -> BatchOptions {
    BatchOptions {
        mode,
        batch_size: 10,
        request_delay: Duration::ZERO,
    }
}

fn records() -> Vec<profsumma::ProfessorRecord> {
    aggregate(
        &parse_ratings(RATINGS),
        &parse_comments(COMMENTS),
        &AggregateOptions::default(),
    )
}

#[tokio::test]
async fn csv_to_stored_summary() {
    let records = records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "A B");
    assert_eq!(records[0].rating, 3.5);
    assert_eq!(records[0].num_evals, 10);
    assert_eq!(records[0].comments, "great class");
    assert!(records[0].link.ends_with("/professor/1"));

    let dir = tempfile::tempdir().unwrap();
    let api = FakeApi::answering("X");
    let controller = BatchController::new(
        SummaryClient::new(&api, no_wait()),
        JsonFileStore::in_dir(dir.path()),
        options(RunMode::Batch),
    );
    controller.run(&records).await.unwrap();

    let reloaded = JsonFileStore::in_dir(dir.path());
    assert_eq!(reloaded.load_results().get("A B"), Some("X"));
    assert_eq!(reloaded.load_cursor().last_index, 0);
    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn second_batch_run_does_not_call_again() {
    let records = records();
    let dir = tempfile::tempdir().unwrap();
    let api = FakeApi::answering("X");

    for _ in 0..2 {
        let controller = BatchController::new(
            SummaryClient::new(&api, no_wait()),
            JsonFileStore::in_dir(dir.path()),
            options(RunMode::Batch),
        );
        controller.run(&records).await.unwrap();
    }

    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn full_run_keeps_good_summary_when_api_fails() {
    let records = records();
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::in_dir(dir.path());
    let mut seeded = store.load_results();
    seeded.insert("A B", "earlier summary");
    store.save_results(&seeded).unwrap();

    let api = FakeApi::failing();
    let controller = BatchController::new(
        SummaryClient::new(&api, no_wait()),
        store,
        options(RunMode::Full),
    );
    let report = controller.run(&records).await.unwrap();

    assert_eq!(api.calls(), 3);
    assert_eq!(report.retained, 1);
    assert_eq!(
        controller.store().load_results().get("A B"),
        Some("earlier summary")
    );
}

#[tokio::test]
async fn failed_batch_run_stores_sentinel_for_retry() {
    let records = records();
    let dir = tempfile::tempdir().unwrap();
    let api = FakeApi::failing();
    let controller = BatchController::new(
        SummaryClient::new(&api, no_wait()),
        JsonFileStore::in_dir(dir.path()),
        options(RunMode::Batch),
    );
    controller.run(&records).await.unwrap();
    assert_eq!(
        controller.store().load_results().get("A B"),
        Some(FALLBACK_SENTINEL)
    );

    // The next run picks the failed professor up again.
    let api = FakeApi::answering("recovered");
    let controller = BatchController::new(
        SummaryClient::new(&api, no_wait()),
        JsonFileStore::in_dir(dir.path()),
        options(RunMode::Batch),
    );
    controller.run(&records).await.unwrap();
    assert_eq!(
        controller.store().load_results().get("A B"),
        Some("recovered")
    );
}
