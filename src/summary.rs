//! Per-professor summary generation.
//!
//! [`SummaryClient`] wraps a [`GenerationBackend`] with the prompt template and
//! the retry policy. It always yields a string: generated text, the
//! insufficient-data message, or [`FALLBACK_SENTINEL`].

use crate::agent::{AttemptError, GenerationBackend};
use crate::config::Config;
use crate::record::{bound_at_separator, ProfessorRecord};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Stored in place of a summary when generation failed. Never produced by a model.
pub const FALLBACK_SENTINEL: &str = "[summary unavailable]";

/// Whether a stored value counts as a finished summary
pub fn is_good_summary(value: &str) -> bool {
    value != FALLBACK_SENTINEL
}

/// Message used when a professor has no reviews to summarise
pub fn insufficient_data_message(link: &str) -> String {
    format!(
        "There are not enough reviews yet to summarize this professor. \
         See all ratings at {}",
        link
    )
}

/// The seam the batch controller depends on
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a summary for `record`. Never fails.
    async fn summarize(&self, record: &ProfessorRecord) -> String;
}

#[async_trait]
impl<T: Summarizer> Summarizer for &T {
    async fn summarize(&self, record: &ProfessorRecord) -> String {
        (**self).summarize(record).await
    }
}

/// How hard to try before giving up on a record
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_base: Duration,
    pub retry_base: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt after `attempt` (1-based) failed with `error`
    pub fn delay_after(&self, attempt: u32, error: &AttemptError) -> Duration {
        match error {
            AttemptError::RateLimited => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                self.rate_limit_base.saturating_mul(factor)
            }
            _ => self.retry_base.saturating_mul(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_base: Duration::from_secs(2),
            retry_base: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.retry.max_attempts,
            rate_limit_base: Duration::from_millis(config.retry.rate_limit_base_ms),
            retry_base: Duration::from_millis(config.retry.retry_base_ms),
        }
    }
}

/// Prompt and retry wrapper around a generation back end
pub struct SummaryClient<B> {
    backend: B,
    policy: RetryPolicy,
    persona: String,
    prompt_comment_chars: usize,
    separator: String,
}

impl<B: GenerationBackend> SummaryClient<B> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            persona: String::new(),
            prompt_comment_chars: 1200,
            separator: " | ".to_string(),
        }
    }

    /// Client configured from `[agent]`, `[retry]` and `[aggregate]`
    pub fn from_config(backend: B, config: &Config) -> Self {
        Self {
            backend,
            policy: RetryPolicy::from(config),
            persona: config.agent.persona.clone(),
            prompt_comment_chars: config.aggregate.prompt_comment_chars,
            separator: config.aggregate.separator.clone(),
        }
    }

    pub fn build_prompt(&self, record: &ProfessorRecord) -> String {
        let comments =
            bound_at_separator(&record.comments, self.prompt_comment_chars, &self.separator);
        let prompt = format!(
            r#"Write a short summary (3 to 4 sentences) of what students say about this professor.
Be balanced and specific: mention teaching style, workload and how the class is graded when the reviews cover them.
Do not invent facts that are not in the data below. Do not use markdown.
End the summary with this exact link on its own: {link}

Professor: {name}
Department: {department}
Courses: {courses}
Overall rating: {rating:.1} / 4.0 from {num_evals} evaluations
Material clarity: {clarity:.1}
Difficulty: {difficulty:.1}

Student comments:
{comments}"#,
            link = record.link,
            name = record.name,
            department = or_unknown(&record.department),
            courses = or_unknown(&record.courses),
            rating = record.rating,
            num_evals = record.num_evals,
            clarity = record.clarity,
            difficulty = record.difficulty,
            comments = comments,
        );

        if self.persona.trim().is_empty() {
            prompt
        } else {
            format!("{}\n\n{}", self.persona.trim(), prompt)
        }
    }

    async fn generate_with_retry(&self, name: &str, prompt: &str) -> String {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let error = match self.backend.generate(prompt).await {
                Ok(text) => {
                    debug!("summary for {} generated on attempt {}", name, attempt);
                    return text;
                }
                Err(e) => e,
            };

            if attempt == max_attempts {
                warn!(
                    "giving up on {} after {} attempts: {}",
                    name, max_attempts, error
                );
                break;
            }

            let delay = self.policy.delay_after(attempt, &error);
            warn!(
                "attempt {}/{} for {} failed ({}), retrying in {}ms",
                attempt,
                max_attempts,
                name,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        FALLBACK_SENTINEL.to_string()
    }
}

#[async_trait]
impl<B: GenerationBackend> Summarizer for SummaryClient<B> {
    async fn summarize(&self, record: &ProfessorRecord) -> String {
        if record.num_evals == 0 || record.comments.trim().is_empty() {
            debug!("not enough data to summarise {}", record.name);
            return insufficient_data_message(&record.link);
        }
        let prompt = self.build_prompt(record);
        self.generate_with_retry(&record.name, &prompt).await
    }
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "unknown"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Replays canned outcomes and counts calls
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<String, AttemptError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<String, AttemptError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let backend = Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: calls.clone(),
            };
            (backend, calls)
        }
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AttemptError::Malformed("script exhausted".to_string())))
        }
    }

    fn record() -> ProfessorRecord {
        ProfessorRecord {
            name: "A B".to_string(),
            rating: 3.5,
            num_evals: 10,
            clarity: 3.0,
            difficulty: 2.0,
            department: "Physics".to_string(),
            courses: String::new(),
            link: "https://www.ratemyprofessors.com/professor/1".to_string(),
            comments: "great class | hard exams".to_string(),
            grade_levels: Vec::new(),
            grades: Vec::new(),
        }
    }

    fn server_error() -> AttemptError {
        AttemptError::Status {
            status: 500,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn returns_generated_text() {
        let (backend, calls) = Scripted::new(vec![Ok("X".to_string())]);
        let client = SummaryClient::new(backend, RetryPolicy::default());
        assert_eq!(client.summarize(&record()).await, "X");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_evaluations_skips_the_call() {
        let (backend, calls) = Scripted::new(vec![Ok("X".to_string())]);
        let client = SummaryClient::new(backend, RetryPolicy::default());
        let record = ProfessorRecord {
            num_evals: 0,
            ..record()
        };
        let out = client.summarize(&record).await;
        assert_eq!(out, insufficient_data_message(&record.link));
        assert!(out.contains("https://www.ratemyprofessors.com/professor/1"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_comments_skip_the_call() {
        let (backend, calls) = Scripted::new(vec![]);
        let client = SummaryClient::new(backend, RetryPolicy::default());
        let record = ProfessorRecord {
            comments: String::new(),
            ..record()
        };
        assert!(is_good_summary(&client.summarize(&record).await));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_back_off_exponentially() {
        let (backend, calls) = Scripted::new(vec![
            Err(AttemptError::RateLimited),
            Err(AttemptError::RateLimited),
            Ok("valid summary".to_string()),
        ]);
        let client = SummaryClient::new(backend, RetryPolicy::default());

        let start = Instant::now();
        let out = client.summarize(&record()).await;

        assert_eq!(out, "valid summary");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s then 4s
        assert_eq!(start.elapsed().as_secs(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_back_off_linearly() {
        let (backend, _) = Scripted::new(vec![
            Err(server_error()),
            Err(server_error()),
            Ok("ok".to_string()),
        ]);
        let client = SummaryClient::new(backend, RetryPolicy::default());

        let start = Instant::now();
        assert_eq!(client.summarize(&record()).await, "ok");
        // 1s then 2s
        assert_eq!(start.elapsed().as_secs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_yield_sentinel() {
        let (backend, calls) = Scripted::new(vec![
            Err(server_error()),
            Err(AttemptError::RateLimited),
            Err(server_error()),
            Ok("too late".to_string()),
        ]);
        let client = SummaryClient::new(backend, RetryPolicy::default());

        let start = Instant::now();
        let out = client.summarize(&record()).await;

        assert_eq!(out, FALLBACK_SENTINEL);
        assert!(!is_good_summary(&out));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s linear, then 4s for the rate limit on attempt 2, no wait after the last
        assert_eq!(start.elapsed().as_secs(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_a_failure() {
        let (backend, calls) = Scripted::new(vec![
            Err(AttemptError::Malformed("no text".to_string())),
            Err(AttemptError::Malformed("no text".to_string())),
            Err(AttemptError::Malformed("no text".to_string())),
        ]);
        let client = SummaryClient::new(backend, RetryPolicy::default());
        assert_eq!(client.summarize(&record()).await, FALLBACK_SENTINEL);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn prompt_embeds_record_fields() {
        let (backend, _) = Scripted::new(vec![]);
        let client = SummaryClient::new(backend, RetryPolicy::default());
        let prompt = client.build_prompt(&record());
        assert!(prompt.contains("Professor: A B"));
        assert!(prompt.contains("Overall rating: 3.5 / 4.0 from 10 evaluations"));
        assert!(prompt.contains("Courses: unknown"));
        assert!(prompt.contains("great class | hard exams"));
        assert!(prompt.contains("https://www.ratemyprofessors.com/professor/1"));
    }

    #[test]
    fn prompt_truncates_comments() {
        let (backend, _) = Scripted::new(vec![]);
        let mut client = SummaryClient::new(backend, RetryPolicy::default());
        client.prompt_comment_chars = 11;
        let prompt = client.build_prompt(&record());
        assert!(prompt.ends_with("great class"));
    }

    #[test]
    fn rate_limit_delay_doubles() {
        let policy = RetryPolicy::default();
        let rl = AttemptError::RateLimited;
        assert_eq!(policy.delay_after(1, &rl), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2, &rl), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3, &rl), Duration::from_secs(8));
        assert_eq!(policy.delay_after(3, &server_error()), Duration::from_secs(3));
    }
}
