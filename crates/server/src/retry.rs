use lgw_core::strategy::SelectionStrategy;
use lgw_domain::response::ProviderResponse;
use lgw_domain::rules::CandidateProvider;
use lgw_provider::StreamedResponse;
use std::future::Future;
use std::time::Duration;

/// What the retry loop needs to know about one forward attempt's result.
/// Implemented by both the blocking and the streaming response shapes.
pub trait AttemptOutcome {
    fn status(&self) -> u16;

    /// Synthesize the 503 returned when every candidate has been consumed
    /// without a success.
    fn exhausted(message: String) -> Self;
}

impl AttemptOutcome for ProviderResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn exhausted(message: String) -> Self {
        ProviderResponse::failure(503, message)
    }
}

impl AttemptOutcome for StreamedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn exhausted(message: String) -> Self {
        StreamedResponse::failure(503, message)
    }
}

/// The terminal result of the attempt loop.
pub struct RetryOutcome<R> {
    pub response: R,
    /// Total upstream attempts minus one: the extra work done.
    pub retry_count: u32,
    /// The candidate that produced `response`, when there was one.
    pub provider: Option<CandidateProvider>,
}

/// Drives forward attempts across the candidate list.
///
/// 5xx and transport failures are retried on the same candidate up to
/// `max_retries` times with a fixed sleep in between; 4xx fails over to the
/// next candidate immediately. Each candidate is consumed at most once, so
/// with N candidates and every call failing retriably the loop performs
/// exactly `N * (max_retries + 1)` forwards.
pub struct RetryHandler {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryHandler {
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            max_retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
        }
    }

    pub async fn run<R, F, Fut>(
        &self,
        candidates: &[CandidateProvider],
        requested_model: &str,
        strategy: &dyn SelectionStrategy,
        forward: F,
    ) -> RetryOutcome<R>
    where
        R: AttemptOutcome,
        F: Fn(CandidateProvider) -> Fut,
        Fut: Future<Output = R>,
    {
        let Some(mut current) = strategy.select(candidates, requested_model) else {
            return RetryOutcome {
                response: R::exhausted("no candidate providers".to_string()),
                retry_count: 0,
                provider: None,
            };
        };

        let mut total_attempts: u32 = 0;
        let mut attempts_on_current: u32 = 0;
        let mut consumed: usize = 1;
        let mut tried_names: Vec<String> = vec![current.provider_name.clone()];
        let mut last: Option<R> = None;

        loop {
            let response = forward(current.clone()).await;
            total_attempts += 1;
            let status = response.status();

            if (200..400).contains(&status) {
                return RetryOutcome {
                    response,
                    retry_count: total_attempts - 1,
                    provider: Some(current),
                };
            }

            let retriable = status >= 500;
            if retriable && attempts_on_current < self.max_retries {
                tracing::warn!(
                    provider = %current.provider_name,
                    status,
                    attempt = attempts_on_current + 1,
                    "upstream failure, retrying after delay"
                );
                last = Some(response);
                tokio::time::sleep(self.retry_delay).await;
                attempts_on_current += 1;
                continue;
            }

            // This candidate is spent (retry budget burned, or a
            // non-retriable 4xx): fail over to the next one.
            last = Some(response);
            if consumed >= candidates.len() {
                break;
            }
            match strategy.next_after(candidates, &current) {
                Some(next) => {
                    tracing::warn!(
                        from = %current.provider_name,
                        to = %next.provider_name,
                        status,
                        "failing over to next candidate"
                    );
                    current = next;
                    consumed += 1;
                    attempts_on_current = 0;
                    tried_names.push(current.provider_name.clone());
                }
                None => break,
            }
        }

        let last = last.expect("at least one attempt was made");
        // A trailing non-retriable 4xx is the client's own error: pass the
        // captured upstream response through instead of masking it.
        if (400..500).contains(&last.status()) {
            return RetryOutcome {
                response: last,
                retry_count: total_attempts - 1,
                provider: Some(current),
            };
        }

        RetryOutcome {
            response: R::exhausted(format!(
                "all providers failed for model {requested_model} (tried: {})",
                tried_names.join(", ")
            )),
            retry_count: total_attempts.saturating_sub(1),
            provider: None,
        }
    }
}
