use lgw_domain::rules::CandidateProvider;
use std::collections::HashMap;
use std::sync::Mutex;

/// Picks a candidate from an ordered list and supplies the failover
/// successor. Implementations must be safe to share across requests.
pub trait SelectionStrategy: Send + Sync {
    /// Choose the candidate for a new request.
    fn select(
        &self,
        candidates: &[CandidateProvider],
        requested_model: &str,
    ) -> Option<CandidateProvider>;

    /// The next candidate after `current`, used on failover. `None` when the
    /// list has one entry or fewer, or `current` is not in it.
    fn next_after(
        &self,
        candidates: &[CandidateProvider],
        current: &CandidateProvider,
    ) -> Option<CandidateProvider>;
}

/// Round-robin over the candidate list with one monotonic counter per
/// requested model. Process-wide; the counters survive across requests and
/// reset only on restart (or explicitly, for tests).
#[derive(Default)]
pub struct RoundRobinStrategy {
    counters: Mutex<HashMap<String, u64>>,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear counters, for one model or all of them.
    pub fn reset(&self, requested_model: Option<&str>) {
        let mut counters = self.counters.lock().expect("strategy mutex");
        match requested_model {
            Some(model) => {
                counters.remove(model);
            }
            None => counters.clear(),
        }
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select(
        &self,
        candidates: &[CandidateProvider],
        requested_model: &str,
    ) -> Option<CandidateProvider> {
        if candidates.is_empty() {
            return None;
        }

        // Read-modulo-increment must be one atomic step so concurrent
        // requests never observe the same counter value.
        let index = {
            let mut counters = self.counters.lock().expect("strategy mutex");
            let counter = counters.entry(requested_model.to_string()).or_insert(0);
            let index = (*counter % candidates.len() as u64) as usize;
            *counter += 1;
            index
        };

        Some(candidates[index].clone())
    }

    fn next_after(
        &self,
        candidates: &[CandidateProvider],
        current: &CandidateProvider,
    ) -> Option<CandidateProvider> {
        if candidates.len() <= 1 {
            return None;
        }

        let position = candidates.iter().position(|c| {
            c.provider_id == current.provider_id && c.target_model == current.target_model
        })?;

        let next = (position + 1) % candidates.len();
        if next == position {
            return None;
        }
        Some(candidates[next].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lgw_domain::provider::Protocol;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn candidate(provider_id: i64) -> CandidateProvider {
        CandidateProvider {
            provider_id,
            provider_name: format!("provider-{provider_id}"),
            base_url: "https://example.com".to_string(),
            protocol: Protocol::OpenAi,
            api_key: None,
            extra_headers: None,
            proxy_enabled: false,
            proxy_url: None,
            target_model: format!("target-{provider_id}"),
            priority: 0,
            weight: 1,
        }
    }

    #[test]
    fn test_select_cycles_through_candidates() {
        let strategy = RoundRobinStrategy::new();
        let candidates = vec![candidate(1), candidate(2), candidate(3)];

        let picks: Vec<i64> = (0..6)
            .map(|_| strategy.select(&candidates, "m").unwrap().provider_id)
            .collect();
        assert_eq!(picks, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_counters_are_per_model() {
        let strategy = RoundRobinStrategy::new();
        let candidates = vec![candidate(1), candidate(2)];

        assert_eq!(strategy.select(&candidates, "a").unwrap().provider_id, 1);
        assert_eq!(strategy.select(&candidates, "b").unwrap().provider_id, 1);
        assert_eq!(strategy.select(&candidates, "a").unwrap().provider_id, 2);
    }

    #[test]
    fn test_empty_candidates() {
        let strategy = RoundRobinStrategy::new();
        assert!(strategy.select(&[], "m").is_none());
    }

    #[test]
    fn test_next_after_wraps() {
        let strategy = RoundRobinStrategy::new();
        let candidates = vec![candidate(1), candidate(2), candidate(3)];

        let next = strategy.next_after(&candidates, &candidates[2]).unwrap();
        assert_eq!(next.provider_id, 1);
        let next = strategy.next_after(&candidates, &candidates[0]).unwrap();
        assert_eq!(next.provider_id, 2);
    }

    #[test]
    fn test_next_after_single_candidate() {
        let strategy = RoundRobinStrategy::new();
        let candidates = vec![candidate(1)];
        assert!(strategy.next_after(&candidates, &candidates[0]).is_none());
        assert!(strategy.next_after(&[], &candidate(1)).is_none());
    }

    #[test]
    fn test_reset() {
        let strategy = RoundRobinStrategy::new();
        let candidates = vec![candidate(1), candidate(2)];
        strategy.select(&candidates, "m");
        strategy.reset(Some("m"));
        assert_eq!(strategy.select(&candidates, "m").unwrap().provider_id, 1);
        strategy.reset(None);
        assert_eq!(strategy.select(&candidates, "m").unwrap().provider_id, 1);
    }

    #[test]
    fn test_concurrent_selects_advance_exactly_once_each() {
        let strategy = Arc::new(RoundRobinStrategy::new());
        let candidates = Arc::new(vec![candidate(1), candidate(2), candidate(3)]);
        let threads: usize = 30;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let strategy = strategy.clone();
                let candidates = candidates.clone();
                std::thread::spawn(move || {
                    strategy.select(&candidates, "m").unwrap().provider_id
                })
            })
            .collect();

        let mut picks: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        picks.sort_unstable();

        // 30 selects over 3 candidates: each index chosen exactly 10 times.
        let counts: HashMap<i64, usize> =
            picks.iter().fold(HashMap::new(), |mut acc, id| {
                *acc.entry(*id).or_default() += 1;
                acc
            });
        assert_eq!(counts.keys().collect::<HashSet<_>>().len(), 3);
        assert!(counts.values().all(|&n| n == threads / 3));
    }
}
