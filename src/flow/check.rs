//! Check flow engine.
//!
//! One Check request runs PreCheck once, then each condition independently
//! on its own worker thread under its own deadline, then PostCheck over a
//! copy of the accumulated results. Per-unit cancellation is cooperative:
//! the engine polls the worker for completion at a fixed interval, and on
//! deadline expiry signals the [`CancelToken`] and proceeds regardless of
//! whether the worker actually stops. A worker that ignores the token keeps
//! running detached until it finishes on its own - a known resource cost of
//! the protocol's execution model, not something the engine reclaims.
//!
//! The final result list always follows the original condition order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::methods::check::{CheckRequestBody, CheckResponseBody, CheckingResult, Condition};
use crate::processor::{CancelToken, CheckProcessor, PreCheckValue, ProcessorRegistry, UnitOutcome};

/// Interval at which the engine polls a running unit for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn process_body(
    registry: &ProcessorRegistry,
    body: CheckRequestBody,
    config: &Config,
) -> CheckResponseBody {
    let pre_check = perform_pre_check(registry, &body);

    let mut results = Vec::with_capacity(body.conditions.len());
    let mut checkers: Vec<Arc<dyn CheckProcessor>> = Vec::new();
    for condition in &body.conditions {
        let result = match registry.check() {
            Some(processor) => {
                checkers.push(Arc::clone(&processor));
                let limit = unit_time_limit(condition, config);
                run_unit(processor, condition, &body, pre_check.as_ref(), limit)
            }
            None => {
                warn!(id = condition.id, "no Check processor registered");
                zero_result(condition.id, 0, "no Check processor registered")
            }
        };
        results.push(result);
    }

    let results = perform_post_check(registry, &body, pre_check.as_ref(), results, &checkers);
    CheckResponseBody { results }
}

/// Runs one condition on a worker thread, polling until completion or the
/// unit deadline. The returned result is always well-formed, whatever the
/// worker did.
fn run_unit(
    processor: Arc<dyn CheckProcessor>,
    condition: &Condition,
    body: &CheckRequestBody,
    pre_check: Option<&PreCheckValue>,
    limit: Duration,
) -> CheckingResult {
    let cancel = CancelToken::new();
    let slot: Arc<Mutex<Option<Result<UnitOutcome, String>>>> = Arc::new(Mutex::new(None));

    let worker = {
        let slot = Arc::clone(&slot);
        let cancel = cancel.clone();
        let condition = condition.clone();
        let instructions = body.instructions.clone();
        let pre_generated = body.pre_generated.clone();
        let pre_check = pre_check.cloned();
        thread::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                processor.check_unit(
                    &condition,
                    &instructions,
                    pre_generated.as_ref(),
                    pre_check.as_ref(),
                    &cancel,
                )
            }));
            let outcome = match outcome {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(error)) => Err(error.to_string()),
                Err(_) => Err("check panicked".to_string()),
            };
            *slot.lock().expect("check result slot poisoned") = Some(outcome);
        })
    };

    let started = Instant::now();
    while started.elapsed() < limit && !worker.is_finished() {
        thread::sleep(POLL_INTERVAL);
    }
    let elapsed = started.elapsed().as_millis() as u64;
    cancel.cancel();

    let outcome = slot.lock().expect("check result slot poisoned").take();
    match outcome {
        Some(Ok(outcome)) => validated_result(condition.id, elapsed, outcome),
        Some(Err(error)) => {
            warn!(id = condition.id, error = %error, "check unit failed");
            zero_result(condition.id, elapsed, "exception while checking")
        }
        None => {
            warn!(id = condition.id, limit_ms = limit.as_millis() as u64, "check unit deadline exceeded");
            zero_result(condition.id, elapsed, "time limit exceeded")
        }
    }
}

/// Condition's own limit when positive, the configured default otherwise.
fn unit_time_limit(condition: &Condition, config: &Config) -> Duration {
    if condition.time_limit > 0 {
        Duration::from_secs(condition.time_limit as u64)
    } else {
        config.check_unit_time_limit
    }
}

/// Accepts a raw outcome, forcing an out-of-range score to zero. The
/// processor's comment is replaced with a diagnostic on that path.
fn validated_result(id: i32, elapsed: u64, outcome: UnitOutcome) -> CheckingResult {
    if (0.0..=1.0).contains(&outcome.score) {
        CheckingResult {
            id,
            time: elapsed,
            result: format_score(outcome.score),
            comment: Some(outcome.comment),
        }
    } else {
        warn!(id, score = outcome.score, "check score out of [0;1], forcing to zero");
        zero_result(id, elapsed, &format!("score {} out of [0;1], forced to 0", outcome.score))
    }
}

fn zero_result(id: i32, elapsed: u64, comment: &str) -> CheckingResult {
    CheckingResult {
        id,
        time: elapsed,
        result: format_score(0.0),
        comment: Some(comment.to_string()),
    }
}

/// 2-decimal fixed point, rounded half-up.
fn format_score(score: f64) -> String {
    format!("{:.2}", (score * 100.0).round() / 100.0)
}

fn perform_pre_check(registry: &ProcessorRegistry, body: &CheckRequestBody) -> Option<PreCheckValue> {
    let processor = registry.pre_check()?;
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        processor.pre_check(&body.conditions, &body.instructions, body.pre_generated.as_ref())
    }));
    match outcome {
        Ok(Ok(value)) => Some(value),
        Ok(Err(error)) => {
            warn!(error = %error, "pre-check failed");
            None
        }
        Err(_) => {
            warn!("pre-check panicked");
            None
        }
    }
}

/// Hands PostCheck a copy of the results; the copy replaces the originals
/// only when it validates against the conditions. Failures are logged and
/// the originals kept.
fn perform_post_check(
    registry: &ProcessorRegistry,
    body: &CheckRequestBody,
    pre_check: Option<&PreCheckValue>,
    results: Vec<CheckingResult>,
    checkers: &[Arc<dyn CheckProcessor>],
) -> Vec<CheckingResult> {
    let Some(processor) = registry.post_check() else {
        return results;
    };
    let mut rewritten = results.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        processor.post_check(pre_check, &mut rewritten, checkers)
    }));
    match outcome {
        Ok(Ok(())) if override_accepted(&body.conditions, &rewritten) => {
            debug!("post-check rewrote the result set");
            reorder_to_conditions(&body.conditions, rewritten)
        }
        Ok(Ok(())) => results,
        Ok(Err(error)) => {
            warn!(error = %error, "post-check failed");
            results
        }
        Err(_) => {
            warn!("post-check panicked");
            results
        }
    }
}

/// Validity of a PostCheck rewrite: the result count must match the
/// condition count and the id sets must match exactly. On top of that the
/// reference acceptance predicate applies verbatim: some result must carry a
/// score *outside* [0;1] together with a positive elapsed time and a
/// comment. An unparsable score encountered before a match discards the
/// whole rewrite.
fn override_accepted(conditions: &[Condition], rewritten: &[CheckingResult]) -> bool {
    if rewritten.len() != conditions.len() {
        return false;
    }
    let mut expected: Vec<i32> = conditions.iter().map(|condition| condition.id).collect();
    let mut found: Vec<i32> = rewritten.iter().map(|result| result.id).collect();
    expected.sort_unstable();
    found.sort_unstable();
    if expected != found {
        return false;
    }

    for result in rewritten {
        let score: f64 = match result.result.parse() {
            Ok(score) => score,
            Err(_) => return false,
        };
        if !(0.0..=1.0).contains(&score) && result.time > 0 && result.comment.is_some() {
            return true;
        }
    }
    false
}

/// Puts an accepted rewrite back into original condition order.
fn reorder_to_conditions(
    conditions: &[Condition],
    mut rewritten: Vec<CheckingResult>,
) -> Vec<CheckingResult> {
    let mut ordered = Vec::with_capacity(conditions.len());
    for condition in conditions {
        if let Some(pos) = rewritten.iter().position(|result| result.id == condition.id) {
            ordered.push(rewritten.swap_remove(pos));
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::methods::generate::GeneratingResult;
    use crate::processor::{
        PostCheckProcessor, PreCheckProcessor, ProcessorError, ProcessorFactory,
    };

    fn test_config() -> Config {
        Config {
            check_unit_time_limit: Duration::from_millis(200),
            ..Config::default()
        }
    }

    fn conditions(ids: &[i32]) -> Vec<Condition> {
        ids.iter()
            .map(|&id| Condition {
                id,
                time_limit: 0,
                input: format!("input {id}"),
                output: format!("output {id}"),
            })
            .collect()
    }

    fn request_body(ids: &[i32]) -> CheckRequestBody {
        CheckRequestBody {
            conditions: conditions(ids),
            instructions: "answer".to_string(),
            pre_generated: None,
        }
    }

    struct FixedScore(f64);

    impl CheckProcessor for FixedScore {
        fn check_unit(
            &self,
            condition: &Condition,
            _instructions: &str,
            _pre_generated: Option<&GeneratingResult>,
            _pre_check: Option<&PreCheckValue>,
            _cancel: &CancelToken,
        ) -> Result<UnitOutcome, ProcessorError> {
            Ok(UnitOutcome::new(self.0, format!("checked {}", condition.id)))
        }
    }

    struct Failing;

    impl CheckProcessor for Failing {
        fn check_unit(
            &self,
            _condition: &Condition,
            _instructions: &str,
            _pre_generated: Option<&GeneratingResult>,
            _pre_check: Option<&PreCheckValue>,
            _cancel: &CancelToken,
        ) -> Result<UnitOutcome, ProcessorError> {
            Err("boom".into())
        }
    }

    /// Sleeps in small slices, exiting early once cancelled.
    struct Cooperative {
        total: Duration,
        observed_cancel: Arc<AtomicBool>,
    }

    impl CheckProcessor for Cooperative {
        fn check_unit(
            &self,
            _condition: &Condition,
            _instructions: &str,
            _pre_generated: Option<&GeneratingResult>,
            _pre_check: Option<&PreCheckValue>,
            cancel: &CancelToken,
        ) -> Result<UnitOutcome, ProcessorError> {
            let started = Instant::now();
            while started.elapsed() < self.total {
                if cancel.is_cancelled() {
                    self.observed_cancel.store(true, Ordering::Relaxed);
                    return Err("cancelled".into());
                }
                thread::sleep(Duration::from_millis(5));
            }
            Ok(UnitOutcome::new(1.0, "finished"))
        }
    }

    fn registry_with(processor: Arc<dyn CheckProcessor>) -> ProcessorRegistry {
        let mut registry = ProcessorRegistry::new();
        registry.register_check(ProcessorFactory::Singleton(processor));
        registry
    }

    #[test]
    fn test_results_follow_condition_order() {
        let registry = registry_with(Arc::new(FixedScore(1.0)));
        let response = process_body(&registry, request_body(&[3, 1, 2]), &test_config());
        let ids: Vec<i32> = response.results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(response.results.iter().all(|r| r.result == "1.00"));
    }

    #[test]
    fn test_failing_unit_scores_zero_with_diagnostic() {
        let registry = registry_with(Arc::new(Failing));
        let response = process_body(&registry, request_body(&[1]), &test_config());
        let result = &response.results[0];
        assert_eq!(result.result, "0.00");
        assert!(result.comment.as_deref().unwrap().contains("exception"));
    }

    #[test]
    fn test_missing_check_processor_short_circuits() {
        let registry = ProcessorRegistry::new();
        let mut body = request_body(&[1, 2, 3]);
        for condition in &mut body.conditions {
            condition.time_limit = 30; // would be a 90 s wait if not short-circuited
        }
        let started = Instant::now();
        let response = process_body(&registry, body, &test_config());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(response.results.len(), 3);
        for result in &response.results {
            assert_eq!(result.result, "0.00");
            assert_eq!(result.time, 0);
            assert!(result.comment.is_some());
        }
    }

    #[test]
    fn test_deadline_cancels_slow_unit() {
        let observed_cancel = Arc::new(AtomicBool::new(false));
        let registry = registry_with(Arc::new(Cooperative {
            total: Duration::from_secs(10),
            observed_cancel: Arc::clone(&observed_cancel),
        }));

        let started = Instant::now();
        let response = process_body(&registry, request_body(&[1]), &test_config());
        // the engine came back shortly after the 200 ms unit limit
        assert!(started.elapsed() < Duration::from_secs(2));

        let result = &response.results[0];
        assert_eq!(result.result, "0.00");
        assert!(result.time >= 200);
        assert!(result.comment.is_some());

        // the worker saw the cancellation signal and stopped early
        thread::sleep(Duration::from_millis(100));
        assert!(observed_cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn test_condition_time_limit_overrides_default() {
        // condition limit 1 s, processor finishes after 300 ms: with the
        // 200 ms config default this would have been cancelled
        let observed_cancel = Arc::new(AtomicBool::new(false));
        let registry = registry_with(Arc::new(Cooperative {
            total: Duration::from_millis(300),
            observed_cancel,
        }));
        let mut body = request_body(&[1]);
        body.conditions[0].time_limit = 1;

        let response = process_body(&registry, body, &test_config());
        assert_eq!(response.results[0].result, "1.00");
    }

    #[test]
    fn test_out_of_range_score_is_forced_to_zero() {
        let registry = registry_with(Arc::new(FixedScore(1.5)));
        let response = process_body(&registry, request_body(&[1]), &test_config());
        let result = &response.results[0];
        assert_eq!(result.result, "0.00");
        // the processor's own comment is replaced by the diagnostic
        assert!(result.comment.as_deref().unwrap().contains("out of [0;1]"));
    }

    #[test]
    fn test_score_renders_two_decimals_half_up() {
        assert_eq!(format_score(0.0), "0.00");
        assert_eq!(format_score(1.0), "1.00");
        assert_eq!(format_score(0.5), "0.50");
        assert_eq!(format_score(0.875), "0.88");
    }

    struct CountingPre;

    impl PreCheckProcessor for CountingPre {
        fn pre_check(
            &self,
            conditions: &[Condition],
            _instructions: &str,
            _pre_generated: Option<&GeneratingResult>,
        ) -> Result<PreCheckValue, ProcessorError> {
            Ok(Arc::new(conditions.len()))
        }
    }

    /// Scores 1.0 only when the PreCheck value is visible.
    struct NeedsPre;

    impl CheckProcessor for NeedsPre {
        fn check_unit(
            &self,
            _condition: &Condition,
            _instructions: &str,
            _pre_generated: Option<&GeneratingResult>,
            pre_check: Option<&PreCheckValue>,
            _cancel: &CancelToken,
        ) -> Result<UnitOutcome, ProcessorError> {
            let seen = pre_check
                .and_then(|value| value.downcast_ref::<usize>())
                .copied();
            match seen {
                Some(count) => Ok(UnitOutcome::new(1.0, format!("saw {count} conditions"))),
                None => Ok(UnitOutcome::new(0.0, "no pre-check value")),
            }
        }
    }

    #[test]
    fn test_pre_check_value_reaches_units() {
        let mut registry = registry_with(Arc::new(NeedsPre));
        registry.register_pre_check(ProcessorFactory::Singleton(Arc::new(CountingPre)));
        let response = process_body(&registry, request_body(&[1, 2]), &test_config());
        assert!(response
            .results
            .iter()
            .all(|result| result.result == "1.00"));
        assert_eq!(
            response.results[0].comment.as_deref(),
            Some("saw 2 conditions")
        );
    }

    struct FailingPre;

    impl PreCheckProcessor for FailingPre {
        fn pre_check(
            &self,
            _conditions: &[Condition],
            _instructions: &str,
            _pre_generated: Option<&GeneratingResult>,
        ) -> Result<PreCheckValue, ProcessorError> {
            Err("no resources".into())
        }
    }

    #[test]
    fn test_failing_pre_check_is_ignored() {
        let mut registry = registry_with(Arc::new(NeedsPre));
        registry.register_pre_check(ProcessorFactory::Singleton(Arc::new(FailingPre)));
        let response = process_body(&registry, request_body(&[1]), &test_config());
        // units still ran, just without the pre-check value
        assert_eq!(response.results[0].result, "0.00");
        assert_eq!(
            response.results[0].comment.as_deref(),
            Some("no pre-check value")
        );
    }

    /// Rewrites every result to the given score string.
    struct Rewriter {
        score: &'static str,
        time: u64,
    }

    impl PostCheckProcessor for Rewriter {
        fn post_check(
            &self,
            _pre_check: Option<&PreCheckValue>,
            results: &mut Vec<CheckingResult>,
            _checkers: &[Arc<dyn CheckProcessor>],
        ) -> Result<(), ProcessorError> {
            for result in results {
                result.result = self.score.to_string();
                result.time = self.time;
                result.comment = Some("rewritten".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn test_overridden_results_accepted_only_per_reference_predicate() {
        // an out-of-range score with positive time and a comment is exactly
        // what the reference predicate accepts
        let mut registry = registry_with(Arc::new(FixedScore(1.0)));
        registry.register_post_check(ProcessorFactory::Singleton(Arc::new(Rewriter {
            score: "2.00",
            time: 5,
        })));
        let response = process_body(&registry, request_body(&[1, 2]), &test_config());
        assert!(response.results.iter().all(|r| r.result == "2.00"));

        // all-in-range rewrites fail the predicate and are discarded
        let mut registry = registry_with(Arc::new(FixedScore(1.0)));
        registry.register_post_check(ProcessorFactory::Singleton(Arc::new(Rewriter {
            score: "0.25",
            time: 5,
        })));
        let response = process_body(&registry, request_body(&[1, 2]), &test_config());
        assert!(response.results.iter().all(|r| r.result == "1.00"));
    }

    struct DroppingPost;

    impl PostCheckProcessor for DroppingPost {
        fn post_check(
            &self,
            _pre_check: Option<&PreCheckValue>,
            results: &mut Vec<CheckingResult>,
            _checkers: &[Arc<dyn CheckProcessor>],
        ) -> Result<(), ProcessorError> {
            results.pop();
            for result in results {
                result.result = "2.00".to_string();
                result.time = 5;
                result.comment = Some("rewritten".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn test_override_with_missing_result_is_discarded() {
        let mut registry = registry_with(Arc::new(FixedScore(1.0)));
        registry.register_post_check(ProcessorFactory::Singleton(Arc::new(DroppingPost)));
        let response = process_body(&registry, request_body(&[1, 2]), &test_config());
        assert_eq!(response.results.len(), 2);
        assert!(response.results.iter().all(|r| r.result == "1.00"));
    }

    struct FailingPost;

    impl PostCheckProcessor for FailingPost {
        fn post_check(
            &self,
            _pre_check: Option<&PreCheckValue>,
            results: &mut Vec<CheckingResult>,
            _checkers: &[Arc<dyn CheckProcessor>],
        ) -> Result<(), ProcessorError> {
            for result in results {
                result.result = "2.00".to_string();
            }
            Err("post-check broke".into())
        }
    }

    #[test]
    fn test_failing_post_check_keeps_original_results() {
        let mut registry = registry_with(Arc::new(FixedScore(1.0)));
        registry.register_post_check(ProcessorFactory::Singleton(Arc::new(FailingPost)));
        let response = process_body(&registry, request_body(&[1]), &test_config());
        assert_eq!(response.results[0].result, "1.00");
    }

    #[test]
    fn test_override_with_unparsable_score_is_discarded() {
        let mut registry = registry_with(Arc::new(FixedScore(1.0)));
        registry.register_post_check(ProcessorFactory::Singleton(Arc::new(Rewriter {
            score: "not-a-number",
            time: 5,
        })));
        let response = process_body(&registry, request_body(&[1]), &test_config());
        assert_eq!(response.results[0].result, "1.00");
    }

    #[test]
    fn test_accepted_override_is_reordered_to_condition_order() {
        struct ReversingPost;

        impl PostCheckProcessor for ReversingPost {
            fn post_check(
                &self,
                _pre_check: Option<&PreCheckValue>,
                results: &mut Vec<CheckingResult>,
                _checkers: &[Arc<dyn CheckProcessor>],
            ) -> Result<(), ProcessorError> {
                results.reverse();
                for result in results {
                    result.result = "2.00".to_string();
                    result.time = 5;
                    result.comment = Some("rewritten".to_string());
                }
                Ok(())
            }
        }

        let mut registry = registry_with(Arc::new(FixedScore(1.0)));
        registry.register_post_check(ProcessorFactory::Singleton(Arc::new(ReversingPost)));
        let response = process_body(&registry, request_body(&[4, 9, 2]), &test_config());
        let ids: Vec<i32> = response.results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 9, 2]);
    }
}
