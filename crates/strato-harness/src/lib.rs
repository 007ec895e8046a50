//! Shared fixtures for the end-to-end tests.
//!
//! The [`test_registry`] function set is served both in-process (shared
//! mode) and by the `strato-test-worker` binary (isolated mode), so the
//! same scenarios run against either backend.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strato_local::FunctionRegistry;

/// Execution window of one call, in milliseconds since the Unix epoch,
/// measured inside the function itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timing {
    pub start: u64,
    pub end: u64,
}

/// Maximum number of windows that were ever simultaneously open.
///
/// Windows that merely touch (one ends exactly where another starts) do not
/// count as overlapping.
#[must_use]
pub fn measure_concurrency(timings: &[Timing]) -> usize {
    let mut events: Vec<(u64, i32)> = Vec::with_capacity(timings.len() * 2);
    for t in timings {
        events.push((t.start, 1));
        events.push((t.end, -1));
    }
    // Close before open at equal timestamps.
    events.sort_unstable();

    let mut open = 0_i32;
    let mut peak = 0_i32;
    for (_, delta) in events {
        open += delta;
        peak = peak.max(open);
    }
    peak.max(0) as usize
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Builds the registry of functions the tests exercise.
#[must_use]
pub fn test_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();

    registry.register_fn("hello", |(name,): (String,)| Ok(format!("hello {name}")));

    registry.register_fn("echo", |(value,): (serde_json::Value,)| Ok(value));

    registry.register("sleep", |(ms,): (u64,)| async move {
        let start = now_ms();
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(Timing {
            start,
            end: now_ms(),
        })
    });

    // Synchronous busy wait: never yields, so in shared mode these windows
    // cannot overlap.
    registry.register_fn("spin", |(ms,): (u64,)| {
        let start = now_ms();
        let until = Instant::now() + Duration::from_millis(ms);
        while Instant::now() < until {
            std::hint::spin_loop();
        }
        Ok(Timing {
            start,
            end: now_ms(),
        })
    });

    registry.register_fn("fail", |(msg,): (String,)| -> Result<(), String> { Err(msg) });

    // Diagnostic output lands on stderr, which isolated workers have
    // redirected into their slot log.
    registry.register_fn("log_line", |(text,): (String,)| {
        eprintln!("{text}");
        Ok(())
    });

    registry.register_fn("process_exit", |(): ()| -> Result<(), String> {
        std::process::exit(1)
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_windows_do_not_overlap() {
        let timings = [
            Timing { start: 0, end: 10 },
            Timing { start: 10, end: 20 },
            Timing { start: 25, end: 30 },
        ];
        assert_eq!(measure_concurrency(&timings), 1);
    }

    #[test]
    fn nested_windows_all_overlap() {
        let timings = [
            Timing { start: 0, end: 100 },
            Timing { start: 10, end: 90 },
            Timing { start: 20, end: 80 },
        ];
        assert_eq!(measure_concurrency(&timings), 3);
    }

    #[test]
    fn staggered_windows_overlap_pairwise() {
        let timings = [
            Timing { start: 0, end: 30 },
            Timing { start: 20, end: 50 },
            Timing { start: 40, end: 70 },
        ];
        assert_eq!(measure_concurrency(&timings), 2);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(measure_concurrency(&[]), 0);
    }

    #[tokio::test]
    async fn registry_serves_the_test_functions() {
        let registry = test_registry();
        let call = strato_proto::FunctionCall::new("hello", vec![serde_json::json!("world")]);
        let result = registry.invoke(&call).await.unwrap();
        assert_eq!(result, serde_json::json!("hello world"));
    }
}
