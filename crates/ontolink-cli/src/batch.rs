//! Annotate several independent texts concurrently, keeping input order.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use ontolink_ai::{AnnotateError, Annotated, Orchestrator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStats {
    pub texts: usize,
    pub spans: usize,
    pub resolved: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
}

/// Run one invocation per text with at most `jobs` in flight.
///
/// Results come back in the order of `texts`. Each invocation has its own
/// turn budget; one failing does not affect the others.
pub async fn annotate_all(
    orchestrator: &Orchestrator,
    texts: &[String],
    jobs: usize,
) -> (Vec<Result<Annotated, AnnotateError>>, BatchStats) {
    let start = Instant::now();

    let results: Vec<_> = stream::iter(texts.iter().map(|text| orchestrator.annotate(text)))
        .buffered(jobs.max(1))
        .collect()
        .await;

    let mut stats = BatchStats {
        texts: texts.len(),
        spans: 0,
        resolved: 0,
        failed: 0,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    for result in &results {
        match result {
            Ok(annotated) => {
                stats.spans += annotated.result.len();
                stats.resolved += annotated.result.resolved_count();
            }
            Err(_) => stats.failed += 1,
        }
    }
    (results, stats)
}
