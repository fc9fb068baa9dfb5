//! Convergence loop collapsing many partial answers into one.
//!
//! A reduce step does not know how many partial results its sources hold,
//! nor how aggressively the model merges them per call. The loop keeps
//! re-reducing the previous round's output until few enough results
//! remain, then crowns one via the result-key heuristic.

use tracing::{debug, warn};

use crate::collector::ResultCollector;
use crate::error::Result;
use crate::event::ResultEvent;
use crate::invoke::LlmInvoker;
use crate::picker::ResultPicker;
use crate::request::{ChatRequest, DataSource};
use crate::sink::EventSink;
use crate::workflow::{executor, Step};

/// Sentinel input name under which a round re-feeds its own output.
pub const LAST_RESULT: &str = "__lastResult";

/// A round leaving more than this many results triggers another round.
// TODO: confirm with product whether two is the right convergence cutoff.
pub const MAX_CONVERGED_RESULTS: usize = 2;

/// Run reduction rounds until convergence, then emit the surviving result
/// to `sink` and end it.
///
/// Each round invokes the model against a private collector. Rounds after
/// the first replace the step's inputs with the single [`LAST_RESULT`]
/// source carrying the previous round's entire collected mapping.
/// Invocation failure aborts immediately; an empty final round ends the
/// stream with no result.
pub(crate) async fn converge(
    step: &Step,
    mut sources: Vec<DataSource>,
    history: &ChatRequest,
    invoker: &dyn LlmInvoker,
    picker: &dyn ResultPicker,
    sink: &dyn EventSink,
) -> Result<()> {
    let mut step = step.clone();
    loop {
        let collector = ResultCollector::new();
        let request = executor::build_request(history, step.op.instruction(), sources);
        invoker.invoke(&request, &collector).await?;

        let mut collected = collector.into_results();
        let total = collected.len();
        if total > MAX_CONVERGED_RESULTS {
            debug!(total, "reduction not yet conclusive; scheduling another round");
            step = step.with_input(vec![LAST_RESULT.to_string()]);
            sources = vec![DataSource::internal(
                LAST_RESULT,
                serde_json::to_value(&collected)?,
            )];
            continue;
        }

        debug!(total, "reduction converged");
        match picker.pick(&collected) {
            Some(key) => {
                if let Some(value) = collected.swap_remove(&key) {
                    sink.write_result(ResultEvent::new(key, value)).await?;
                }
            }
            None => warn!(output_to = %step.output_to, "reduction produced no results"),
        }
        return sink.end().await;
    }
}
