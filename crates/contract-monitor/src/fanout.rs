//! Deadline-bounded concurrent fan-out shared by the verification and
//! compatibility runners.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{MonitorError, MonitorResult};

/// Result of one fanned-out task.
#[derive(Debug)]
pub(crate) enum TaskOutcome<T> {
    Completed { value: T, elapsed: Duration },
    Failed { error: MonitorError, elapsed: Duration },
    /// Did not finish within `limit`: its own limit, or the global deadline.
    TimedOut { limit: Duration },
}

/// Make task names unique by suffixing repeats with `#2`, `#3`, ...
pub(crate) fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::new();
    for name in names {
        let count = seen.entry(name).or_insert(0);
        *count += 1;
        let mut n = *count;
        let mut candidate = if n == 1 {
            name.to_string()
        } else {
            format!("{name}#{n}")
        };
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{name}#{n}");
        }
        if candidate != name {
            warn!(name = %name, renamed = %candidate, "duplicate task name");
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Run every task concurrently.
///
/// Each task is bounded by `per_task`; the whole join is bounded by
/// `deadline`, after which unfinished tasks are aborted. Outcomes come back
/// in input order, exactly one per task, whether or not names repeat.
pub(crate) async fn fan_out<T, Fut>(
    tasks: Vec<(String, Fut)>,
    per_task: Duration,
    deadline: Duration,
) -> Vec<(String, TaskOutcome<T>)>
where
    T: Send + 'static,
    Fut: Future<Output = MonitorResult<T>> + Send + 'static,
{
    let names: Vec<String> = tasks.iter().map(|(name, _)| name.clone()).collect();
    let mut set = JoinSet::new();
    for (index, (_, fut)) in tasks.into_iter().enumerate() {
        set.spawn(async move {
            let start = Instant::now();
            let result = tokio::time::timeout(per_task, fut).await;
            let elapsed = start.elapsed();
            let outcome = match result {
                Ok(Ok(value)) => TaskOutcome::Completed { value, elapsed },
                Ok(Err(error)) => TaskOutcome::Failed { error, elapsed },
                Err(_) => TaskOutcome::TimedOut { limit: per_task },
            };
            (index, outcome)
        });
    }

    let deadline_at = Instant::now() + deadline;
    let mut finished: Vec<Option<TaskOutcome<T>>> = names.iter().map(|_| None).collect();
    let mut deadline_hit = false;
    loop {
        match tokio::time::timeout_at(deadline_at, set.join_next()).await {
            Ok(Some(Ok((index, outcome)))) => {
                finished[index] = Some(outcome);
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "fan-out task did not run to completion");
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    unfinished = set.len(),
                    "global deadline reached, abandoning unfinished tasks"
                );
                set.abort_all();
                deadline_hit = true;
                break;
            }
        }
    }

    names
        .into_iter()
        .zip(finished)
        .map(|(name, outcome)| {
            let outcome = outcome.unwrap_or_else(|| {
                if deadline_hit {
                    TaskOutcome::TimedOut { limit: deadline }
                } else {
                    TaskOutcome::Failed {
                        error: MonitorError::Collection(format!("task for {name} aborted")),
                        elapsed: Duration::ZERO,
                    }
                }
            });
            (name, outcome)
        })
        .collect()
}
