//! Stage executor: runs the hosts of one stage under a parallelism policy.
//!
//! Parallel stages (sources, sinks) start every host up front and then join
//! them shortest-timeout first, so the earliest possible deadline is always
//! the one being waited on. Sequential stages (aggregators) start each host
//! only after the previous one joined and never reorder.
//!
//! A failing optional component is downgraded to a warning; a failing
//! non-optional component aborts the stage, force-stopping every other host
//! in the schedule so no child is left blocked on its result channel.

use serde_json::Value;

use crate::component::ComponentKind;
use crate::host::{timeout_sort_key, Host};
use crate::journal::JournalEntry;
use crate::{Error, Result};

/// Per-stage wiring: how hosts receive input from and fold results into the
/// stage accumulator.
pub trait StageSpec {
    /// Accumulator threaded through the stage
    type Acc;

    /// Assemble the input of one host from the current accumulator
    fn input(&self, acc: &Self::Acc, host: &Host) -> Option<Value>;

    /// Fold one successful result into the accumulator
    fn fold(&self, acc: &mut Self::Acc, host: &Host, data: Value);
}

/// Run one stage over `hosts`, appending a journal entry per attempt.
pub async fn run_stage<S: StageSpec>(
    kind: ComponentKind,
    parallel: bool,
    hosts: &mut [Host],
    spec: &S,
    acc: &mut S::Acc,
    journal: &mut Vec<JournalEntry>,
) -> Result<()> {
    if hosts.is_empty() {
        return Ok(());
    }

    let mut schedule: Vec<usize> = (0..hosts.len()).collect();

    if parallel {
        for index in 0..hosts.len() {
            let input = spec.input(acc, &hosts[index]);
            if let Err(err) = hosts[index].start(input).await {
                tracing::error!("Could not start {}: {}", hosts[index].context(), err);
                stop_all(hosts, &schedule).await;
                return Err(Error::StageAborted {
                    stage: kind,
                    cause: Box::new(err),
                });
            }
        }
        schedule.sort_by_key(|&index| timeout_sort_key(hosts[index].timeout()));
    }

    for position in 0..schedule.len() {
        let index = schedule[position];

        if !parallel {
            let input = spec.input(acc, &hosts[index]);
            if let Err(err) = hosts[index].start(input).await {
                tracing::error!("Could not start {}: {}", hosts[index].context(), err);
                stop_all(hosts, &schedule).await;
                return Err(Error::StageAborted {
                    stage: kind,
                    cause: Box::new(err),
                });
            }
        }

        match hosts[index].join().await {
            Ok(info) => {
                journal.push(JournalEntry::from_execution(
                    hosts[index].context().index,
                    hosts[index].id(),
                    kind,
                    &info,
                ));
                tracing::info!("{} finished successfully: {}", hosts[index].context(), info);
                let data = info.data.unwrap_or(Value::Null);
                spec.fold(acc, &hosts[index], data);
            }
            Err(err) => {
                let info = match &err {
                    Error::Crash(info) | Error::TimeExceeded(info) => Some(info.clone()),
                    _ => None,
                };
                if let Some(info) = &info {
                    journal.push(JournalEntry::from_execution(
                        hosts[index].context().index,
                        hosts[index].id(),
                        kind,
                        info,
                    ));
                }

                if hosts[index].context().optional && info.is_some() {
                    tracing::warn!(
                        "Optional {} {} failed: {}",
                        kind,
                        hosts[index].context(),
                        err
                    );
                    continue;
                }

                tracing::error!("{} {} failed: {}", kind, hosts[index].context(), err);
                stop_all(hosts, &schedule).await;
                return Err(Error::StageAborted {
                    stage: kind,
                    cause: Box::new(err),
                });
            }
        }
    }

    Ok(())
}

/// Force-stop every host in the schedule, swallowing secondary errors, so
/// no orphan child stays blocked writing to its result channel.
async fn stop_all(hosts: &mut [Host], schedule: &[usize]) {
    for &index in schedule {
        hosts[index].stop().await;
    }
}
