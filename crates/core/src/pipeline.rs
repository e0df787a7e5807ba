//! Pipeline: one batch run over the three ordered stages.
//!
//! Construction resolves every component factory and validates every
//! component configuration, so registry and config errors surface before
//! any child process is spawned. The pipeline instance is reused across
//! scheduled runs; each run spawns fresh children.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::component::{Bundle, ComponentKind};
use crate::definition::PipelineDefinition;
use crate::host::{Host, WorkerLauncher};
use crate::journal::Journal;
use crate::proctitle;
use crate::registry::Registry;
use crate::stage::{run_stage, StageSpec};
use crate::Result;

/// Pipeline construction options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Label used for process titles and the journal directory
    pub app_label: String,

    /// Serialize the journal to a file at the end of each run
    pub save_journal: bool,

    /// Fixed journal path; a fresh temp-dir file per run when absent
    pub journal_path: Option<PathBuf>,

    /// Worker spawn command; the current executable when absent
    pub launcher: Option<WorkerLauncher>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            app_label: "tributary".to_string(),
            save_journal: true,
            journal_path: None,
            launcher: None,
        }
    }
}

/// A built pipeline, ready to run
pub struct Pipeline {
    name: String,
    app_label: String,
    save_journal: bool,
    journal_path: Option<PathBuf>,
    sources: Vec<Host>,
    aggregators: Vec<Host>,
    sinks: Vec<Host>,
    bundle: Bundle,
    executed: u64,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("app_label", &self.app_label)
            .field("save_journal", &self.save_journal)
            .field("journal_path", &self.journal_path)
            .field("sources", &self.sources.len())
            .field("aggregators", &self.aggregators.len())
            .field("sinks", &self.sinks.len())
            .field("executed", &self.executed)
            .finish()
    }
}

impl Pipeline {
    /// Build a pipeline from a validated definition.
    ///
    /// Fails with registry or configuration errors; no process is spawned
    /// here.
    pub fn new(
        definition: &PipelineDefinition,
        name: impl Into<String>,
        registry: &Registry,
        options: PipelineOptions,
    ) -> Result<Self> {
        definition.validate()?;
        let launcher = match options.launcher {
            Some(launcher) => launcher,
            None => WorkerLauncher::current_exe()?,
        };

        tracing::info!("Building pipeline ...");
        let sources = Self::build_stage(
            ComponentKind::Source,
            &definition.sources,
            registry,
            &launcher,
        )?;
        let aggregators = Self::build_stage(
            ComponentKind::Aggregator,
            &definition.aggregators,
            registry,
            &launcher,
        )?;
        let sinks = Self::build_stage(ComponentKind::Sink, &definition.sinks, registry, &launcher)?;

        Ok(Self {
            name: name.into(),
            app_label: options.app_label,
            save_journal: options.save_journal,
            journal_path: options.journal_path,
            sources,
            aggregators,
            sinks,
            bundle: Bundle::new(),
            executed: 0,
        })
    }

    fn build_stage(
        kind: ComponentKind,
        descriptors: &[crate::definition::ComponentDescriptor],
        registry: &Registry,
        launcher: &WorkerLauncher,
    ) -> Result<Vec<Host>> {
        let hosts = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| Host::build(kind, index, descriptor, registry, launcher))
            .collect::<Result<Vec<Host>>>()?;
        tracing::debug!("Pipeline {} created: {}", kind.plural(), hosts.len());
        Ok(hosts)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of completed `run` calls, successful or not
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Run the three stages in order and return the journal of the run.
    ///
    /// A non-optional component failure aborts the run after every child of
    /// the failing stage has been stopped. The journal file records every
    /// attempted component either way, so aborted runs stay diagnosable.
    pub async fn run(&mut self) -> Result<Journal> {
        if self.executed > 0 {
            self.bundle.clear();
        }
        self.executed += 1;

        let mut journal = Journal::new();
        tracing::info!("Running pipeline {} ...", self.name);

        let result = self.run_stages(&mut journal).await;

        if self.save_journal {
            proctitle::set_title(&format!("{} - saving journal", self.app_label));
            tracing::info!("Saving journal ...");
            let saved = match &self.journal_path {
                Some(path) => journal.save_to(path),
                None => journal.save(&self.app_label),
            };
            match (saved, &result) {
                (Ok(path), _) => tracing::info!("Journal saved to {}", path.display()),
                // The run error stays the primary failure
                (Err(err), Err(_)) => tracing::warn!("Could not save journal: {}", err),
                (Err(err), Ok(())) => return Err(err),
            }
        }

        result.map(|()| journal)
    }

    async fn run_stages(&mut self, journal: &mut Journal) -> Result<()> {
        proctitle::set_title(&format!("{} - running sources", self.app_label));
        tracing::info!("Running sources ...");
        let mut collected: HashMap<String, Value> = HashMap::new();
        run_stage(
            ComponentKind::Source,
            true,
            &mut self.sources,
            &SourcesSpec,
            &mut collected,
            journal.stage_mut(ComponentKind::Source),
        )
        .await?;

        // Re-emit in declared source order: the join schedule is timeout
        // sorted, downstream consumers see declaration order.
        self.bundle = Bundle::new();
        for host in &self.sources {
            if let Some(value) = collected.remove(host.id()) {
                self.bundle.insert(host.id().to_string(), value);
            }
        }

        if !self.aggregators.is_empty() {
            proctitle::set_title(&format!("{} - running aggregators", self.app_label));
            tracing::info!("Running aggregators ...");
            let mut bundle = std::mem::take(&mut self.bundle);
            run_stage(
                ComponentKind::Aggregator,
                false,
                &mut self.aggregators,
                &AggregatorsSpec,
                &mut bundle,
                journal.stage_mut(ComponentKind::Aggregator),
            )
            .await?;
            self.bundle = bundle;
        }

        proctitle::set_title(&format!("{} - running sinks", self.app_label));
        tracing::info!("Running sinks ...");
        let sinks_spec = SinksSpec {
            bundle: Value::Object(self.bundle.clone()),
        };
        run_stage(
            ComponentKind::Sink,
            true,
            &mut self.sinks,
            &sinks_spec,
            &mut (),
            journal.stage_mut(ComponentKind::Sink),
        )
        .await?;

        Ok(())
    }
}

/// Sources take no input; results accumulate as `id -> data`
struct SourcesSpec;

impl StageSpec for SourcesSpec {
    type Acc = HashMap<String, Value>;

    fn input(&self, _acc: &Self::Acc, _host: &Host) -> Option<Value> {
        None
    }

    fn fold(&self, acc: &mut Self::Acc, host: &Host, data: Value) {
        acc.insert(host.id().to_string(), data);
    }
}

/// Aggregators receive the current bundle and replace it with their output
struct AggregatorsSpec;

impl StageSpec for AggregatorsSpec {
    type Acc = Bundle;

    fn input(&self, acc: &Self::Acc, _host: &Host) -> Option<Value> {
        Some(Value::Object(acc.clone()))
    }

    fn fold(&self, acc: &mut Self::Acc, _host: &Host, data: Value) {
        if let Value::Object(bundle) = data {
            *acc = bundle;
        }
    }
}

/// Sinks receive a copy of the final bundle; results are discarded
struct SinksSpec {
    bundle: Value,
}

impl StageSpec for SinksSpec {
    type Acc = ();

    fn input(&self, _acc: &Self::Acc, _host: &Host) -> Option<Value> {
        Some(self.bundle.clone())
    }

    fn fold(&self, _acc: &mut Self::Acc, _host: &Host, _data: Value) {}
}
