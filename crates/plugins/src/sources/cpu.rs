//! CPU source: processor count and load percentages.
//!
//! Usage percentages need two samples a short interval apart, so this
//! source sleeps for `sysinfo`'s minimum update interval while collecting.

use async_trait::async_trait;
use serde_json::{json, Value};
use sysinfo::System;
use tributary_core::builtin_source;
use tributary_core::component::{Bundle, Component, ComponentContext, Source};
use tributary_core::Result;

#[derive(Debug, Default)]
pub struct CpuSource;

impl Component for CpuSource {}

#[async_trait]
impl Source for CpuSource {
    async fn collect(&self, _ctx: &ComponentContext) -> Result<Bundle> {
        let mut system = System::new();
        system.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu_usage();

        let per_cpu: Vec<Value> = system
            .cpus()
            .iter()
            .map(|cpu| json!(cpu.cpu_usage()))
            .collect();

        let mut entry = Bundle::new();
        entry.insert("num_cpus".to_string(), json!(num_cpus::get()));
        entry.insert(
            "system_load".to_string(),
            json!(system.global_cpu_info().cpu_usage()),
        );
        entry.insert("per_cpu".to_string(), Value::Array(per_cpu));
        Ok(entry)
    }
}

builtin_source!("cpu", CpuSource);
