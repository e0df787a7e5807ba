//! Print sink: pretty-prints the collected data to stdout.
//!
//! Inherits the filter-sink options; see the module documentation of
//! [`crate::sinks`].

use async_trait::async_trait;
use serde_json::Value;
use tributary_core::builtin_sink;
use tributary_core::component::{Bundle, Component, ComponentContext, Sink};
use tributary_core::config::Configurator;
use tributary_core::Result;

use super::{apply_filters, declare_filter_options};

#[derive(Debug, Default)]
pub struct PrintSink;

impl Component for PrintSink {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        declare_filter_options(config)
    }
}

#[async_trait]
impl Sink for PrintSink {
    async fn distribute(&self, ctx: &ComponentContext, data: &Bundle) -> Result<()> {
        let filtered = apply_filters(ctx, data)?;
        println!("{}", serde_json::to_string_pretty(&Value::Object(filtered))?);
        Ok(())
    }
}

builtin_sink!("print", PrintSink);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use tributary_core::component::ComponentKind;

    #[tokio::test]
    async fn test_distributes_without_error() {
        let ctx = ComponentContext::for_component(
            &PrintSink,
            ComponentKind::Sink,
            "print",
            "show",
            0,
            false,
            None,
            &Map::new(),
        )
        .unwrap();

        let bundle: Bundle = json!({"ts": {"epoch": 1}}).as_object().cloned().unwrap();
        PrintSink.distribute(&ctx, &bundle).await.unwrap();
    }
}
