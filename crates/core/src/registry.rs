//! Plugin registry: resolves `(kind, type name)` to a component factory.
//!
//! Two registration paths feed the registry:
//!
//! - **Built-in**: plugin crates submit a [`BuiltinComponent`] through
//!   `inventory` (see the `builtin_source!` family of macros);
//!   [`Registry::with_builtins`] enumerates the submissions at startup.
//!   A submission that fails to register is logged and skipped.
//! - **Local**: embedders call [`Registry::register_source`] and friends
//!   before building a pipeline. Local registrations take precedence over
//!   built-ins of the same name.
//!
//! The registry is populated before the first pipeline run and read-only
//! afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{Aggregator, ComponentKind, Sink, Source};
use crate::config::is_slug;
use crate::{Error, Result};

/// Factory producing a fresh source instance
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn Source> + Send + Sync>;
/// Factory producing a fresh aggregator instance
pub type AggregatorFactory = Arc<dyn Fn() -> Box<dyn Aggregator> + Send + Sync>;
/// Factory producing a fresh sink instance
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn Sink> + Send + Sync>;

/// Kind-tagged factory function of a built-in component
pub enum BuiltinFactory {
    Source(fn() -> Box<dyn Source>),
    Aggregator(fn() -> Box<dyn Aggregator>),
    Sink(fn() -> Box<dyn Sink>),
}

/// One built-in component registration, submitted via `inventory`
pub struct BuiltinComponent {
    pub name: &'static str,
    pub factory: BuiltinFactory,
}

impl BuiltinComponent {
    pub fn kind(&self) -> ComponentKind {
        match self.factory {
            BuiltinFactory::Source(_) => ComponentKind::Source,
            BuiltinFactory::Aggregator(_) => ComponentKind::Aggregator,
            BuiltinFactory::Sink(_) => ComponentKind::Sink,
        }
    }
}

inventory::collect!(BuiltinComponent);

/// Per-kind factory registries
#[derive(Default)]
pub struct Registry {
    sources: HashMap<String, SourceFactory>,
    aggregators: HashMap<String, AggregatorFactory>,
    sinks: HashMap<String, SinkFactory>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with every built-in component linked
    /// into the binary. Invalid submissions are logged and skipped; the
    /// first submission of a name wins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in inventory::iter::<BuiltinComponent> {
            if !is_slug(builtin.name) {
                tracing::error!(
                    "Ignoring built-in {} {:?}: name is not a valid slug",
                    builtin.kind(),
                    builtin.name
                );
                continue;
            }
            if registry.contains(builtin.kind(), builtin.name) {
                tracing::error!(
                    "Ignoring built-in {} {:?}: name already registered",
                    builtin.kind(),
                    builtin.name
                );
                continue;
            }
            match builtin.factory {
                BuiltinFactory::Source(factory) => {
                    registry.sources.insert(builtin.name.to_string(), Arc::new(factory));
                }
                BuiltinFactory::Aggregator(factory) => {
                    registry
                        .aggregators
                        .insert(builtin.name.to_string(), Arc::new(factory));
                }
                BuiltinFactory::Sink(factory) => {
                    registry.sinks.insert(builtin.name.to_string(), Arc::new(factory));
                }
            }
        }

        for kind in [
            ComponentKind::Source,
            ComponentKind::Aggregator,
            ComponentKind::Sink,
        ] {
            tracing::info!("{} available: {:?}", kind.plural(), registry.list(kind));
        }
        registry
    }

    /// Register a source factory, replacing any previous entry of this name
    pub fn register_source<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Source> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.sources.insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::info!("Source {:?} overridden by local registration", name);
        }
    }

    /// Register an aggregator factory, replacing any previous entry
    pub fn register_aggregator<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Aggregator> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .aggregators
            .insert(name.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::info!("Aggregator {:?} overridden by local registration", name);
        }
    }

    /// Register a sink factory, replacing any previous entry
    pub fn register_sink<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Sink> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.sinks.insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::info!("Sink {:?} overridden by local registration", name);
        }
    }

    /// Look up a source factory
    pub fn source(&self, name: &str) -> Result<SourceFactory> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownComponentType {
                kind: ComponentKind::Source,
                type_name: name.to_string(),
            })
    }

    /// Look up an aggregator factory
    pub fn aggregator(&self, name: &str) -> Result<AggregatorFactory> {
        self.aggregators
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownComponentType {
                kind: ComponentKind::Aggregator,
                type_name: name.to_string(),
            })
    }

    /// Look up a sink factory
    pub fn sink(&self, name: &str) -> Result<SinkFactory> {
        self.sinks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownComponentType {
                kind: ComponentKind::Sink,
                type_name: name.to_string(),
            })
    }

    /// Check whether a type name is registered under a kind
    pub fn contains(&self, kind: ComponentKind, name: &str) -> bool {
        match kind {
            ComponentKind::Source => self.sources.contains_key(name),
            ComponentKind::Aggregator => self.aggregators.contains_key(name),
            ComponentKind::Sink => self.sinks.contains_key(name),
        }
    }

    /// List the registered type names of a kind, sorted
    pub fn list(&self, kind: ComponentKind) -> Vec<String> {
        let mut names: Vec<String> = match kind {
            ComponentKind::Source => self.sources.keys().cloned().collect(),
            ComponentKind::Aggregator => self.aggregators.keys().cloned().collect(),
            ComponentKind::Sink => self.sinks.keys().cloned().collect(),
        };
        names.sort();
        names
    }
}

/// Register a built-in source type.
///
/// The component type must implement `Default` and `Source`:
///
/// ```ignore
/// builtin_source!("timestamp", TimestampSource);
/// ```
#[macro_export]
macro_rules! builtin_source {
    ($name:literal, $component:ty) => {
        const _: () = {
            fn factory() -> Box<dyn $crate::component::Source> {
                Box::new(<$component>::default())
            }
            $crate::inventory::submit! {
                $crate::registry::BuiltinComponent {
                    name: $name,
                    factory: $crate::registry::BuiltinFactory::Source(factory),
                }
            }
        };
    };
}

/// Register a built-in aggregator type. See [`builtin_source!`].
#[macro_export]
macro_rules! builtin_aggregator {
    ($name:literal, $component:ty) => {
        const _: () = {
            fn factory() -> Box<dyn $crate::component::Aggregator> {
                Box::new(<$component>::default())
            }
            $crate::inventory::submit! {
                $crate::registry::BuiltinComponent {
                    name: $name,
                    factory: $crate::registry::BuiltinFactory::Aggregator(factory),
                }
            }
        };
    };
}

/// Register a built-in sink type. See [`builtin_source!`].
#[macro_export]
macro_rules! builtin_sink {
    ($name:literal, $component:ty) => {
        const _: () = {
            fn factory() -> Box<dyn $crate::component::Sink> {
                Box::new(<$component>::default())
            }
            $crate::inventory::submit! {
                $crate::registry::BuiltinComponent {
                    name: $name,
                    factory: $crate::registry::BuiltinFactory::Sink(factory),
                }
            }
        };
    };
}
