//! Named component registries and the compiled-in factory table.
//!
//! Components are never imported dynamically. A pipeline document names a
//! `module` for every agent, plugin and tool; [`Factories`] maps that module
//! name to a constructor. Embedders add their own constructors with
//! [`Factories::register_agent`] and friends before loading a pipeline.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::agents::Agent;
use crate::agents::echo::EchoAgent;
use crate::agents::process::ProcessAgent;
use crate::commands::{Command, GenerateCommand, SaveToFileCommand};
use crate::error::{ComponentKind, ConfigError};
use crate::io::pipeline::{ComponentSpec, PipelineConfig, Source};
use crate::plugins::{FilePlugin, Plugin, TextGenerationPlugin, ToolExecutorPlugin};
use crate::tools::{EchoTool, TemplateTool, Tool};

/// Components of one kind, keyed by name.
pub struct Registry<T: ?Sized> {
    kind: ComponentKind,
    entries: BTreeMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, component: Arc<T>) -> Result<(), ConfigError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ConfigError::DuplicateComponent {
                kind: self.kind,
                name,
            });
        }
        debug!(kind = %self.kind, name = %name, "registered component");
        self.entries.insert(name, component);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    /// Like [`Registry::get`], but a missing name is a configuration error.
    pub fn require(&self, name: &str) -> Result<Arc<T>, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::MissingComponent {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<T>> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            info!(kind = %self.kind, name, "removed component");
        } else {
            warn!(kind = %self.kind, name, "attempted to remove unknown component");
        }
        removed
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<T>)> {
        self.entries.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

pub type AgentFactory = Box<dyn Fn(&ComponentSpec) -> Result<Arc<dyn Agent>> + Send + Sync>;
pub type PluginFactory = Box<dyn Fn(&ComponentSpec) -> Result<Arc<dyn Plugin>> + Send + Sync>;
pub type ToolFactory = Box<dyn Fn(&ComponentSpec) -> Result<Arc<dyn Tool>> + Send + Sync>;

/// Module name → constructor, per component kind.
pub struct Factories {
    agents: HashMap<String, AgentFactory>,
    plugins: HashMap<String, PluginFactory>,
    tools: HashMap<String, ToolFactory>,
}

impl Factories {
    /// No constructors at all.
    pub fn empty() -> Self {
        Self {
            agents: HashMap::new(),
            plugins: HashMap::new(),
            tools: HashMap::new(),
        }
    }

    /// Constructors for every component that ships with the crate.
    pub fn builtin() -> Self {
        let mut factories = Self::empty();
        factories.register_agent("echo", |spec| {
            Ok(Arc::new(EchoAgent::from_config(&spec.name, &spec.config)?))
        });
        factories.register_agent("process", |spec| {
            Ok(Arc::new(ProcessAgent::from_config(&spec.name, &spec.config)?))
        });
        factories.register_plugin("text_generation", |spec| {
            Ok(Arc::new(TextGenerationPlugin::new(spec.name.clone())))
        });
        factories.register_plugin("tool_executor", |spec| {
            Ok(Arc::new(ToolExecutorPlugin::new(spec.name.clone())))
        });
        factories.register_plugin("file", |spec| Ok(Arc::new(FilePlugin::new(spec.name.clone()))));
        factories.register_tool("echo", |spec| Ok(Arc::new(EchoTool::new(spec.name.clone()))));
        factories.register_tool("template", |spec| {
            Ok(Arc::new(TemplateTool::from_config(&spec.name, &spec.config)?))
        });
        factories
    }

    pub fn register_agent<F>(&mut self, module: &str, factory: F)
    where
        F: Fn(&ComponentSpec) -> Result<Arc<dyn Agent>> + Send + Sync + 'static,
    {
        self.agents.insert(module.to_string(), Box::new(factory));
    }

    pub fn register_plugin<F>(&mut self, module: &str, factory: F)
    where
        F: Fn(&ComponentSpec) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.plugins.insert(module.to_string(), Box::new(factory));
    }

    pub fn register_tool<F>(&mut self, module: &str, factory: F)
    where
        F: Fn(&ComponentSpec) -> Result<Arc<dyn Tool>> + Send + Sync + 'static,
    {
        self.tools.insert(module.to_string(), Box::new(factory));
    }
}

impl Default for Factories {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Every loaded component, shared read-only by the task runner and workers.
#[derive(Debug)]
pub struct Components {
    pub agents: Registry<dyn Agent>,
    pub plugins: Registry<dyn Plugin>,
    pub tools: Registry<dyn Tool>,
    pub commands: Registry<dyn Command>,
    default_agent: Option<String>,
}

impl Default for Components {
    fn default() -> Self {
        Self::new()
    }
}

impl Components {
    /// No agents, plugins or tools; the built-in commands only.
    pub fn new() -> Self {
        let mut commands: Registry<dyn Command> = Registry::new(ComponentKind::Command);
        for command in [
            Arc::new(GenerateCommand) as Arc<dyn Command>,
            Arc::new(SaveToFileCommand),
        ] {
            let name = command.name().to_string();
            // Built-in names are distinct.
            let _ = commands.insert(name, command);
        }
        Self {
            agents: Registry::new(ComponentKind::Agent),
            plugins: Registry::new(ComponentKind::Plugin),
            tools: Registry::new(ComponentKind::Tool),
            commands,
            default_agent: None,
        }
    }

    /// Instantiate every component a pipeline declares.
    ///
    /// The first declared agent becomes the default agent.
    pub fn from_pipeline(config: &PipelineConfig, factories: &Factories) -> Result<Self, ConfigError> {
        let mut components = Self::new();
        for spec in &config.agents {
            let agent = build(ComponentKind::Agent, spec, &factories.agents)?;
            components.agents.insert(spec.name.clone(), agent)?;
        }
        for spec in &config.plugins {
            let plugin = build(ComponentKind::Plugin, spec, &factories.plugins)?;
            components.plugins.insert(spec.name.clone(), plugin)?;
        }
        for spec in &config.tools {
            let tool = build(ComponentKind::Tool, spec, &factories.tools)?;
            components.tools.insert(spec.name.clone(), tool)?;
        }
        components.default_agent = config.agents.first().map(|spec| spec.name.clone());
        info!(
            agents = components.agents.len(),
            plugins = components.plugins.len(),
            tools = components.tools.len(),
            "loaded components"
        );
        Ok(components)
    }

    pub fn default_agent(&self) -> Option<&str> {
        self.default_agent.as_deref()
    }

    /// Override the default agent; the name must be registered.
    pub fn set_default_agent(&mut self, name: &str) -> Result<(), ConfigError> {
        self.agents.require(name)?;
        self.default_agent = Some(name.to_string());
        Ok(())
    }
}

fn build<T: ?Sized>(
    kind: ComponentKind,
    spec: &ComponentSpec,
    factories: &HashMap<String, Box<dyn Fn(&ComponentSpec) -> Result<Arc<T>> + Send + Sync>>,
) -> Result<Arc<T>, ConfigError> {
    if spec.source == Source::Github {
        return Err(ConfigError::RemoteSource {
            kind,
            name: spec.name.clone(),
        });
    }
    let factory = factories
        .get(&spec.module)
        .ok_or_else(|| ConfigError::UnknownModule {
            kind,
            name: spec.name.clone(),
            module: spec.module.clone(),
        })?;
    factory(spec).map_err(|err| ConfigError::InvalidComponent {
        kind,
        name: spec.name.clone(),
        reason: format!("{err:#}"),
    })
}
