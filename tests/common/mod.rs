//! Compiled-in plugins that record every hook the manager calls

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use pim::plugins::{ModuleLoader, StaticModuleLoader};
use pim::{Dependency, Extension, ExtensionHandle, InterfaceId, Plugin, PluginManagerBuilder};

/// Ordered record of hook calls, shared by all plugins of one test
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}

pub struct ConsoleLogger;

impl Extension for ConsoleLogger {
    fn id(&self) -> InterfaceId {
        InterfaceId::new("Logger")
    }
}

/// Configurable plugin that journals its hooks as `hook:name`
pub struct Recorder {
    pub name: &'static str,
    pub journal: Journal,
    pub provides: Vec<Arc<dyn Extension>>,
    pub needs: Vec<Dependency>,
    pub connected: Vec<ExtensionHandle>,
    pub fail_initialize: bool,
    pub sink: Option<Arc<Mutex<Vec<ExtensionHandle>>>>,
}

impl Recorder {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            provides: Vec::new(),
            needs: Vec::new(),
            connected: Vec::new(),
            fail_initialize: false,
            sink: None,
        }
    }

    pub fn providing(mut self, extension: Arc<dyn Extension>) -> Self {
        self.provides.push(extension);
        self
    }

    pub fn needing(mut self, dependency: Dependency) -> Self {
        self.needs.push(dependency);
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Also copy every connected handle into `sink`
    pub fn sharing_connections(mut self, sink: Arc<Mutex<Vec<ExtensionHandle>>>) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl Plugin for Recorder {
    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        self.provides.clone()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.needs.clone()
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        self.journal.record(format!("initialize:{}", self.name));
        if self.fail_initialize {
            anyhow::bail!("{} refused to start", self.name);
        }
        Ok(())
    }

    fn connect_extension(&mut self, extension: ExtensionHandle) -> anyhow::Result<()> {
        self.journal.record(format!("connect:{}", self.name));
        if let Some(sink) = &self.sink {
            sink.lock().push(extension.clone());
        }
        self.connected.push(extension);
        Ok(())
    }

    fn post_dependency_init(&mut self) -> anyhow::Result<()> {
        self.journal.record(format!("post:{}", self.name));
        Ok(())
    }
}

/// Virtual path of a compiled-in test module
pub fn module_path(file: &str) -> PathBuf {
    Path::new("/pim-test/modules").join(file)
}

pub fn builder(loader: &Arc<StaticModuleLoader>) -> PluginManagerBuilder {
    let loader: Arc<dyn ModuleLoader> = loader.clone();
    PluginManagerBuilder::default().with_module_loader(loader)
}

/// Write a YAML configuration file into `dir`
pub fn write_config(
    dir: &Path,
    file: &str,
    include: &[&Path],
    plugins: &[&str],
    skip: &[&str],
) -> String {
    let config = pim::config::PluginConfiguration {
        include: include.iter().map(|p| p.display().to_string()).collect(),
        plugins: plugins
            .iter()
            .map(|p| module_path(p).display().to_string())
            .collect(),
        skip: skip
            .iter()
            .map(|p| module_path(p).display().to_string())
            .collect(),
    };
    let path = dir.join(file);
    config.save_to_file(&path).unwrap();
    path.display().to_string()
}
