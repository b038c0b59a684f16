use anyhow::Context;
use pim::{Dependency, ExtensionHandle, Plugin};
use pim_demo_interfaces::{LineLogger, LOGGER};

/// Needs exactly one `Logger` and greets through it once everything is wired
#[derive(Default)]
pub struct GreeterPlugin {
    logger: Option<ExtensionHandle>,
}

impl GreeterPlugin {
    fn new() -> Self {
        Self::default()
    }
}

impl Plugin for GreeterPlugin {
    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::exactly(LOGGER, 1)]
    }

    fn connect_extension(&mut self, extension: ExtensionHandle) -> anyhow::Result<()> {
        self.logger = Some(extension);
        Ok(())
    }

    fn post_dependency_init(&mut self) -> anyhow::Result<()> {
        let logger = self
            .logger
            .as_ref()
            .and_then(|handle| handle.downcast_ref::<LineLogger>())
            .context("Logger extension is not a LineLogger")?;
        logger.log("Hello from the greeter plugin");
        Ok(())
    }
}

pim::declare_plugin!(GreeterPlugin, GreeterPlugin::new);
