use std::sync::Arc;

use pim::{Extension, Plugin};
use pim_demo_interfaces::LineLogger;

/// Provides one `Logger` extension
pub struct LoggerPlugin {
    logger: Arc<LineLogger>,
}

impl LoggerPlugin {
    fn new() -> Self {
        Self {
            logger: Arc::new(LineLogger::new("demo")),
        }
    }
}

impl Plugin for LoggerPlugin {
    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        let logger: Arc<dyn Extension> = self.logger.clone();
        vec![logger]
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        self.logger.log("logger plugin initialized");
        Ok(())
    }
}

pim::declare_plugin!(LoggerPlugin, LoggerPlugin::new);
