//! Extension types shared by the demo plugins

use pim::{Extension, InterfaceId};

pub const LOGGER: &str = "Logger";

/// Writes prefixed lines to stdout
pub struct LineLogger {
    prefix: String,
}

impl LineLogger {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn log(&self, msg: &str) {
        println!("[{}] {}", self.prefix, msg);
    }
}

impl Extension for LineLogger {
    fn id(&self) -> InterfaceId {
        InterfaceId::new(LOGGER)
    }
}
