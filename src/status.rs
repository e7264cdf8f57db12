// Read-only view of the qdiscs and classes installed on an interface

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::command::{ClassOp, CommandRunner, QdiscOp, ShapingCommand};
use crate::error::validate_interface;
use crate::platform::Capabilities;

pub struct StatusInspector {
    runner: Arc<dyn CommandRunner>,
    capabilities: Capabilities,
}

impl StatusInspector {
    pub fn new(runner: Arc<dyn CommandRunner>, capabilities: Capabilities) -> Self {
        Self {
            runner,
            capabilities,
        }
    }

    /// `tc qdisc show` followed by `tc class show` for `interface`.
    ///
    /// Best-effort: empty when shaping is unsupported, the name is invalid,
    /// the commands fail, or nothing is installed.
    #[instrument(skip(self), fields(operation = "describe"))]
    pub fn describe(&self, interface: &str) -> String {
        if !self.capabilities.supports_shaping || validate_interface(interface).is_err() {
            return String::new();
        }
        let queries = [
            ShapingCommand::Qdisc(QdiscOp::Show {
                dev: interface.to_string(),
            }),
            ShapingCommand::Class(ClassOp::Show {
                dev: interface.to_string(),
            }),
        ];
        let sections: Vec<String> = queries
            .iter()
            .filter_map(|query| match self.runner.run(query) {
                Ok(out) if out.is_success() => Some(out.stdout.trim().to_string()),
                Ok(out) => {
                    debug!(command = %query, stderr = %out.stderr.trim(), "status query failed");
                    None
                }
                Err(e) => {
                    debug!(command = %query, error = %e, "status query failed");
                    None
                }
            })
            .filter(|s| !s.is_empty())
            .collect();
        sections.join("\n")
    }
}
