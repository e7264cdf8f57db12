// Applies shaping plans through the command runner and tracks what is installed

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use crate::command::{CommandRunner, RunnerError, is_permission_denied};
use crate::error::{ShapingError, validate_interface};
use crate::models::{Direction, RateLimit, ShapingState};
use crate::plan::{self, Plan, PlanStep};
use crate::platform::Capabilities;
use crate::rate::{self, RateUnit};

/// How many rollback failures are kept for display.
const MAX_DIAGNOSTICS: usize = 32;

/// Interfaces currently routing ingress through the redirect device.
///
/// There is one device system-wide, so at most one interface may hold it.
/// It is created by the first upload limit and deleted when the last holder
/// releases it.
#[derive(Debug, Default)]
struct RedirectDevice {
    holders: BTreeSet<String>,
}

impl RedirectDevice {
    fn is_idle(&self) -> bool {
        self.holders.is_empty()
    }

    fn holder(&self) -> Option<&str> {
        self.holders.iter().next().map(String::as_str)
    }

    /// Another interface holding the device, if any.
    fn held_by_other(&self, interface: &str) -> Option<&str> {
        self.holders
            .iter()
            .find(|h| h.as_str() != interface)
            .map(String::as_str)
    }

    fn acquire(&mut self, interface: &str) {
        self.holders.insert(interface.to_string());
    }

    fn release(&mut self, interface: &str) {
        self.holders.remove(interface);
    }
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<String, ShapingState>,
    redirect: RedirectDevice,
    diagnostics: VecDeque<String>,
}

impl Inner {
    fn state(&self, interface: &str) -> ShapingState {
        self.states.get(interface).copied().unwrap_or_default()
    }

    fn record(&mut self, message: String) {
        if self.diagnostics.len() == MAX_DIAGNOSTICS {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(message);
    }
}

/// Owns the shaping state and serializes every change to kernel configuration.
///
/// `changes` is held for the whole command sequence of a request, so two rapid
/// requests run one after the other instead of interleaving their commands.
/// `inner` is only locked for short reads and commits and never while a
/// command runs, so state queries do not wait on `tc`.
pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    capabilities: Capabilities,
    redirect_device: String,
    changes: Mutex<()>,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        capabilities: Capabilities,
        redirect_device: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            capabilities,
            redirect_device: redirect_device.into(),
            changes: Mutex::new(()),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_change(&self) -> MutexGuard<'_, ()> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(&self, interface: &str) -> Result<(), ShapingError> {
        if !self.capabilities.supports_shaping {
            return Err(ShapingError::Unsupported);
        }
        validate_interface(interface)
    }

    /// Parse `value`/`unit` and cap `direction` on `interface`.
    #[instrument(skip(self), fields(operation = "set_limit"))]
    pub fn set_limit(
        &self,
        interface: &str,
        direction: Direction,
        value: &str,
        unit: RateUnit,
    ) -> Result<RateLimit, ShapingError> {
        self.guard(interface)?;
        let kbps = rate::convert(value, unit)?;
        let limit = RateLimit::new(direction, kbps);
        self.apply_limit(interface, limit)?;
        Ok(limit)
    }

    /// Replace the limit for `limit.direction` on `interface`.
    ///
    /// On failure the remaining steps are skipped, the direction is rolled back
    /// best-effort and the recorded state is left exactly as it was.
    #[instrument(skip(self), fields(operation = "apply_limit"))]
    pub fn apply_limit(&self, interface: &str, limit: RateLimit) -> Result<(), ShapingError> {
        self.guard(interface)?;
        let _change = self.begin_change();

        let direction = limit.direction;
        let (prior, device_was_idle) = {
            let inner = self.lock();
            if direction == Direction::Upload
                && let Some(holder) = inner.redirect.held_by_other(interface)
            {
                return Err(ShapingError::RedirectDeviceBusy {
                    holder: holder.to_string(),
                });
            }
            (inner.state(interface).get(direction), inner.redirect.is_idle())
        };

        let plan = plan::set_limit(interface, limit, &self.redirect_device);
        if let Err(err) = self.execute(&plan) {
            warn!(error = %err, interface, %direction, "shaping plan failed, rolling back");
            self.rollback(interface, direction, prior, device_was_idle);
            return Err(err);
        }

        let mut inner = self.lock();
        inner
            .states
            .entry(interface.to_string())
            .or_default()
            .set(direction, Some(limit));
        if direction == Direction::Upload {
            inner.redirect.acquire(interface);
        }
        info!(interface, %direction, kbps = limit.kbps, "limit applied");
        Ok(())
    }

    /// Remove both limits from `interface`, plus the redirect device once nobody holds it.
    ///
    /// Individual failures are ignored, so calling this on a clean interface succeeds.
    /// Only a refused or unavailable command mechanism is reported.
    #[instrument(skip(self), fields(operation = "remove_all"))]
    pub fn remove_all(&self, interface: &str) -> Result<(), ShapingError> {
        self.guard(interface)?;
        let _change = self.begin_change();

        let owns_device = self
            .lock()
            .redirect
            .holder()
            .is_none_or(|holder| holder == interface);
        let mut plan = plan::remove_download(interface);
        plan = if owns_device {
            plan.then(plan::remove_upload(interface, &self.redirect_device))
                .then(plan::delete_redirect_device(&self.redirect_device))
        } else {
            plan.then(plan::remove_ingress(interface))
        };

        for step in &plan.steps {
            match self.run_step(step) {
                Ok(()) => {}
                Err(err @ ShapingError::PermissionDenied { .. }) => return Err(err),
                Err(err) => debug!(error = %err, "ignored during remove_all"),
            }
        }

        let mut inner = self.lock();
        let had_limits = inner
            .states
            .remove(interface)
            .is_some_and(|state| !state.is_empty());
        inner.redirect.release(interface);
        info!(interface, had_limits, "all limits removed");
        Ok(())
    }

    /// Last confirmed limits for `interface`. Does not query the kernel.
    pub fn get_state(&self, interface: &str) -> ShapingState {
        self.lock().state(interface)
    }

    /// Interface currently holding the redirect device.
    pub fn redirect_holder(&self) -> Option<String> {
        self.lock().redirect.holder().map(str::to_string)
    }

    /// Recent rollback failures, oldest first.
    pub fn diagnostics(&self) -> Vec<String> {
        self.lock().diagnostics.iter().cloned().collect()
    }

    fn execute(&self, plan: &Plan) -> Result<(), ShapingError> {
        for step in &plan.steps {
            self.run_step(step)?;
        }
        Ok(())
    }

    /// Runs one step; tolerated failures count as success.
    fn run_step(&self, step: &PlanStep) -> Result<(), ShapingError> {
        let command = step.command.to_string();
        let output = self.runner.run(&step.command).map_err(|e| match e {
            RunnerError::Spawn { source, .. } => ShapingError::PermissionDenied {
                command: command.clone(),
                reason: source.to_string(),
            },
        })?;
        if output.is_success() {
            return Ok(());
        }
        let stderr = output.stderr.trim().to_string();
        if step.tolerate.accepts(&stderr) {
            debug!(%command, %stderr, tolerance = ?step.tolerate, "tolerated failure");
            return Ok(());
        }
        if is_permission_denied(&stderr) {
            return Err(ShapingError::PermissionDenied {
                command,
                reason: stderr,
            });
        }
        Err(ShapingError::CommandFailed { command, stderr })
    }

    fn run_best_effort(&self, plan: &Plan) {
        for step in &plan.steps {
            if let Err(err) = self.run_step(step) {
                warn!(error = %err, "rollback step failed");
                self.lock().record(format!("rollback: {err}"));
            }
        }
    }

    /// Undo a half-applied direction, then try to put the previous limit back
    /// so the kernel matches the state that is kept.
    fn rollback(
        &self,
        interface: &str,
        direction: Direction,
        prior: Option<RateLimit>,
        device_was_idle: bool,
    ) {
        self.run_best_effort(&plan::removal(interface, direction, &self.redirect_device));
        if direction == Direction::Upload && device_was_idle {
            self.run_best_effort(&plan::delete_redirect_device(&self.redirect_device));
        }
        if let Some(prior) = prior {
            self.run_best_effort(&plan::install(interface, prior, &self.redirect_device));
        }
    }
}
