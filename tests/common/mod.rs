// Shared test helpers: scripted command runners and counter sources
#![allow(dead_code)]

use netthrottle::command::{CommandOutput, CommandRunner, RunnerError, ShapingCommand};
use netthrottle::models::CounterSample;
use netthrottle::orchestrator::Orchestrator;
use netthrottle::platform::Capabilities;
use netthrottle::sampler::CounterSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const REDIRECT_DEVICE: &str = "ifb0";

#[derive(Debug, Clone)]
struct Failure {
    /// 1-based call number.
    at: usize,
    /// Keep failing every call after `at`.
    persistent: bool,
    stderr: String,
}

/// Records every command and answers success unless scripted otherwise.
#[derive(Default)]
pub struct RecordingRunner {
    log: Mutex<Vec<ShapingCommand>>,
    failure: Mutex<Option<Failure>>,
    responses: Vec<(String, CommandOutput)>,
    unspawnable: bool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose rendering contains `fragment` get `output` instead of success.
    pub fn respond(mut self, fragment: &str, output: CommandOutput) -> Self {
        self.responses.push((fragment.to_string(), output));
        self
    }

    /// Every call fails to start, like a missing `sudo`.
    pub fn unspawnable() -> Self {
        Self {
            unspawnable: true,
            ..Self::default()
        }
    }

    /// Fail the `n`-th call from now (1-based) with `stderr`.
    pub fn fail_call(&self, n: usize, stderr: &str) {
        self.arm(n, stderr, false);
    }

    /// Fail the `n`-th call from now and every call after it.
    pub fn fail_from_call(&self, n: usize, stderr: &str) {
        self.arm(n, stderr, true);
    }

    fn arm(&self, n: usize, stderr: &str, persistent: bool) {
        let at = self.calls() + n;
        *self.failure.lock().unwrap() = Some(Failure {
            at,
            persistent,
            stderr: stderr.to_string(),
        });
    }

    pub fn commands(&self) -> Vec<ShapingCommand> {
        self.log.lock().unwrap().clone()
    }

    pub fn rendered(&self) -> Vec<String> {
        self.commands().iter().map(|c| c.to_string()).collect()
    }

    pub fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &ShapingCommand) -> Result<CommandOutput, RunnerError> {
        let call = {
            let mut log = self.log.lock().unwrap();
            log.push(command.clone());
            log.len()
        };
        if self.unspawnable {
            return Err(RunnerError::Spawn {
                program: "sudo".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "sudo not found"),
            });
        }
        if let Some(f) = self.failure.lock().unwrap().as_ref()
            && (call == f.at || (f.persistent && call > f.at))
        {
            return Ok(CommandOutput::failure(2, f.stderr.clone()));
        }
        let rendered = command.to_string();
        if let Some((_, output)) = self.responses.iter().find(|(frag, _)| rendered.contains(frag)) {
            return Ok(output.clone());
        }
        Ok(CommandOutput::success())
    }
}

pub fn orchestrator(runner: &Arc<RecordingRunner>) -> Orchestrator {
    Orchestrator::new(runner.clone(), Capabilities::supported(), REDIRECT_DEVICE)
}

/// Counters that grow by a fixed step per sample, one synthetic second apart.
#[derive(Default)]
pub struct FakeCounters {
    samples: Mutex<HashMap<String, CounterSample>>,
    pub bytes_per_sample: u64,
}

impl FakeCounters {
    pub fn with_interface(name: &str, bytes_per_sample: u64) -> Self {
        let source = Self {
            samples: Mutex::new(HashMap::new()),
            bytes_per_sample,
        };
        source.samples.lock().unwrap().insert(
            name.to_string(),
            CounterSample {
                timestamp_ms: 0,
                bytes_sent: 0,
                bytes_received: 0,
                packets_sent: 0,
                packets_received: 0,
            },
        );
        source
    }

    pub fn unplug(&self, name: &str) {
        self.samples.lock().unwrap().remove(name);
    }
}

impl CounterSource for FakeCounters {
    fn sample(&self, interface: &str) -> Option<CounterSample> {
        let mut samples = self.samples.lock().unwrap();
        let entry = samples.get_mut(interface)?;
        entry.timestamp_ms += 1000;
        entry.bytes_received += self.bytes_per_sample;
        entry.bytes_sent += self.bytes_per_sample / 2;
        entry.packets_received += 1;
        entry.packets_sent += 1;
        Some(*entry)
    }
}

pub fn sample(timestamp_ms: u64, bytes_sent: u64, bytes_received: u64) -> CounterSample {
    CounterSample {
        timestamp_ms,
        bytes_sent,
        bytes_received,
        packets_sent: 0,
        packets_received: 0,
    }
}

/// Blocks every command until released, announcing each one as it starts.
pub struct GatedRunner {
    started: Mutex<std::sync::mpsc::Sender<()>>,
    release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl GatedRunner {
    /// Returns the runner, a receiver signalled per started command, and the release handle.
    pub fn new() -> (
        Self,
        std::sync::mpsc::Receiver<()>,
        std::sync::mpsc::Sender<()>,
    ) {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let runner = Self {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        };
        (runner, started_rx, release_tx)
    }
}

impl CommandRunner for GatedRunner {
    fn run(&self, _command: &ShapingCommand) -> Result<CommandOutput, RunnerError> {
        let _ = self.started.lock().unwrap().send(());
        // A dropped release handle lets everything through.
        let _ = self.release.lock().unwrap().recv();
        Ok(CommandOutput::success())
    }
}
