//! Typed traffic-control and link commands.
//!
//! Every operation the shaper issues is one of the variants below. Nothing is
//! formatted into a shell string: a [`ShapingCommand`] is rendered to an argv
//! ([`Invocation`]) only at the runner, so interface names and rates can never
//! be interpreted by a shell.

mod runner;

pub use runner::{CommandOutput, CommandRunner, RunnerError, SystemRunner};

use std::fmt;

/// Binaries used to render commands. Defaults are resolved through `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binaries {
    pub tc: String,
    pub ip: String,
    pub modprobe: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            tc: "tc".into(),
            ip: "ip".into(),
            modprobe: "modprobe".into(),
        }
    }
}

/// A tc handle, `major:minor`.
///
/// Qdisc handles have minor 0 and render as `1:`; class ids render as `1:10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcHandle {
    pub major: u16,
    pub minor: u16,
}

impl TcHandle {
    /// Parent of the ingress qdisc (`ffff:`).
    pub const INGRESS: TcHandle = TcHandle::qdisc(0xffff);

    pub const fn qdisc(major: u16) -> Self {
        Self { major, minor: 0 }
    }

    pub const fn class(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for TcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 {
            write!(f, "{:x}:", self.major)
        } else {
            write!(f, "{:x}:{:x}", self.major, self.minor)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QdiscOp {
    /// Root HTB qdisc; unclassified traffic goes to `default_class`.
    AddHtbRoot {
        dev: String,
        handle: TcHandle,
        default_class: u16,
    },
    AddIngress {
        dev: String,
    },
    DeleteRoot {
        dev: String,
    },
    DeleteIngress {
        dev: String,
    },
    Show {
        dev: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassOp {
    AddHtb {
        dev: String,
        parent: TcHandle,
        classid: TcHandle,
        rate_kbit: u64,
        ceil_kbit: u64,
    },
    Show {
        dev: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    /// Match every IP packet on `dev`'s ingress and redirect it to `target`'s egress.
    MirrorIngressTo { dev: String, target: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    AddIfb { name: String },
    SetUp { name: String },
    Delete { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOp {
    Load { name: String },
}

/// One privileged configuration (or read-only `show`) operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapingCommand {
    Qdisc(QdiscOp),
    Class(ClassOp),
    Filter(FilterOp),
    Link(LinkOp),
    Module(ModuleOp),
}

impl ShapingCommand {
    /// Devices this command names, in argv order.
    pub fn devices(&self) -> Vec<&str> {
        match self {
            ShapingCommand::Qdisc(
                QdiscOp::AddHtbRoot { dev, .. }
                | QdiscOp::AddIngress { dev }
                | QdiscOp::DeleteRoot { dev }
                | QdiscOp::DeleteIngress { dev }
                | QdiscOp::Show { dev },
            ) => vec![dev.as_str()],
            ShapingCommand::Class(ClassOp::AddHtb { dev, .. } | ClassOp::Show { dev }) => {
                vec![dev.as_str()]
            }
            ShapingCommand::Filter(FilterOp::MirrorIngressTo { dev, target }) => {
                vec![dev.as_str(), target.as_str()]
            }
            ShapingCommand::Link(
                LinkOp::AddIfb { name } | LinkOp::SetUp { name } | LinkOp::Delete { name },
            ) => vec![name.as_str()],
            ShapingCommand::Module(_) => vec![],
        }
    }

    /// True for commands that only read kernel state.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ShapingCommand::Qdisc(QdiscOp::Show { .. }) | ShapingCommand::Class(ClassOp::Show { .. })
        )
    }

    pub fn to_invocation(&self, bins: &Binaries) -> Invocation {
        let (program, args): (&str, Vec<String>) = match self {
            ShapingCommand::Qdisc(op) => (bins.tc.as_str(), qdisc_args(op)),
            ShapingCommand::Class(op) => (bins.tc.as_str(), class_args(op)),
            ShapingCommand::Filter(op) => (bins.tc.as_str(), filter_args(op)),
            ShapingCommand::Link(op) => (bins.ip.as_str(), link_args(op)),
            ShapingCommand::Module(ModuleOp::Load { name }) => (bins.modprobe.as_str(), vec![name.clone()]),
        };
        Invocation {
            program: program.to_string(),
            args,
        }
    }
}

impl fmt::Display for ShapingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_invocation(&Binaries::default()).fmt(f)
    }
}

macro_rules! argv {
    ($($part:expr),* $(,)?) => {
        vec![$($part.to_string()),*]
    };
}

fn qdisc_args(op: &QdiscOp) -> Vec<String> {
    match op {
        QdiscOp::AddHtbRoot {
            dev,
            handle,
            default_class,
        } => argv![
            "qdisc",
            "add",
            "dev",
            dev,
            "root",
            "handle",
            handle,
            "htb",
            "default",
            format!("{default_class:x}"),
        ],
        QdiscOp::AddIngress { dev } => argv!["qdisc", "add", "dev", dev, "ingress"],
        QdiscOp::DeleteRoot { dev } => argv!["qdisc", "del", "dev", dev, "root"],
        QdiscOp::DeleteIngress { dev } => argv!["qdisc", "del", "dev", dev, "ingress"],
        QdiscOp::Show { dev } => argv!["qdisc", "show", "dev", dev],
    }
}

fn class_args(op: &ClassOp) -> Vec<String> {
    match op {
        ClassOp::AddHtb {
            dev,
            parent,
            classid,
            rate_kbit,
            ceil_kbit,
        } => argv![
            "class",
            "add",
            "dev",
            dev,
            "parent",
            parent,
            "classid",
            classid,
            "htb",
            "rate",
            format!("{rate_kbit}kbit"),
            "ceil",
            format!("{ceil_kbit}kbit"),
        ],
        ClassOp::Show { dev } => argv!["class", "show", "dev", dev],
    }
}

fn filter_args(op: &FilterOp) -> Vec<String> {
    match op {
        FilterOp::MirrorIngressTo { dev, target } => argv![
            "filter",
            "add",
            "dev",
            dev,
            "parent",
            TcHandle::INGRESS,
            "protocol",
            "ip",
            "u32",
            "match",
            "u32",
            "0",
            "0",
            "flowid",
            "1:1",
            "action",
            "mirred",
            "egress",
            "redirect",
            "dev",
            target,
        ],
    }
}

fn link_args(op: &LinkOp) -> Vec<String> {
    match op {
        LinkOp::AddIfb { name } => argv!["link", "add", name, "type", "ifb"],
        LinkOp::SetUp { name } => argv!["link", "set", "dev", name, "up"],
        LinkOp::Delete { name } => argv!["link", "del", name],
    }
}

/// A rendered command: program plus argv, never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Run through `sudo -n` so a missing credential fails instead of prompting.
    pub fn with_sudo(self) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 2);
        args.push("-n".to_string());
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".into(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Failure classes a plan step may treat as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    None,
    /// Adding something that is already there.
    AlreadyExists,
    /// Deleting something that is not there.
    NotFound,
}

const ALREADY_EXISTS_MARKERS: &[&str] = &["File exists"];

const NOT_FOUND_MARKERS: &[&str] = &[
    "No such file or directory",
    "Cannot find device",
    "Cannot delete qdisc with handle of zero",
    "Cannot find specified qdisc",
    "Failed to find qdisc with specified classid",
    "does not exist",
    "Invalid handle",
];

const PERMISSION_MARKERS: &[&str] = &[
    "Operation not permitted",
    "Permission denied",
    "a password is required",
];

impl Tolerance {
    pub fn accepts(self, stderr: &str) -> bool {
        match self {
            Tolerance::None => false,
            Tolerance::AlreadyExists => contains_any(stderr, ALREADY_EXISTS_MARKERS),
            Tolerance::NotFound => contains_any(stderr, NOT_FOUND_MARKERS),
        }
    }
}

/// True when stderr says the command was refused for lack of privilege.
pub fn is_permission_denied(stderr: &str) -> bool {
    contains_any(stderr, PERMISSION_MARKERS)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
