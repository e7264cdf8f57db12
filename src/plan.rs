//! Ordered command plans for installing and removing rate caps.
//!
//! Download caps are a root HTB qdisc with a single rate = ceil class on the
//! interface itself. Upload caps need an indirection: ingress traffic can only
//! be reclassified, not queued, so it is redirected onto the egress side of an
//! IFB device and the same HTB structure is installed there.
//!
//! Plans are pure values. Nothing here touches the kernel.

use crate::command::{
    ClassOp, FilterOp, LinkOp, ModuleOp, QdiscOp, ShapingCommand, TcHandle, Tolerance,
};
use crate::models::{Direction, RateLimit};

/// Kernel module providing IFB devices.
pub const IFB_MODULE: &str = "ifb";

const HTB_ROOT: TcHandle = TcHandle::qdisc(1);
const HTB_CLASS_MINOR: u16 = 0x10;
const HTB_CLASS: TcHandle = TcHandle::class(1, HTB_CLASS_MINOR);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub command: ShapingCommand,
    pub tolerate: Tolerance,
}

impl PlanStep {
    fn strict(command: ShapingCommand) -> Self {
        Self {
            command,
            tolerate: Tolerance::None,
        }
    }

    fn tolerating(command: ShapingCommand, tolerate: Tolerance) -> Self {
        Self { command, tolerate }
    }
}

/// Commands executed strictly in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn then(mut self, other: Plan) -> Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn commands(&self) -> impl Iterator<Item = &ShapingCommand> {
        self.steps.iter().map(|s| &s.command)
    }
}

impl From<Vec<PlanStep>> for Plan {
    fn from(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }
}

fn htb_root(dev: &str, kbps: u64) -> Vec<PlanStep> {
    vec![
        PlanStep::strict(ShapingCommand::Qdisc(QdiscOp::AddHtbRoot {
            dev: dev.to_string(),
            handle: HTB_ROOT,
            default_class: HTB_CLASS_MINOR,
        })),
        PlanStep::strict(ShapingCommand::Class(ClassOp::AddHtb {
            dev: dev.to_string(),
            parent: HTB_ROOT,
            classid: HTB_CLASS,
            rate_kbit: kbps,
            ceil_kbit: kbps,
        })),
    ]
}

pub fn remove_download(interface: &str) -> Plan {
    Plan::from(vec![PlanStep::tolerating(
        ShapingCommand::Qdisc(QdiscOp::DeleteRoot {
            dev: interface.to_string(),
        }),
        Tolerance::NotFound,
    )])
}

pub fn install_download(interface: &str, kbps: u64) -> Plan {
    Plan::from(htb_root(interface, kbps))
}

/// Drops the ingress qdisc, and with it the redirect filter.
pub fn remove_ingress(interface: &str) -> Plan {
    Plan::from(vec![PlanStep::tolerating(
        ShapingCommand::Qdisc(QdiscOp::DeleteIngress {
            dev: interface.to_string(),
        }),
        Tolerance::NotFound,
    )])
}

/// Clears the interface's ingress hook and the redirect device's shaper.
/// The device itself is left in place; see [`delete_redirect_device`].
pub fn remove_upload(interface: &str, redirect_device: &str) -> Plan {
    remove_ingress(interface).then(Plan::from(vec![PlanStep::tolerating(
        ShapingCommand::Qdisc(QdiscOp::DeleteRoot {
            dev: redirect_device.to_string(),
        }),
        Tolerance::NotFound,
    )]))
}

pub fn install_upload(interface: &str, redirect_device: &str, kbps: u64) -> Plan {
    let mut steps = vec![
        PlanStep::strict(ShapingCommand::Module(ModuleOp::Load {
            name: IFB_MODULE.to_string(),
        })),
        PlanStep::tolerating(
            ShapingCommand::Link(LinkOp::AddIfb {
                name: redirect_device.to_string(),
            }),
            Tolerance::AlreadyExists,
        ),
        PlanStep::strict(ShapingCommand::Link(LinkOp::SetUp {
            name: redirect_device.to_string(),
        })),
        PlanStep::tolerating(
            ShapingCommand::Qdisc(QdiscOp::AddIngress {
                dev: interface.to_string(),
            }),
            Tolerance::AlreadyExists,
        ),
        PlanStep::strict(ShapingCommand::Filter(FilterOp::MirrorIngressTo {
            dev: interface.to_string(),
            target: redirect_device.to_string(),
        })),
    ];
    steps.extend(htb_root(redirect_device, kbps));
    Plan::from(steps)
}

pub fn delete_redirect_device(redirect_device: &str) -> Plan {
    Plan::from(vec![PlanStep::tolerating(
        ShapingCommand::Link(LinkOp::Delete {
            name: redirect_device.to_string(),
        }),
        Tolerance::NotFound,
    )])
}

/// Removal plan for one direction.
pub fn removal(interface: &str, direction: Direction, redirect_device: &str) -> Plan {
    match direction {
        Direction::Download => remove_download(interface),
        Direction::Upload => remove_upload(interface, redirect_device),
    }
}

/// Install plan for one limit, without the preceding teardown.
pub fn install(interface: &str, limit: RateLimit, redirect_device: &str) -> Plan {
    match limit.direction {
        Direction::Download => install_download(interface, limit.kbps),
        Direction::Upload => install_upload(interface, redirect_device, limit.kbps),
    }
}

/// Teardown followed by a fresh install. Installing over an existing qdisc
/// without removing it first leaves stale classes visible to the kernel.
pub fn set_limit(interface: &str, limit: RateLimit, redirect_device: &str) -> Plan {
    removal(interface, limit.direction, redirect_device).then(install(
        interface,
        limit,
        redirect_device,
    ))
}
