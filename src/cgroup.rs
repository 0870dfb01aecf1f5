use cgroups_rs::cgroup_builder::CgroupBuilder;
use cgroups_rs::cpuacct::CpuAcctController;
use cgroups_rs::memory::MemController;
use cgroups_rs::pid::PidController;
use cgroups_rs::{Cgroup, CgroupPid, Controller, MaxValue};
use log::{debug, warn};
use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeVal;
use nix::unistd::Pid;

use crate::sandbox::SandboxConfig;

/// Per-child accounting cgroup, named by the child's PID and deleted on reap.
///
/// The cgroup doubles the rlimit caps with kernel-side memory and pid
/// accounting; when a controller is unavailable (unprivileged runs,
/// restricted containers) the usage read falls back to
/// `getrusage(RUSAGE_CHILDREN)`.
pub(crate) struct SandboxCgroup {
  name: String,
  cgroup: Option<Cgroup>,
  enable_cpuacct: bool,
  enable_memory: bool,
}

#[derive(Debug)]
pub(crate) struct SandboxUsage {
  time_ms: u64,
  memory_kb: u64,
  memory_accounted: bool,
}

impl SandboxCgroup {
  pub fn new(config: &SandboxConfig, child: Pid) -> Self {
    let name = format!("judgebox.{}", child.as_raw());
    debug!("Init cgroup {}", name);

    let hierarchy = cgroups_rs::hierarchies::auto();

    let enable_cpuacct = hierarchy
      .subsystems()
      .iter()
      .any(|subsystem| subsystem.controller_name() == "cpuacct");
    let enable_memory = hierarchy
      .subsystems()
      .iter()
      .any(|subsystem| subsystem.controller_name() == "memory");
    let enable_pids = hierarchy
      .subsystems()
      .iter()
      .any(|subsystem| subsystem.controller_name() == "pids");

    let builder = CgroupBuilder::new(name.as_str());
    let builder = if enable_memory {
      // One page of slack over the address-space cap, so the rlimit is the
      // limit the child actually observes.
      let memory_limit = config.memory_limit as i64 + 4 * 1024;
      builder
        .memory()
        .memory_soft_limit(memory_limit)
        .memory_hard_limit(memory_limit)
        .memory_swap_limit(memory_limit)
        .done()
    } else {
      builder
    };
    let builder = if enable_pids {
      builder
        .pid()
        .maximum_number_of_processes(MaxValue::Value(config.process_limit as i64))
        .done()
    } else {
      builder
    };

    let mut supported_controllers = vec![];
    if enable_cpuacct {
      supported_controllers.push("cpuacct".to_string());
    }
    if enable_memory {
      supported_controllers.push("memory".to_string());
    }
    if enable_pids {
      supported_controllers.push("pids".to_string());
    }
    let builder = builder.set_specified_controllers(supported_controllers);

    let cgroup = match builder.build(hierarchy) {
      Ok(cgroup) => cgroup,
      Err(err) => {
        warn!("Build cgroup fails, falling back to rusage: {}", err);
        return SandboxCgroup {
          name,
          cgroup: None,
          enable_cpuacct: false,
          enable_memory: false,
        };
      }
    };

    let task = CgroupPid::from(child.as_raw() as u64);
    if enable_cpuacct {
      if let Some(cpuacct) = cgroup.controller_of::<CpuAcctController>() {
        let _ = cpuacct.reset();
        let _ = cpuacct.add_task(&task);
      }
    }
    if enable_memory {
      if let Some(memory) = cgroup.controller_of::<MemController>() {
        let _ = memory.reset_max_usage();
        let _ = memory.add_task(&task);
      }
    }
    if enable_pids {
      if let Some(pids) = cgroup.controller_of::<PidController>() {
        let _ = pids.add_task(&task);
      }
    }

    SandboxCgroup {
      name,
      cgroup: Some(cgroup),
      enable_cpuacct,
      enable_memory,
    }
  }

  /// Read peak usage of the reaped child.
  pub fn usage(&self) -> SandboxUsage {
    let mut rusage = None;

    let time_ms = match self.cgroup.as_ref().filter(|_| self.enable_cpuacct) {
      Some(cgroup) => match cgroup.controller_of::<CpuAcctController>() {
        Some(cpuacct) => cpuacct.cpuacct().usage / 1_000_000,
        None => 0,
      },
      None => {
        let usage = getrusage(UsageWho::RUSAGE_CHILDREN).ok();
        rusage = usage;
        usage.map_or(0, |usage| {
          milliseconds(usage.user_time()) + milliseconds(usage.system_time())
        })
      }
    };

    // Peak readings from rusage accumulate over every child this process
    // ever reaped (the compiler included), so only the cgroup reading is
    // trusted for limit comparisons.
    let mut memory_accounted = false;
    let memory_kb = match self.cgroup.as_ref().filter(|_| self.enable_memory) {
      Some(cgroup) => match cgroup.controller_of::<MemController>() {
        Some(memory) => {
          memory_accounted = true;
          memory.memory_stat().max_usage_in_bytes / 1024
        }
        None => 0,
      },
      None => {
        let usage = rusage.or_else(|| getrusage(UsageWho::RUSAGE_CHILDREN).ok());
        usage.map_or(0, |usage| usage.max_rss() as u64)
      }
    };

    SandboxUsage {
      time_ms,
      memory_kb,
      memory_accounted,
    }
  }
}

impl Drop for SandboxCgroup {
  fn drop(&mut self) {
    if let Some(cgroup) = &self.cgroup {
      debug!("Delete created cgroup {}", self.name);
      if let Err(err) = cgroup.delete() {
        warn!("Fails deleting cgroup {}: {}", self.name, err);
      }
    }
  }
}

impl SandboxUsage {
  pub fn time_ms(&self) -> u64 {
    self.time_ms
  }

  pub fn memory_kb(&self) -> u64 {
    self.memory_kb
  }

  pub fn memory_accounted(&self) -> bool {
    self.memory_accounted
  }
}

fn milliseconds(val: TimeVal) -> u64 {
  (val.tv_sec() * 1000 + val.tv_usec() / 1000) as u64
}
