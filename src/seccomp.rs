use nix::libc::{self, c_long};
use seccomp_sys::{
  seccomp_init, seccomp_load, seccomp_release, seccomp_rule_add, SCMP_ACT_ALLOW, SCMP_ACT_KILL,
};

/// Kill-by-default syscall allow-list for the judged program.
///
/// Not installed unless a `SandboxConfig` opts in: the filter must be loaded
/// before `execve`, so the list has to include `execve` itself and everything
/// the dynamic loader touches, and that set is fragile across libc versions.
/// The baseline below follows the "keep the loader working" strategy; callers
/// that enable it should statically link the judged program.
#[derive(Debug, Clone)]
pub struct SyscallFilter {
  allowed: Vec<c_long>,
}

impl SyscallFilter {
  /// The minimum set for a freshly exec'd glibc binary doing stdio.
  pub fn loader_baseline() -> Self {
    let mut allowed = vec![
      libc::SYS_read,
      libc::SYS_write,
      libc::SYS_readv,
      libc::SYS_writev,
      libc::SYS_close,
      libc::SYS_fstat,
      libc::SYS_newfstatat,
      libc::SYS_lseek,
      libc::SYS_mmap,
      libc::SYS_munmap,
      libc::SYS_mprotect,
      libc::SYS_brk,
      libc::SYS_pread64,
      libc::SYS_openat,
      libc::SYS_set_tid_address,
      libc::SYS_set_robust_list,
      libc::SYS_rseq,
      libc::SYS_prlimit64,
      libc::SYS_getrandom,
      libc::SYS_futex,
      libc::SYS_rt_sigaction,
      libc::SYS_rt_sigprocmask,
      libc::SYS_rt_sigreturn,
      libc::SYS_execve,
      libc::SYS_exit,
      libc::SYS_exit_group,
    ];
    #[cfg(target_arch = "x86_64")]
    allowed.extend([libc::SYS_arch_prctl, libc::SYS_access]);

    SyscallFilter { allowed }
  }

  pub fn allow(mut self, id: c_long) -> Self {
    if !self.allowed.contains(&id) {
      self.allowed.push(id);
    }
    self
  }

  pub fn allows(&self, id: c_long) -> bool {
    self.allowed.contains(&id)
  }

  /// Load the filter into the calling process. Runs in the forked child,
  /// after privilege drop and right before `execve`; any failure must abort
  /// the child, so the error carries no detail.
  pub(crate) fn install(&self) -> std::result::Result<(), ()> {
    unsafe {
      let context = seccomp_init(SCMP_ACT_KILL);
      if context.is_null() {
        return Err(());
      }
      for id in &self.allowed {
        if seccomp_rule_add(context, SCMP_ACT_ALLOW, *id as i32, 0) != 0 {
          seccomp_release(context);
          return Err(());
        }
      }
      let loaded = seccomp_load(context);
      seccomp_release(context);
      if loaded == 0 {
        Ok(())
      } else {
        Err(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn baseline_keeps_the_loader_working() {
    let filter = SyscallFilter::loader_baseline();
    assert!(filter.allows(libc::SYS_execve));
    assert!(filter.allows(libc::SYS_mmap));
    assert!(filter.allows(libc::SYS_brk));
  }

  #[test]
  fn baseline_forbids_process_creation() {
    let filter = SyscallFilter::loader_baseline();
    assert!(!filter.allows(libc::SYS_clone));
    assert!(!filter.allows(libc::SYS_clone3));
    assert!(!filter.allows(libc::SYS_socket));
  }

  #[test]
  fn allow_extends_the_list() {
    let filter = SyscallFilter::loader_baseline().allow(libc::SYS_socket);
    assert!(filter.allows(libc::SYS_socket));
  }
}
