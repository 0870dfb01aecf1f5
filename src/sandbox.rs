use std::ffi::{c_uint, CString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use nix::libc;
use nix::sched::{unshare, CloneFlags};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{alarm, chdir, chroot, dup2, execve, fork, setgid, setuid, ForkResult, Pid, User};

use crate::cgroup::SandboxCgroup;
use crate::error::{JudgeBoxError, Result};
use crate::pipe::SandboxPipe;
use crate::seccomp::SyscallFilter;

/// Child exit code for any isolation step that failed before `execve`.
/// The parent folds it into a construction failure.
const SETUP_FAILURE_CODE: i32 = 126;
/// Child exit code when `execve` itself failed.
pub const EXEC_FAILURE_CODE: i32 = 127;

const FSIZE_LIMIT: u64 = 256 * 1024 * 1024;

/// Limits and isolation switches for one judged program.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
  /// Address space cap in bytes.
  pub memory_limit: u64,
  /// CPU time cap in seconds.
  pub time_limit: u64,
  pub fd_limit: u64,
  pub process_limit: u64,
  /// Unprivileged account to drop to before `execve`.
  pub user: Option<String>,
  pub enable_network: bool,
  pub enable_filesystem_write: bool,
  pub chroot: Option<PathBuf>,
  pub syscall_filter: Option<SyscallFilter>,
}

impl Default for SandboxConfig {
  fn default() -> Self {
    SandboxConfig {
      memory_limit: 256 * 1024 * 1024,
      time_limit: 2,
      fd_limit: 64,
      process_limit: 1,
      user: None,
      enable_network: false,
      enable_filesystem_write: false,
      chroot: None,
      syscall_filter: None,
    }
  }
}

impl SandboxConfig {
  pub fn time_limit(&mut self, seconds: u64) -> &mut Self {
    self.time_limit = seconds;
    self
  }

  pub fn memory_limit(&mut self, bytes: u64) -> &mut Self {
    self.memory_limit = bytes;
    self
  }

  pub fn user<MS: Into<String>>(&mut self, name: MS) -> &mut Self {
    self.user = Some(name.into());
    self
  }
}

/// Outcome of one sandboxed run.
#[derive(Debug, Clone, Default)]
pub struct SandboxResult {
  pub exit_code: Option<i32>,
  pub signal: Option<i32>,
  pub timeout: bool,
  pub memory_exceeded: bool,
  pub signal_killed: bool,
  pub stdout: String,
  pub stderr: String,
  pub time_ms: u64,
  pub memory_kb: u64,
}

impl SandboxResult {
  /// The sandbox itself could not be built (pipe, fork, namespace entry).
  /// Callers map this to a judge error, never to a verdict on the program.
  pub(crate) fn construction_failure() -> Self {
    SandboxResult {
      exit_code: Some(-1),
      ..SandboxResult::default()
    }
  }

  pub fn is_construction_failure(&self) -> bool {
    self.exit_code == Some(-1)
  }
}

/// Runs one executable at a time under namespaces, rlimits and privilege
/// drop, feeding it a fixed stdin and capturing both output streams.
pub struct Sandbox {
  config: SandboxConfig,
}

/// Kills and reaps the child on every parent exit path, so the judged
/// process can never outlive the `execute` call.
struct ChildGuard {
  pid: Pid,
  reaped: bool,
}

impl ChildGuard {
  fn wait(&mut self) -> Result<WaitStatus> {
    let status = waitpid(self.pid, None)?;
    self.reaped = true;
    Ok(status)
  }
}

impl Drop for ChildGuard {
  fn drop(&mut self) {
    if !self.reaped {
      let _ = kill(self.pid, Signal::SIGKILL);
      let _ = waitpid(self.pid, None);
    }
  }
}

impl Sandbox {
  pub fn new(config: SandboxConfig) -> Self {
    Sandbox { config }
  }

  pub fn config(&self) -> &SandboxConfig {
    &self.config
  }

  /// Run `executable` against `stdin_text`, returning only after the child
  /// has been reaped. Construction failures are folded into the result.
  pub fn execute(&self, executable: &Path, stdin_text: &str) -> SandboxResult {
    match self.spawn(executable, stdin_text) {
      Ok(result) => result,
      Err(err) => {
        error!("Sandbox construction failed: {}", err);
        SandboxResult::construction_failure()
      }
    }
  }

  fn spawn(&self, executable: &Path, stdin_text: &str) -> Result<SandboxResult> {
    let scratch_root = self.config.chroot.as_deref();
    if let Some(root) = scratch_root {
      fs::create_dir_all(root)?;
    }

    let stdin_pipe = SandboxPipe::new()?;
    let stdout_pipe = SandboxPipe::new()?;
    let stderr_pipe = SandboxPipe::new()?;

    let result = match unsafe { fork() } {
      Ok(ForkResult::Parent { child, .. }) => {
        debug!("Start running child process (pid = {})", child);
        self.parent(child, stdin_pipe, stdout_pipe, stderr_pipe, stdin_text)
      }
      Ok(ForkResult::Child) => {
        let code = self.child(executable, &stdin_pipe, &stdout_pipe, &stderr_pipe);
        unsafe { libc::_exit(code) }
      }
      Err(errno) => Err(JudgeBoxError::fork(errno.desc())),
    };

    if let Some(root) = scratch_root {
      let _ = fs::remove_dir_all(root);
    }
    result
  }

  /// Isolation steps, applied in order inside the forked child. Any failure
  /// before `execve` aborts with the distinguished setup code; the judged
  /// program never starts half-sandboxed.
  fn child(
    &self,
    executable: &Path,
    stdin_pipe: &SandboxPipe,
    stdout_pipe: &SandboxPipe,
    stderr_pipe: &SandboxPipe,
  ) -> i32 {
    let mut namespaces = CloneFlags::CLONE_NEWPID
      | CloneFlags::CLONE_NEWNS
      | CloneFlags::CLONE_NEWUTS
      | CloneFlags::CLONE_NEWIPC;
    if !self.config.enable_network {
      namespaces |= CloneFlags::CLONE_NEWNET;
    }
    if unshare(namespaces).is_err() {
      return SETUP_FAILURE_CODE;
    }

    let cpu = self.config.time_limit;
    let memory = self.config.memory_limit;
    let fsize = if self.config.enable_filesystem_write {
      FSIZE_LIMIT
    } else {
      0
    };
    if setrlimit(Resource::RLIMIT_CPU, cpu, cpu).is_err()
      || setrlimit(Resource::RLIMIT_AS, memory, memory).is_err()
      || setrlimit(Resource::RLIMIT_NOFILE, self.config.fd_limit, self.config.fd_limit).is_err()
      || setrlimit(
        Resource::RLIMIT_NPROC,
        self.config.process_limit,
        self.config.process_limit,
      )
      .is_err()
      || setrlimit(Resource::RLIMIT_FSIZE, fsize, fsize).is_err()
    {
      return SETUP_FAILURE_CODE;
    }

    // Wall-clock watchdog: the CPU rlimit never fires for a child parked on
    // a blocking read, the alarm does.
    alarm::set(cpu as c_uint + 1);

    if let Some(name) = &self.config.user {
      let user = match User::from_name(name) {
        Ok(Some(user)) => user,
        _ => return SETUP_FAILURE_CODE,
      };
      if setgid(user.gid).is_err() || setuid(user.uid).is_err() {
        return SETUP_FAILURE_CODE;
      }
    }

    unsafe {
      libc::prctl(libc::PR_SET_DUMPABLE, 0, 0, 0, 0);
    }

    if let Some(root) = &self.config.chroot {
      if chroot(root.as_path()).is_err() || chdir("/").is_err() {
        return SETUP_FAILURE_CODE;
      }
    }

    if let Some(filter) = &self.config.syscall_filter {
      if filter.install().is_err() {
        return SETUP_FAILURE_CODE;
      }
    }

    // The Rust runtime ignores SIGPIPE; the judged program should not
    // inherit that across execve.
    unsafe {
      let _ = signal(Signal::SIGPIPE, SigHandler::SigDfl);
    }

    if dup2(stdin_pipe.read_fd(), libc::STDIN_FILENO).is_err()
      || dup2(stdout_pipe.write_fd(), libc::STDOUT_FILENO).is_err()
      || dup2(stderr_pipe.write_fd(), libc::STDERR_FILENO).is_err()
    {
      return SETUP_FAILURE_CODE;
    }
    for fd in [
      stdin_pipe.read_fd(),
      stdin_pipe.write_fd(),
      stdout_pipe.read_fd(),
      stdout_pipe.write_fd(),
      stderr_pipe.read_fd(),
      stderr_pipe.write_fd(),
    ] {
      let _ = nix::unistd::close(fd);
    }

    let program = match CString::new(executable.as_os_str().as_bytes()) {
      Ok(program) => program,
      Err(_) => return EXEC_FAILURE_CODE,
    };
    let args = [program.clone()];
    let env: [CString; 0] = [];
    let _ = execve(program.as_c_str(), &args, &env);
    EXEC_FAILURE_CODE
  }

  fn parent(
    &self,
    child: Pid,
    stdin_pipe: SandboxPipe,
    stdout_pipe: SandboxPipe,
    stderr_pipe: SandboxPipe,
    stdin_text: &str,
  ) -> Result<SandboxResult> {
    // Drop order: the guard must reap before the cgroup deletes.
    let cgroup = SandboxCgroup::new(&self.config, child);
    let mut guard = ChildGuard {
      pid: child,
      reaped: false,
    };

    let input = stdin_pipe.into_writer()?;
    let output = stdout_pipe.into_reader()?;
    let errput = stderr_pipe.into_reader()?;

    // The whole input is written up front; the child's address-space cap
    // already bounds how much it can buffer.
    input.write_all(stdin_text.as_bytes())?;
    drop(input);

    let stdout = output.drain()?;
    let stderr = errput.drain()?;

    let status = guard.wait()?;
    let usage = cgroup.usage();
    debug!("Child process usage: {:?}", usage);

    let (exit_code, signal, timeout, signal_killed) = match status {
      WaitStatus::Exited(pid, SETUP_FAILURE_CODE) => {
        return Err(JudgeBoxError::exec(format!(
          "child process #{} aborted during sandbox setup",
          pid
        )));
      }
      WaitStatus::Exited(pid, code) => {
        info!("Child process #{} exited with status {}", pid, code);
        (Some(code), None, false, false)
      }
      WaitStatus::Signaled(pid, sig, _) => {
        info!("Child process #{} is signaled by {}", pid, sig);
        let timeout = matches!(sig, Signal::SIGXCPU | Signal::SIGALRM | Signal::SIGVTALRM);
        (None, Some(sig as i32), timeout, true)
      }
      status => {
        return Err(JudgeBoxError::fork(format!(
          "unexpected wait status: {:?}",
          status
        )));
      }
    };

    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    // An allocation pushed past the address-space cap shows up either as a
    // kill with peak memory at the limit (cgroup OOM included) or as an
    // unhandled std::bad_alloc on stderr.
    let abnormal = signal_killed || exit_code.map_or(false, |code| code != 0);
    let over_limit = usage.memory_accounted() && usage.memory_kb() * 1024 >= self.config.memory_limit;
    let memory_exceeded = abnormal && (over_limit || stderr.contains("bad_alloc"));

    Ok(SandboxResult {
      exit_code,
      signal,
      timeout,
      memory_exceeded,
      signal_killed,
      stdout,
      stderr,
      time_ms: usage.time_ms(),
      memory_kb: usage.memory_kb(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn construction_failure_is_distinguishable() {
    let result = SandboxResult::construction_failure();
    assert!(result.is_construction_failure());
    assert!(result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    assert!(!result.timeout);
  }

  #[test]
  fn default_config_matches_worker_limits() {
    let config = SandboxConfig::default();
    assert_eq!(config.memory_limit, 256 * 1024 * 1024);
    assert_eq!(config.time_limit, 2);
    assert_eq!(config.fd_limit, 64);
    assert_eq!(config.process_limit, 1);
    assert!(!config.enable_network);
    assert!(config.syscall_filter.is_none());
  }
}
