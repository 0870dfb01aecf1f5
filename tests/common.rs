use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Once;

use flexi_logger::Logger;
use nix::unistd::Uid;

use judgebox::{compile, Sandbox, SandboxConfig};

static INIT: Once = Once::new();

pub fn setup() {
  INIT.call_once(|| {
    Logger::try_with_str("judgebox=debug,info")
      .unwrap()
      .start()
      .unwrap();
  });
}

/// Namespace entry needs privileges the test environment may not have; the
/// sandbox fails closed there, so contract tests probe first and skip.
pub fn sandbox_available() -> bool {
  let sandbox = Sandbox::new(restricted_config());
  let result = sandbox.execute(Path::new("/bin/true"), "");
  result.exit_code == Some(0)
}

/// Worker-shaped config: drop to nobody when the tests run as root.
pub fn restricted_config() -> SandboxConfig {
  let mut config = SandboxConfig::default();
  if Uid::effective().is_root() {
    config.user("nobody");
  }
  config
}

/// Compile an inline fixture and make it runnable by the sandbox user.
pub fn compile_fixture(dir: &Path, name: &str, source: &str) -> PathBuf {
  let source_path = dir.join(format!("{}.cpp", name));
  let executable = dir.join(name);
  fs::write(&source_path, source).unwrap();
  assert!(
    compile::compile(&source_path, &executable).unwrap(),
    "fixture {} failed to compile",
    name
  );

  let mut perms = fs::metadata(&executable).unwrap().permissions();
  perms.set_mode(0o755);
  fs::set_permissions(&executable, perms).unwrap();
  let mut dir_perms = fs::metadata(dir).unwrap().permissions();
  dir_perms.set_mode(0o755);
  fs::set_permissions(dir, dir_perms).unwrap();

  executable
}
