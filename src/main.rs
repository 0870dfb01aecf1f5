use std::env;

use flexi_logger::{FileSpec, Logger};
use log::{error, info};
use nix::unistd::Uid;

use judgebox::utils::default_format;
use judgebox::{Config, JudgeBoxError, Pipeline, Queue, SandboxConfig, Store, Worker};

fn bootstrap() -> Result<(), JudgeBoxError> {
  let _logger = Logger::try_with_str("judgebox=info")?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("JUDGEBOX_LOG").unwrap_or("./logs/".into()))
        .basename("judgebox")
        .discriminant(format!(
          "{}",
          chrono::offset::Local::now().format("%Y-%m-%d")
        ))
        .suppress_timestamp(),
    )
    .append()
    .format_for_files(default_format)
    .start()?;

  info!("Start running judgebox");

  let config = Config::from_env()?;
  let queue = Queue::connect(&config.redis)?;
  let store = Store::connect(&config.database_url)?;

  let mut sandbox_config = SandboxConfig::default();
  if Uid::effective().is_root() {
    sandbox_config.user("nobody");
  }

  let pipeline = Pipeline::new(config.workdir.clone(), sandbox_config);
  let mut worker = Worker::new(queue, store, pipeline);
  worker.run()
}

fn main() -> Result<(), JudgeBoxError> {
  match bootstrap() {
    Ok(()) => Ok(()),
    Err(err) => {
      error!("Running judgebox failed: {}", err);
      Err(err)
    }
  }
}
