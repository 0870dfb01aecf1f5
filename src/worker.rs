use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::queue::Queue;
use crate::store::Store;

const RECOVERY_BACKOFF: Duration = Duration::from_secs(1);

/// Long-lived single-submission-at-a-time loop: blocking pop, judge,
/// recover. No single submission may take the worker down; a dead queue
/// connection must, so the supervisor restarts the process.
pub struct Worker {
  queue: Queue,
  store: Store,
  pipeline: Pipeline,
}

impl Worker {
  pub fn new(queue: Queue, store: Store, pipeline: Pipeline) -> Self {
    Worker {
      queue,
      store,
      pipeline,
    }
  }

  pub fn run(&mut self) -> Result<()> {
    info!("Judge worker started, waiting for submissions");

    loop {
      let text = match self.queue.pop()? {
        Some(text) => text,
        None => {
          warn!("Ignoring malformed queue reply");
          continue;
        }
      };
      let submission_id = match text.trim().parse::<i32>() {
        Ok(submission_id) => submission_id,
        Err(_) => {
          warn!("Ignoring malformed submission id: {:?}", text);
          continue;
        }
      };

      info!("Processing submission {}", submission_id);
      match self.pipeline.process(&mut self.store, submission_id) {
        Ok(verdict) => {
          info!("Submission {} judged: {}", submission_id, verdict);
        }
        Err(err) => {
          error!("Error processing submission {}: {}", submission_id, err);
          thread::sleep(RECOVERY_BACKOFF);
        }
      }
    }
  }
}
