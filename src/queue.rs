use log::info;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Value};

use crate::config::RedisEndpoint;
use crate::error::Result;

/// The list the frontend pushes submission ids onto.
pub const SUBMISSION_QUEUE: &str = "submission_queue";

/// Blocking consumer side of the work queue. The worker never pushes,
/// acknowledges or re-enqueues; the broker's durability is its own concern.
pub struct Queue {
  connection: redis::Connection,
}

impl Queue {
  /// Connect and, when a password is configured, authenticate immediately.
  /// An authentication failure surfaces here and is fatal to the caller.
  pub fn connect(endpoint: &RedisEndpoint) -> Result<Queue> {
    let info = ConnectionInfo {
      addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
      redis: RedisConnectionInfo {
        db: 0,
        username: None,
        password: endpoint.password.clone(),
      },
    };
    let client = redis::Client::open(info)?;
    let connection = client.get_connection()?;
    info!("Connected to queue at {}:{}", endpoint.host, endpoint.port);
    Ok(Queue { connection })
  }

  /// Block until a submission id is available. A reply of any other shape
  /// than `[key, id]` yields `None` and the caller just polls again.
  pub fn pop(&mut self) -> Result<Option<String>> {
    let reply: Value = redis::cmd("BLPOP")
      .arg(SUBMISSION_QUEUE)
      .arg(0)
      .query(&mut self.connection)?;

    match reply {
      Value::Bulk(items) if items.len() == 2 => match &items[1] {
        Value::Data(bytes) => Ok(String::from_utf8(bytes.clone()).ok()),
        _ => Ok(None),
      },
      _ => Ok(None),
    }
  }
}
