use flexi_logger::DeferredNow;
use log::Record;

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Processing submission 42```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}
