//! Byte-level progress tracking for archive transfers.
//!
//! Both transport backends stream through [`copy_with_progress`], which logs
//! throughput periodically and stops between chunks once the run is cancelled.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

const CHUNK_SIZE: usize = 64 * 1024;
const LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Progress tracker with time-based speed calculation
pub struct ProgressTracker {
    start_time: Instant,
    last_log_time: Instant,
    total_bytes: Option<u64>,
    transferred_bytes: u64,
}

impl ProgressTracker {
    pub fn new(total_bytes: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_log_time: now,
            total_bytes,
            transferred_bytes: 0,
        }
    }

    pub fn add(&mut self, bytes: u64) {
        self.transferred_bytes += bytes;
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    /// Percentage complete, when the total is known
    pub fn percent_complete(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some(((self.transferred_bytes as f64 / total as f64) * 100.0).min(100.0)),
            None => None,
        }
    }

    /// Get total elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.transferred_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    /// True at most once per `interval`
    fn due(&mut self, interval: Duration) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_log_time) >= interval {
            self.last_log_time = now;
            true
        } else {
            false
        }
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} in {} ({})",
            format_bytes(self.transferred_bytes),
            format_duration(self.elapsed().as_secs()),
            format_speed(self.average_speed())
        );
        if let Some(percent) = self.percent_complete() {
            line.push_str(&format!(", {percent:.1}%"));
        }
        line
    }
}

/// Why a streamed copy stopped early
#[derive(Debug)]
pub enum CopyError {
    Cancelled,
    Read(io::Error),
    Write(io::Error),
}

/// Stream `reader` into `writer` in fixed-size chunks.
pub fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    label: &str,
    total_bytes: Option<u64>,
    cancel: &CancellationToken,
) -> Result<u64, CopyError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut tracker = ProgressTracker::new(total_bytes);
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
        tracker.add(n as u64);

        if tracker.due(LOG_INTERVAL) {
            info!("{label}: {}", tracker.summary());
        }
    }

    writer.flush().map_err(CopyError::Write)?;
    info!("{label}: done, {}", tracker.summary());
    Ok(tracker.transferred_bytes())
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_copy_all_bytes() {
        let data = vec![7u8; CHUNK_SIZE * 3 + 17];
        let mut reader = Cursor::new(data.clone());
        let mut out = Vec::new();

        let copied = copy_with_progress(&mut reader, &mut out, "test", Some(data.len() as u64), &CancellationToken::new()).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut reader = Cursor::new(vec![1u8; 10]);
        let mut out = Vec::new();

        let result = copy_with_progress(&mut reader, &mut out, "test", None, &cancel);
        assert!(matches!(result, Err(CopyError::Cancelled)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_copy_reports_write_failure() {
        let mut reader = Cursor::new(vec![1u8; 10]);
        let result = copy_with_progress(&mut reader, &mut FailingWriter, "test", None, &CancellationToken::new());
        assert!(matches!(result, Err(CopyError::Write(_))));
    }

    #[test]
    fn test_percent_complete() {
        let mut tracker = ProgressTracker::new(Some(1000));
        tracker.add(500);
        assert!((tracker.percent_complete().unwrap() - 50.0).abs() < 0.01);
        assert!(ProgressTracker::new(None).percent_complete().is_none());
        assert_eq!(ProgressTracker::new(Some(0)).percent_complete(), Some(100.0));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
        assert_eq!(format_speed(1024 * 1024), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
