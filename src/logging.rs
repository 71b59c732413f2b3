//! `log` records teed to stderr and to the run's `pipeline.log`.
//!
//! The logger is installed before the run directory exists, so the log file
//! is attached later through the returned [`LogFile`] handle. Records
//! emitted before that only reach stderr.

use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

type SharedFile = Arc<Mutex<Option<BufWriter<File>>>>;

/// A writer that tees output to both stderr and an optional file.
struct TeeWriter {
    file: SharedFile,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                file.write_all(buf)?;
                file.flush()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                file.flush()?;
            }
        }
        Ok(())
    }
}

/// Handle to the log file half of the tee.
#[derive(Clone)]
pub struct LogFile {
    file: SharedFile,
    env_override: bool,
}

impl LogFile {
    /// Start teeing records into `path` (truncated).
    pub fn attach(&self, path: &Path) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        if let Ok(mut guard) = self.file.lock() {
            *guard = Some(BufWriter::new(file));
        }
        Ok(())
    }

    /// Apply the configured level unless `RUST_LOG` was set.
    pub fn set_level(&self, level: &str) {
        if self.env_override {
            return;
        }
        match LevelFilter::from_str(level) {
            Ok(filter) => log::set_max_level(filter),
            Err(_) => log::warn!("Unknown log level '{}', keeping {}", level, log::max_level()),
        }
    }
}

/// Install the global logger. `[LEVEL] message` lines go to stderr and,
/// once attached, to the log file.
pub fn init() -> LogFile {
    let file: SharedFile = Arc::new(Mutex::new(None));
    let env_override = std::env::var_os("RUST_LOG").is_some();

    let mut builder = if env_override {
        Builder::from_env(Env::default())
    } else {
        let mut b = Builder::new();
        b.filter_level(LevelFilter::Trace);
        b
    };
    builder
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .target(Target::Pipe(Box::new(TeeWriter {
            file: Arc::clone(&file),
        })));

    if builder.try_init().is_ok() && !env_override {
        log::set_max_level(LevelFilter::Info);
    }

    LogFile { file, env_override }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_writes_to_attached_file() {
        let dir = std::env::temp_dir().join("swath_pipeline_test_tee");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pipeline.log");

        let handle = LogFile {
            file: Arc::new(Mutex::new(None)),
            env_override: false,
        };
        let mut tee = TeeWriter {
            file: Arc::clone(&handle.file),
        };
        tee.write_all(b"[INFO] before\n").unwrap();
        handle.attach(&path).unwrap();
        tee.write_all(b"[INFO] after\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[INFO] after\n");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
