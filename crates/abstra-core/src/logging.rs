//! Run log: a plain-text file in the output directory plus warnings on stderr.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::subscriber::DefaultGuard;
use tracing::{info, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_NAME: &str = "abstra_log.txt";

/// Owns the subscriber for as long as a pipeline lives. Dropping it restores
/// whatever subscriber was active before.
pub struct RunLog {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl RunLog {
    /// Create `output_dir` if needed, truncate the log file and route this
    /// thread's events to it.
    pub fn init(output_dir: &Path, level: &str) -> io::Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(LOG_FILE_NAME);
        let file = File::create(&path)?;

        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false);
        let stderr_layer = fmt::layer()
            .with_writer(io::stderr.with_max_level(Level::WARN))
            .with_target(false);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer);
        let guard = tracing::subscriber::set_default(subscriber);

        info!("Logging to {}", path.display());
        Ok(Self {
            path,
            _guard: guard,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
