use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Dependency noise kept out of both sinks.
const QUIET: &str = "tokio=warn,mio=warn";

/// `<dir>/log_YYYY-MM-DD.log`
pub fn log_file_path(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("log_{}.log", day.format("%Y-%m-%d")))
}

/// Terminal filter: --debug > RUST_LOG > "info". The file sink always records
/// at debug. Replies go to stdout, so the terminal layer writes to stderr.
pub fn init(debug: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let terminal_filter = if debug {
        EnvFilter::new(format!("debug,{QUIET}"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .try_init()?;
        return Ok(None);
    };

    let daily = DailyFileMakeWriter::open(dir, Arc::new(|| chrono::Local::now().date_naive()))?;
    let path = daily.current_path();
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(daily);

    tracing_subscriber::registry()
        .with(terminal_layer.with_filter(terminal_filter))
        .with(file_layer.with_filter(EnvFilter::new(format!("debug,{QUIET}"))))
        .try_init()?;
    Ok(Some(path))
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

struct DailyFile {
    dir: PathBuf,
    day: NaiveDate,
    file: File,
}

impl DailyFile {
    /// Switch to the file of `today` when the date has moved on.
    fn roll_to(&mut self, today: NaiveDate) -> io::Result<()> {
        if today != self.day {
            self.file = open_log_file(&log_file_path(&self.dir, today))?;
            self.day = today;
        }
        Ok(())
    }
}

/// File sink that starts a new `log_YYYY-MM-DD.log` at midnight.
///
/// Each event is buffered and appended under a lock when its writer drops;
/// the date is re-read at that point, so the first event of a new day opens
/// the new file.
#[derive(Clone)]
pub struct DailyFileMakeWriter {
    current: Arc<Mutex<DailyFile>>,
    today: Today,
}

impl DailyFileMakeWriter {
    pub fn open(dir: &Path, today: Today) -> io::Result<Self> {
        let day = today();
        let file = open_log_file(&log_file_path(dir, day))?;
        Ok(Self {
            current: Arc::new(Mutex::new(DailyFile {
                dir: dir.to_path_buf(),
                day,
                file,
            })),
            today,
        })
    }

    pub fn current_path(&self) -> PathBuf {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        log_file_path(&current.dir, current.day)
    }
}

impl<'a> fmt::MakeWriter<'a> for DailyFileMakeWriter {
    type Writer = DailyFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DailyFileWriter {
            current: Arc::clone(&self.current),
            today: Arc::clone(&self.today),
            buf: Vec::with_capacity(256),
        }
    }
}

pub struct DailyFileWriter {
    current: Arc<Mutex<DailyFile>>,
    today: Today,
    buf: Vec<u8>,
}

impl Write for DailyFileWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for DailyFileWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        // A failed roll keeps writing to the previous day's file.
        let _ = current.roll_to((self.today)());
        let _ = current.file.write_all(&self.buf);
        let _ = current.file.flush();
    }
}
