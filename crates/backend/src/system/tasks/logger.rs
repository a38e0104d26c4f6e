use anyhow::Result;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Журнал запусков отчётов: один файл на сессию,
/// `<base>/task_logs/<session>.log`
pub struct TaskLogger {
    log_dir: PathBuf,
}

impl TaskLogger {
    pub fn new(base_log_dir: impl AsRef<Path>) -> Self {
        Self {
            log_dir: base_log_dir.as_ref().join("task_logs"),
        }
    }

    pub fn log_file_path(&self, session_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", session_id))
    }

    /// Дописать строку с меткой времени
    pub fn write_log(&self, session_id: &str, message: &str) -> Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path(session_id))?;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(file, "[{}] {}", timestamp, message)?;
        Ok(())
    }

    /// Запись в журнал без влияния на отчёт: ошибка диска только в tracing
    pub fn append(&self, session_id: &str, message: &str) {
        if let Err(e) = self.write_log(session_id, message) {
            tracing::warn!("Task log {} not written: {}", session_id, e);
        }
    }

    pub fn read_log(&self, session_id: &str) -> Result<Option<String>> {
        let path = self.log_file_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }
}
