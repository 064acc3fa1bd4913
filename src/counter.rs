use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_COUNTER_FILE: &str = "start_count.txt";

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("failed to access run counter {path}")]
    Io {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    #[error("run counter {path} does not contain a number: {content:?}")]
    Corrupt { path: PathBuf, content: String },
}

/// Run iteration persisted in a small text file.
///
/// The value read is the iteration for this run and the file is left holding
/// the next one. A missing file starts the count at 1.
#[derive(Debug, Clone)]
pub struct RunCounter {
    path: PathBuf,
}

impl RunCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_run(&self) -> Result<u64, CounterError> {
        let current = match fs::read_to_string(&self.path) {
            Ok(content) => {
                let value = content
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| CounterError::Corrupt {
                        path: self.path.clone(),
                        content: content.clone(),
                    })?;
                self.write(value + 1)?;
                value
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.write(1)?;
                1
            }
            Err(cause) => {
                return Err(CounterError::Io {
                    path: self.path.clone(),
                    cause,
                })
            }
        };
        tracing::debug!(run = current, "Run counter {} advanced", self.path.display());
        Ok(current)
    }

    fn write(&self, value: u64) -> Result<(), CounterError> {
        fs::write(&self.path, value.to_string()).map_err(|cause| CounterError::Io {
            path: self.path.clone(),
            cause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let counter = RunCounter::new(dir.path().join(DEFAULT_COUNTER_FILE));

        assert_eq!(counter.next_run().unwrap(), 1);
        assert_eq!(fs::read_to_string(counter.path()).unwrap(), "1");
    }

    #[test]
    fn existing_value_is_returned_and_incremented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_COUNTER_FILE);
        fs::write(&path, "5\n").unwrap();

        let counter = RunCounter::new(&path);
        assert_eq!(counter.next_run().unwrap(), 5);
        assert_eq!(fs::read_to_string(&path).unwrap(), "6");
    }

    #[test]
    fn successive_runs() {
        let dir = tempfile::tempdir().unwrap();
        let counter = RunCounter::new(dir.path().join(DEFAULT_COUNTER_FILE));

        assert_eq!(counter.next_run().unwrap(), 1);
        assert_eq!(counter.next_run().unwrap(), 1);
        assert_eq!(counter.next_run().unwrap(), 2);
        assert_eq!(fs::read_to_string(counter.path()).unwrap(), "3");
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_COUNTER_FILE);
        fs::write(&path, "seven").unwrap();

        let err = RunCounter::new(&path).next_run().unwrap_err();
        assert!(matches!(err, CounterError::Corrupt { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "seven");
    }
}
