//! Transcript logging: an optional append-only text log of the conversation,
//! separate from `tracing` diagnostics.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub struct LoggingState {
    file_path: Option<String>,
    is_active: bool,
}

impl LoggingState {
    pub fn new(log_file: Option<String>) -> Self {
        // A file given on the command line enables logging immediately.
        let is_active = log_file.is_some();
        LoggingState {
            file_path: log_file,
            is_active,
        }
    }

    /// Pause or resume logging to the configured file.
    pub fn toggle(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                self.is_active = !self.is_active;
                if self.is_active {
                    Ok(format!("Logging resumed to: {}", path))
                } else {
                    Ok(format!("Logging paused (file: {})", path))
                }
            }
            None => Err("No log file configured. Start with --log <filename> to enable logging.".into()),
        }
    }

    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref().filter(|_| self.is_active) else {
            return Ok(());
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        for line in content.lines() {
            writeln!(file, "{}", line)?;
        }
        // Blank separator between messages, matching the screen display.
        writeln!(file)?;

        file.flush()?;
        Ok(())
    }

    pub fn status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), active) => {
                let name = Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy();
                if active {
                    format!("active ({})", name)
                } else {
                    format!("paused ({})", name)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_without_a_file_is_a_quiet_no_op() {
        let logging = LoggingState::new(None);
        assert!(logging.log_message("hello").is_ok());
        assert_eq!(logging.status_string(), "disabled");
    }

    #[test]
    fn messages_append_with_blank_separators() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        let logging = LoggingState::new(Some(path.to_string_lossy().into_owned()));

        logging.log_message("You: hi").unwrap();
        logging.log_message("line one\nline two").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "You: hi\n\nline one\nline two\n\n");
    }

    #[test]
    fn toggle_pauses_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        let mut logging = LoggingState::new(Some(path.to_string_lossy().into_owned()));

        assert!(logging.toggle().unwrap().starts_with("Logging paused"));
        logging.log_message("dropped").unwrap();
        assert!(!path.exists());

        assert!(logging.toggle().unwrap().starts_with("Logging resumed"));
        logging.log_message("kept").unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("kept"));
    }

    #[test]
    fn toggle_without_a_file_errors() {
        let mut logging = LoggingState::new(None);
        assert!(logging.toggle().is_err());
    }
}
