use std::{ffi::OsStr, fs::OpenOptions, path::Path, sync::Mutex};
use tracing::{dispatcher::DefaultGuard, Level};

/// Timestamp layout for each log line, e.g. `2024-08-07 06:00:01`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Open the log file in append mode and install a subscriber writing one
/// line per record (timestamp, level, message) into it. The subscriber is
/// only the default while the returned guard lives, so the binary holds it
/// for the whole invocation and nothing else in the process is touched.
///
/// * `filepath`: log file, created when missing.
pub fn init_file_logging<F: AsRef<OsStr>>(filepath: F) -> std::io::Result<DefaultGuard> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(&filepath))?;

    let subscriber = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            TIMESTAMP_FORMAT.to_string(),
        ))
        .with_max_level(Level::INFO)
        .finish();

    Ok(tracing::subscriber::set_default(subscriber))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_log_lines_are_appended_to_file() {
        let path = format!("{}/config/test_logging.log", env!("CARGO_MANIFEST_DIR"));
        let _ = std::fs::remove_file(&path);

        {
            let _guard = init_file_logging(&path).expect("Failed to open log file");
            tracing::info!("Config read successful");
        }
        {
            let _guard = init_file_logging(&path).expect("Failed to open log file");
            tracing::warn!("failed to get weather");
        }

        let contents = std::fs::read_to_string(&path).expect("Could not read log file");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2, "Expected one line per record");
        assert!(lines[0].contains("INFO") && lines[0].ends_with("Config read successful"));
        assert!(lines[1].contains("WARN") && lines[1].ends_with("failed to get weather"));

        std::fs::remove_file(&path).expect("Failed to clean up log file");
    }
}
