use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::Path;

use chrono::Utc;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Formats one event as `[ISO8601] LEVEL Component: message` (§6.4), with
/// `Component` taken from the event's target (its module path).
pub struct PlainTextFormat;

impl<S, N> FormatEvent<S, N> for PlainTextFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let level = *event.metadata().level();
        let component = event.metadata().target();

        write!(writer, "[{now}] {level} {component}: ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initializes global tracing: human-readable output on stdout, plus a plain
/// `[ISO8601] LEVEL Component: message` sink at `log_path` (§6.4) read back
/// by the `read_system_logs` tool. Returns the file's flush guard — it must
/// be held for the process lifetime or buffered lines are lost on exit.
pub fn init(log_path: &str) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if let Some(parent) = Path::new(log_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let file_layer = tracing_subscriber::fmt::layer()
        .event_format(PlainTextFormat)
        .with_writer(non_blocking)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "memtier=info,tower_http=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// `read_system_logs` (§6.1, §6.4): tails the last `lines` entries, optionally
/// filtered by a case-insensitive substring match.
pub fn tail_log(log_path: &str, lines: usize, filter: Option<&str>) -> io::Result<Vec<String>> {
    let file = match std::fs::File::open(log_path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };

    let reader = io::BufReader::new(file);
    let filter_lower = filter.map(str::to_lowercase);

    let matched: Vec<String> = reader
        .lines()
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|line| match &filter_lower {
            Some(needle) => line.to_lowercase().contains(needle.as_str()),
            None => true,
        })
        .collect();

    let start = matched.len().saturating_sub(lines);
    Ok(matched[start..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_tail_log_returns_empty_for_missing_file() {
        let result = tail_log("/nonexistent/path/to/memory.log", 10, None).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_tail_log_filters_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.log");
        let mut file = std::fs::File::create(&path).unwrap();
        for i in 0..5 {
            writeln!(file, "[2026-01-01T00:00:0{i}.000Z] INFO memtier::pipeline: line {i}").unwrap();
        }
        writeln!(file, "[2026-01-01T00:00:06.000Z] ERROR memtier::db: boom").unwrap();

        let all = tail_log(path.to_str().unwrap(), 3, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[2].contains("boom"));

        let filtered = tail_log(path.to_str().unwrap(), 10, Some("error")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].contains("boom"));
    }
}
