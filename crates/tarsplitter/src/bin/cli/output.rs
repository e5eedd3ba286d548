//! Output formatting for the CLI.
//!
//! The split summary goes to stdout either as plain text (one created
//! archive per line, easy to feed into `xargs`) or as a JSON document.

use clap::ValueEnum;
use tarsplitter::SplitStats;

/// Output format for the split summary.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// One created archive path per line.
    #[default]
    Text,
    /// The full split statistics as JSON.
    Json,
}

/// Format a byte count as a human-readable size.
///
/// Uses binary units (1 KB = 1024 bytes).
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Render `stats` in the requested format.
pub fn render_stats(stats: &SplitStats, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string(stats),
        OutputFormat::Text => Ok(stats
            .files
            .iter()
            .map(|file| file.path.display().to_string())
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tarsplitter::SplitFile;

    fn sample_stats() -> SplitStats {
        SplitStats {
            records: 3,
            payload_bytes: 1050,
            files: vec![
                SplitFile {
                    ordinal: 0,
                    path: PathBuf::from("/out/data_000000.tar"),
                    records: 1,
                    bytes: 612,
                },
                SplitFile {
                    ordinal: 1,
                    path: PathBuf::from("/out/data_000001.tar"),
                    records: 2,
                    bytes: 1974,
                },
            ],
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 / 2), "1.5 GB");
    }

    #[test]
    fn test_render_text_lists_paths() {
        let text = render_stats(&sample_stats(), OutputFormat::Text).unwrap();
        assert_eq!(text, "/out/data_000000.tar\n/out/data_000001.tar");
    }

    #[test]
    fn test_render_text_empty() {
        let text = render_stats(&SplitStats::default(), OutputFormat::Text).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_render_json() {
        let json = render_stats(&sample_stats(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["records"], 3);
        assert_eq!(value["payload_bytes"], 1050);
        assert_eq!(value["files"][1]["path"], "/out/data_000001.tar");
        assert_eq!(value["files"][1]["bytes"], 1974);
    }
}
