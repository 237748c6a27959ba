use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// End-of-run report printed by a subcommand.
pub trait Summary: Serialize {
    /// Short label, used as the pretty-format prefix.
    fn kind(&self) -> &'static str;

    /// Ordered key/value rows for the table and pretty formats.
    fn rows(&self) -> Vec<(&'static str, String)>;
}

pub fn print_summary<S: Summary>(summary: &S, format: OutputFormat) {
    println!("{}", render_summary(summary, format));
}

pub fn render_summary<S: Summary>(summary: &S, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in summary.rows() {
                table.add_row(vec![key.to_string(), value]);
            }
            table.to_string()
        }
        OutputFormat::Pretty => {
            let fields: Vec<String> = summary
                .rows()
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            format!("{}: {}", summary.kind(), fields.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        frames: u64,
        outcome: &'static str,
    }

    impl Summary for Sample {
        fn kind(&self) -> &'static str {
            "sample"
        }

        fn rows(&self) -> Vec<(&'static str, String)> {
            vec![
                ("frames", self.frames.to_string()),
                ("outcome", self.outcome.to_string()),
            ]
        }
    }

    const SAMPLE: Sample = Sample {
        frames: 12,
        outcome: "closed",
    };

    #[test]
    fn json_summary_is_one_line() {
        let out = render_summary(&SAMPLE, OutputFormat::Json);
        assert_eq!(out, r#"{"frames":12,"outcome":"closed"}"#);
    }

    #[test]
    fn pretty_summary_lists_fields_in_order() {
        let out = render_summary(&SAMPLE, OutputFormat::Pretty);
        assert_eq!(out, "sample: frames=12 outcome=closed");
    }

    #[test]
    fn table_summary_contains_every_row() {
        let out = render_summary(&SAMPLE, OutputFormat::Table);
        assert!(out.contains("FIELD"));
        assert!(out.contains("frames"));
        assert!(out.contains("closed"));
    }
}
