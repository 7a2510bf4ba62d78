use super::{CommpResult, OutputFormatter};
use crate::progress::{format_bytes, format_file_count, format_throughput};
use anyhow::Result;
use colored::*;
use discover_check_core::ValidationSummary;
use std::fmt::Write;

/// Text formatter for human-readable output
pub struct TextFormatter {
    use_color: bool,
}

impl TextFormatter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn colorize(&self, text: &str, color: fn(&str) -> ColoredString) -> String {
        if self.use_color {
            color(text).to_string()
        } else {
            text.to_string()
        }
    }
}

impl OutputFormatter for TextFormatter {
    fn format_commp(&self, result: &CommpResult) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "File: {}", result.path.display())?;
        writeln!(
            output,
            "Size: {} ({})",
            format_bytes(result.payload_size),
            result.payload_size
        )?;
        writeln!(output, "Piece size: {}", result.piece_size)?;
        writeln!(output, "commP: {}", self.colorize(&result.commp, |s| s.cyan()))?;
        writeln!(output, "Digest: {}", result.digest)?;
        if result.duplicate {
            writeln!(
                output,
                "{}",
                self.colorize("commP already produced earlier in this run", |s| s.yellow())
            )?;
        }
        writeln!(
            output,
            "\nProcessing time: {:.2}s ({})",
            result.elapsed.as_secs_f64(),
            format_throughput(result.payload_size, result.elapsed)
        )?;
        Ok(output)
    }

    fn format_summary(&self, summary: &ValidationSummary) -> Result<String> {
        let mut output = String::new();
        let total = summary.carfiles.len();
        writeln!(
            output,
            "Drive {}: {}",
            summary.drive_identifier,
            format_file_count(total)
        )?;
        for (dataset, count) in &summary.carfiles_per_dataset {
            writeln!(output, "\t{count}\tbelong to dataset\t{dataset}")?;
        }

        for (cid, report) in &summary.carfiles {
            for failure in &report.hard_fails {
                let tag = self.colorize("HARD", |s| s.red().bold());
                writeln!(output, "{tag} {cid} ({}): {failure}", report.full_path)?;
            }
            for failure in &report.soft_fails {
                let tag = self.colorize("SOFT", |s| s.yellow());
                writeln!(output, "{tag} {cid} ({}): {failure}", report.full_path)?;
            }
        }

        writeln!(
            output,
            "\nflawless: {}  hard failures: {}  soft failures: {}",
            summary.flawless, summary.hard_failures, summary.soft_failures
        )?;
        let elapsed = summary.validation_finish - summary.validation_start;
        writeln!(
            output,
            "Validation took {:.1}s",
            elapsed.num_milliseconds() as f64 / 1000.0
        )?;
        Ok(output)
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(text)
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_commp(&self, result: &CommpResult) -> Result<String> {
        self.render(result)
    }

    fn format_summary(&self, summary: &ValidationSummary) -> Result<String> {
        self.render(summary)
    }
}

const GOOD_RULE: &str =
    "=== <3 === <3 === <3 === <3 === <3 === <3 === <3 === <3 === <3 === <3 ===";
const BAD_RULE: &str =
    "!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!";
const BAD_CROSSES: &str =
    "  X   X   X   X   X   X   X   X   X   X   X   X   X   X   X   X   X   X";

/// The final pass/fail banner; `stored` is whether the report reached its sink
pub fn verdict_banner(summary: &ValidationSummary, stored: bool, use_color: bool) -> String {
    let paint = |text: String, color: fn(ColoredString) -> ColoredString| {
        if use_color {
            color(text.as_str().normal()).to_string()
        } else {
            text
        }
    };

    if !stored {
        return paint(
            format!(
                "\nReport storage FAILED for drive {}, DO NOT ship drive: set it aside\n",
                summary.drive_identifier
            ),
            |s| s.red().bold(),
        );
    }

    if summary.is_shippable() {
        paint(
            format!(
                "\n{GOOD_RULE}\n\nDrive {} with {} CARs is GOOD to ship!\n\n{GOOD_RULE}\n",
                summary.drive_identifier, summary.flawless
            ),
            |s| s.green().bold(),
        )
    } else {
        paint(
            format!(
                "\n{BAD_RULE}\n\n{BAD_CROSSES}\n\n!!! DRIVE {} IS ***BUSTED*** !!! DO NOT SHIP !!!\n\n{BAD_CROSSES}\n\n{BAD_RULE}\n",
                summary.drive_identifier
            ),
            |s| s.red().bold(),
        )
    }
}
