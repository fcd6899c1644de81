//! Terminal rendering of catalogs, conversion reports and pipeline errors.
//!
//! Data goes to stdout, notices and error reports to stderr. In JSON mode the
//! commands print whole documents instead of fields and tables.

use crate::catalog::{Catalog, DiscoveredComponent};
use crate::error::{ErrorSeverity, FrameworkError, GenesisResult};
use crate::spec::{ConversionMetrics, MemoryBreakdown};
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::fmt::Display;

const FIELD_WIDTH: usize = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned, coloured output
    #[default]
    Table,
    /// Machine-readable documents
    Json,
    /// Tab-separated, no colour
    Plain,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.format == OutputFormat::Table {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Pretty JSON document on stdout.
    pub fn document<T: Serialize>(&self, value: &T) -> GenesisResult<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// A completed action.
    pub fn done(&self, message: &str) {
        if self.is_json() {
            println!("{}", serde_json::json!({"status": "ok", "message": message}));
        } else {
            println!("{} {}", self.paint("ok", |s| s.green().bold()), message);
        }
    }

    /// A free-form notice at `severity`.
    pub fn notice(&self, severity: ErrorSeverity, message: &str) {
        if self.is_json() {
            eprintln!("{}", serde_json::json!({"severity": severity, "message": message}));
        } else {
            eprintln!("{} {}", self.severity_label(severity), message);
        }
    }

    fn severity_label(&self, severity: ErrorSeverity) -> String {
        match severity {
            ErrorSeverity::Info => self.paint("info", |s| s.blue()),
            ErrorSeverity::Warning => self.paint("warn", |s| s.yellow()),
            ErrorSeverity::Error => self.paint("error", |s| s.red()),
            ErrorSeverity::Critical => self.paint("critical", |s| s.red().bold()),
        }
    }

    pub fn heading(&self, title: &str) {
        match self.format {
            OutputFormat::Json => {}
            OutputFormat::Table => println!("\n{}", title.bold().underline()),
            OutputFormat::Plain => println!("\n{}", title),
        }
    }

    pub fn field(&self, key: &str, value: impl Display) {
        match self.format {
            OutputFormat::Json => {}
            OutputFormat::Table => println!("  {:<width$} {}", key.cyan(), value, width = FIELD_WIDTH),
            OutputFormat::Plain => println!("{}\t{}", key, value),
        }
    }

    pub fn item(&self, text: &str) {
        if !self.is_json() {
            println!("  - {}", text);
        }
    }

    /// Pipeline errors and warnings, each with its location and suggested fix.
    pub fn problems(&self, errors: &[FrameworkError]) {
        if self.is_json() {
            for error in errors {
                if let Ok(line) = serde_json::to_string(error) {
                    eprintln!("{}", line);
                }
            }
            return;
        }
        for error in errors {
            let retry = if error.retry_possible { " (retryable)" } else { "" };
            eprintln!(
                "{} {}: {}{}",
                self.severity_label(error.severity),
                self.paint(&error.error_id, |s| s.bold()),
                error.message,
                retry
            );
            match (&error.component_id, &error.field_path) {
                (Some(component), Some(field)) => eprintln!("    at {} ({})", field, component),
                (Some(component), None) => eprintln!("    in component {}", component),
                (None, Some(field)) => eprintln!("    at {}", field),
                (None, None) => {}
            }
            if let Some(fix) = &error.suggested_fix {
                eprintln!("    {} {}", self.paint("fix:", |s| s.green()), fix);
            }
        }
    }

    /// Catalog entries as an aligned table, then run statistics and errors.
    pub fn catalog(&self, catalog: &Catalog) {
        let rows: Vec<[String; 5]> = catalog.iter().map(catalog_row).collect();
        let header = ["TYPE", "CATEGORY", "VARIANTS", "TOOLS", "MODULE"];

        self.heading(&format!("Components ({})", rows.len()));
        if self.format == OutputFormat::Plain {
            println!("{}", header.join("\t"));
            for row in &rows {
                println!("{}", row.join("\t"));
            }
        } else {
            let mut widths = header.map(str::len);
            for row in &rows {
                for (width, cell) in widths.iter_mut().zip(row.iter()) {
                    *width = (*width).max(cell.len());
                }
            }
            let line = |cells: [&str; 5]| {
                cells
                    .iter()
                    .zip(widths.iter())
                    .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                    .collect::<Vec<_>>()
                    .join("  ")
            };
            println!("{}", line(header).bold());
            for row in &rows {
                println!("{}", line([row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str(), row[4].as_str()]));
            }
        }

        let stats = catalog.stats();
        self.heading("Discovery");
        self.field("Files scanned", stats.files_scanned);
        self.field("Candidates", stats.candidates);
        self.field("Discovered", stats.total_discovered);
        self.field("Consolidated", stats.total_consolidated);
        self.field("Variants", stats.variants_found);
        self.field("Reduction", format!("{:.1}%", stats.reduction_ratio));
        self.field("Duration", format!("{} ms", stats.duration_ms));

        if !catalog.errors().is_empty() {
            self.heading(&format!("Errors ({})", catalog.errors().len()));
            for error in catalog.errors() {
                let location = error
                    .module_path
                    .clone()
                    .or_else(|| error.file.as_ref().map(|f| f.display().to_string()))
                    .unwrap_or_else(|| "-".to_string());
                self.notice(
                    error.error.severity,
                    &format!("{:?} {}: {}", error.stage, location, error.error.message),
                );
            }
        }
    }

    /// Edge counts, cost and timing of one conversion.
    pub fn conversion(&self, metrics: &ConversionMetrics, memory: &MemoryBreakdown) {
        self.heading("Conversion");
        self.field("Nodes", metrics.nodes_created);
        self.field(
            "Edges",
            format!(
                "{} ({} explicit, {} implicit)",
                metrics.edges_created, metrics.explicit_connections, metrics.implicit_connections
            ),
        );
        self.field("Variables resolved", metrics.variables_resolved);
        self.field("Complexity", format!("{:.1}", metrics.complexity_score));
        self.field("Time", format!("{:.1} ms", metrics.conversion_time_ms));

        self.heading("Estimated memory (MB)");
        self.field("Base", memory.base_overhead);
        self.field("Components", memory.components);
        self.field("Connections", memory.connections);
        if let Some(overhead) = memory.healthcare_overhead {
            self.field("Regulated overhead", overhead);
        }
        self.field("Total", self.paint(&memory.total.to_string(), |s| s.bold()));
    }
}

fn catalog_row(component: &DiscoveredComponent) -> [String; 5] {
    let tools = match (
        component.capabilities.accepts_tools,
        component.capabilities.provides_tools,
    ) {
        (true, true) => "accepts+provides",
        (true, false) => "accepts",
        (false, true) => "provides",
        (false, false) => "-",
    };
    [
        component.genesis_type.clone(),
        component.category.as_str().to_string(),
        component.variants.len().to_string(),
        tools.to_string(),
        component.module_path.clone(),
    ]
}
