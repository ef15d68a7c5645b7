use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

/// Longest string shown verbatim in table and pretty output.
const PREVIEW_LIMIT: usize = 64;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Decoded bytes for frame and segment calls, bare value otherwise.
    Raw,
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

#[derive(Serialize)]
struct CallOutput<'a> {
    call: &'a str,
    addr: &'a str,
    result: &'a Value,
    elapsed_ms: u128,
    timestamp: String,
}

/// One finished call, as printed by `ctl`.
pub struct CallReport<'a> {
    pub call: &'a str,
    pub addr: &'a str,
    pub result: Value,
    pub elapsed_ms: u128,
}

pub fn print_call(report: &CallReport<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                call: report.call,
                addr: report.addr,
                result: &report.result,
                elapsed_ms: report.elapsed_ms,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CALL", "ADDR", "ELAPSED", "RESULT"])
                .add_row(vec![
                    report.call.to_string(),
                    report.addr.to_string(),
                    format!("{}ms", report.elapsed_ms),
                    preview(&report.result),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "call={} addr={} elapsed={}ms result={}",
                report.call,
                report.addr,
                report.elapsed_ms,
                preview(&report.result)
            );
        }
        OutputFormat::Raw => match &report.result {
            Value::String(text) => println!("{text}"),
            other => println!("{other}"),
        },
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Compact rendering with long strings shortened.
pub fn preview(value: &Value) -> String {
    match value {
        Value::Null => "none".to_string(),
        Value::String(text) if text.len() > PREVIEW_LIMIT => {
            format!("<{} chars>", text.len())
        }
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{key}={}", preview(value)))
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
