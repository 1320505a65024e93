//! cellar CLI - inspect, dump and edit xlsx packages

use anyhow::{bail, Context, Result};
use cellar::prelude::*;
use cellar::{DefinedName, NameScope, SheetVisibility};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cellar")]
#[command(author, version, about = "Inspect, dump and edit xlsx spreadsheets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all sheets in a workbook
    Sheets {
        /// Input spreadsheet file
        input: PathBuf,
    },

    /// Show flavor, sheets, used ranges and defined names
    Info {
        /// Input spreadsheet file
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Stream a sheet's rows to stdout
    Cat {
        /// Input spreadsheet file
        input: PathBuf,

        /// Sheet name (default: the active sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        #[arg(short, long, value_enum, default_value_t = Format::Tsv)]
        format: Format,
    },

    /// Set one cell and save
    Set {
        /// Spreadsheet file to edit
        input: PathBuf,

        /// Sheet name
        sheet: String,

        /// Cell name, e.g. B7
        cell: String,

        /// New value; numbers and TRUE/FALSE are detected unless --text is given
        value: String,

        /// Store the value as text
        #[arg(long, conflicts_with = "formula")]
        text: bool,

        /// Store the value as a formula
        #[arg(long)]
        formula: bool,

        /// Write to this file instead of updating the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Save under another name; the extension picks the flavor
    Convert {
        /// Input spreadsheet file
        input: PathBuf,

        /// Output file (.xlsx, .xlsm, .xltx or .xltm)
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Tsv,
    Csv,
    /// One JSON object per row
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sheets { input } => list_sheets(&input),
        Commands::Info { input, json } => show_info(&input, json),
        Commands::Cat {
            input,
            sheet,
            format,
        } => cat(&input, sheet.as_deref(), format),
        Commands::Set {
            input,
            sheet,
            cell,
            value,
            text,
            formula,
            output,
        } => set_cell(&input, &sheet, &cell, &value, text, formula, output.as_deref()),
        Commands::Convert { input, output } => convert(&input, &output),
    }
}

fn open(input: &Path) -> Result<Spreadsheet> {
    Spreadsheet::open(input).with_context(|| format!("Failed to open '{}'", input.display()))
}

fn list_sheets(input: &Path) -> Result<()> {
    let book = open(input)?;

    for (i, name) in book.sheet_list()?.iter().enumerate() {
        match book.sheet_visibility(name)? {
            SheetVisibility::Visible => println!("{}\t{}", i, name),
            hidden => println!("{}\t{}\t({})", i, name, hidden.as_str()),
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct SheetInfo {
    name: String,
    visibility: SheetVisibility,
    used_range: Option<String>,
}

#[derive(Serialize)]
struct Info {
    file: String,
    flavor: &'static str,
    active_sheet: String,
    sheets: Vec<SheetInfo>,
    defined_names: Vec<DefinedName>,
}

fn collect_info(input: &Path) -> Result<Info> {
    let book = open(input)?;
    let mut sheets = Vec::new();
    for name in book.sheet_list()? {
        let used_range = book
            .used_range(&name)
            .with_context(|| format!("Failed to read sheet '{}'", name))?
            .map(|r| r.to_a1_string());
        sheets.push(SheetInfo {
            visibility: book.sheet_visibility(&name)?,
            name,
            used_range,
        });
    }

    Ok(Info {
        file: input.display().to_string(),
        flavor: book.flavor()?.extension(),
        active_sheet: book.active_sheet()?,
        sheets,
        defined_names: book.defined_names()?,
    })
}

fn show_info(input: &Path, json: bool) -> Result<()> {
    let info = collect_info(input)?;

    if json {
        let text = serde_json::to_string_pretty(&info).context("Failed to encode JSON")?;
        println!("{}", text);
        return Ok(());
    }

    println!("File: {}", info.file);
    println!("Flavor: {}", info.flavor);
    println!("Sheets: {}", info.sheets.len());
    for (i, sheet) in info.sheets.iter().enumerate() {
        println!();
        let active = if sheet.name == info.active_sheet { " (active)" } else { "" };
        println!("  Sheet {}: \"{}\"{}", i, sheet.name, active);
        if sheet.visibility != SheetVisibility::Visible {
            println!("    Visibility: {}", sheet.visibility.as_str());
        }
        match &sheet.used_range {
            Some(range) => println!("    Used range: {}", range),
            None => println!("    Used range: empty"),
        }
    }

    if !info.defined_names.is_empty() {
        println!();
        println!("Defined names:");
        for dn in &info.defined_names {
            let scope = match dn.scope {
                NameScope::Workbook => String::new(),
                NameScope::Sheet(id) => format!(" (sheet id {})", id),
            };
            println!("  {}{} = {}", dn.name, scope, dn.formula);
        }
    }

    Ok(())
}

fn cat(input: &Path, sheet: Option<&str>, format: Format) -> Result<()> {
    let book = open(input)?;
    let sheet = match sheet {
        Some(name) => name.to_string(),
        None => book.active_sheet()?,
    };
    let rows = book
        .stream_rows(&sheet)
        .with_context(|| format!("Failed to read sheet '{}'", sheet))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for row in rows {
        let row = row.with_context(|| format!("Failed to read sheet '{}'", sheet))?;
        match format {
            Format::Tsv => write_delimited(&mut out, &row.values(), '\t')?,
            Format::Csv => write_delimited(&mut out, &row.values(), ',')?,
            Format::Json => {
                let line = serde_json::json!({
                    "row": row.number,
                    "cells": row.values().iter().map(json_value).collect::<Vec<_>>(),
                });
                writeln!(out, "{}", line)?;
            }
        }
    }
    out.flush().context("Failed to write to stdout")?;

    Ok(())
}

fn write_delimited(out: &mut impl Write, values: &[CellValue], delimiter: char) -> Result<()> {
    let line: Vec<String> = values
        .iter()
        .map(|v| quote(&display_value(v), delimiter))
        .collect();
    writeln!(out, "{}", line.join(&delimiter.to_string()))?;
    Ok(())
}

/// Convert a CellValue to plain text
fn display_value(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        CellValue::String(s) => s.to_string(),
        CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::Error(e) => e.as_str().to_string(),
        CellValue::Formula { .. } => display_value(value.effective_value()),
    }
}

/// Quote a field if it contains the delimiter, a quote or a line break
fn quote(text: &str, delimiter: char) -> String {
    if text.contains(delimiter) || text.contains('"') || text.contains('\n') || text.contains('\r')
    {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn json_value(value: &CellValue) -> serde_json::Value {
    match value {
        CellValue::Empty => serde_json::Value::Null,
        CellValue::Number(n) => serde_json::json!(n),
        CellValue::String(s) => serde_json::json!(s),
        CellValue::Boolean(b) => serde_json::json!(b),
        CellValue::Error(e) => serde_json::json!({ "error": e.as_str() }),
        CellValue::Formula { .. } => json_value(value.effective_value()),
    }
}

/// Interpret a command-line value: numbers and TRUE/FALSE, else text
fn parse_value(raw: &str) -> CellValue {
    if let Ok(n) = raw.trim().parse::<f64>() {
        if n.is_finite() {
            return CellValue::Number(n);
        }
    }
    match raw.to_ascii_uppercase().as_str() {
        "TRUE" => CellValue::Boolean(true),
        "FALSE" => CellValue::Boolean(false),
        _ => CellValue::from(raw),
    }
}

fn set_cell(
    input: &Path,
    sheet: &str,
    cell: &str,
    value: &str,
    text: bool,
    formula: bool,
    output: Option<&Path>,
) -> Result<()> {
    let book = open(input)?;

    let result = if formula {
        book.set_cell_formula(sheet, cell, value)
    } else if text {
        book.set_cell_value(sheet, cell, value)
    } else {
        book.set_cell_value(sheet, cell, parse_value(value))
    };
    result.with_context(|| format!("Failed to set {}!{}", sheet, cell))?;

    let target = output.unwrap_or(input);
    book.save_as(target)
        .with_context(|| format!("Failed to write '{}'", target.display()))?;
    eprintln!("Set {}!{} in '{}'", sheet, cell, target.display());

    Ok(())
}

fn convert(input: &Path, output: &Path) -> Result<()> {
    if input == output {
        bail!("Input and output are the same file");
    }
    let book = open(input)?;
    let from = book.flavor()?;
    book.save_as(output)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;
    eprintln!(
        "Converted '{}' ({}) to '{}' ({})",
        input.display(),
        from.extension(),
        output.display(),
        book.flavor()?.extension()
    );

    Ok(())
}
