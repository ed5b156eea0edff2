use crate::core::JsonContext;
use crate::error::{StencilError, StencilResult};
use crate::parser;
use crate::reader::{ReadResult, ReadStatus, TemplateReader};
use crate::types::{Block, Definition, Direction};
use crate::writer::{TemplateWriter, WriteResult, WriteStatus};
use colored::Colorize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

fn load_definition(path: &Path, verbose: bool) -> StencilResult<Definition> {
    if verbose {
        println!("{}", "📖 Parsing definition...".cyan());
    }
    let definition = parser::parse_definition(path)?;
    if verbose {
        println!(
            "   Found {} sheet(s), {} named style(s), {} record type(s)\n",
            definition.sheets.len(),
            definition.styles.len(),
            definition.record_types.len()
        );
    }
    Ok(definition)
}

fn load_data(path: &Path) -> StencilResult<Value> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_failure(result: WriteResult) -> StencilError {
    let message = result.message.unwrap_or_default();
    match result.status {
        WriteStatus::SettingError => StencilError::Definition(message),
        _ => StencilError::Workbook(message),
    }
}

/// Execute the render command
pub fn render(
    definition: PathBuf,
    template: PathBuf,
    data: PathBuf,
    output: PathBuf,
    per_sheet: bool,
    verbose: bool,
) -> StencilResult<()> {
    println!("{}", "📄 Stencil - Rendering template".bold().green());
    println!("   Definition: {}", definition.display());
    println!("   Template:   {}", template.display());
    println!("   Data:       {}", data.display());
    println!("   Output:     {}\n", output.display());

    let def = load_definition(&definition, verbose)?;
    let value = load_data(&data)?;
    let input = BufReader::new(File::open(&template)?);
    let writer = TemplateWriter::new(&def);
    let mut buffer = Cursor::new(Vec::new());

    let result = if per_sheet {
        let Value::Array(items) = value else {
            return Err(StencilError::Definition(
                "--per-sheet expects the data file to hold a JSON array".to_string(),
            ));
        };
        if verbose {
            println!("{}", format!("📊 Rendering {} sheet(s)...", items.len()).cyan());
        }
        let mut contexts: Vec<JsonContext> = items.into_iter().map(JsonContext::new).collect();
        writer.write_per_sheet(input, contexts.as_mut_slice(), &mut buffer)
    } else {
        if verbose {
            println!("{}", "📊 Rendering workbook...".cyan());
        }
        let mut ctx = JsonContext::new(value);
        writer.write(input, &mut ctx, &mut buffer)
    };

    if !result.is_success() {
        println!(
            "{}",
            format!(
                "❌ Render failed: {}",
                result.message.as_deref().unwrap_or("unknown error")
            )
            .bold()
            .red()
        );
        return Err(write_failure(result));
    }

    fs::write(&output, buffer.into_inner())?;
    println!("{}", "✅ Render complete!".bold().green());
    println!("   Workbook: {}\n", output.display());
    Ok(())
}

fn report_field_errors(result: &ReadResult) {
    eprintln!(
        "{}",
        format!("⚠️  {} field error(s):", result.errors.len())
            .bold()
            .yellow()
    );
    for error in &result.errors {
        eprintln!(
            "   {} {} {}",
            format!("sheet {} {}", error.sheet, error.cell).bright_blue().bold(),
            error.kind.to_string().red(),
            error.message
        );
        if let Some(raw) = &error.raw {
            eprintln!("      Raw:  {}", raw.yellow());
        }
        if let Some(data) = &error.data {
            eprintln!("      Data: {}", data);
        }
    }
    eprintln!();
}

/// Execute the parse command
///
/// Diagnostics go to stderr so the JSON can be piped when no output file is given.
pub fn parse(
    definition: PathBuf,
    input: PathBuf,
    output: Option<PathBuf>,
    per_sheet: bool,
    verbose: bool,
) -> StencilResult<()> {
    eprintln!("{}", "📄 Stencil - Parsing workbook".bold().green());
    eprintln!("   Definition: {}", definition.display());
    eprintln!("   Input:      {}\n", input.display());

    let def = parser::parse_definition(&definition)?;
    if verbose {
        eprintln!("   Found {} sheet definition(s)\n", def.sheets.len());
    }
    let file = BufReader::new(File::open(&input)?);
    let reader = TemplateReader::new(&def);
    let result = if per_sheet {
        reader.read_per_sheet(file, JsonContext::default())
    } else {
        reader.read(file, JsonContext::default())
    };

    match result.status {
        ReadStatus::Success | ReadStatus::DataCollectionError => {}
        status => {
            let message = result.message.unwrap_or_default();
            eprintln!(
                "{}",
                format!("❌ Parse failed ({:?}): {}", status, message)
                    .bold()
                    .red()
            );
            return Err(match status {
                ReadStatus::SettingError => StencilError::Definition(message),
                _ => StencilError::Workbook(message),
            });
        }
    }

    let json = serde_json::to_string_pretty(&result.data)?;
    match &output {
        Some(path) => {
            fs::write(path, &json)?;
            eprintln!("   Data written to {}", path.display());
        }
        None => println!("{}", json),
    }

    if let Some(first) = result.errors.first() {
        report_field_errors(&result);
        return Err(StencilError::Field(first.clone()));
    }
    eprintln!("{}", "✅ Parse complete!".bold().green());
    Ok(())
}

fn describe_block(block: &Block, indent: &str) {
    let kind = if block.looped {
        match block.direction {
            Direction::Row => "loop (rows)",
            Direction::Column => "loop (columns)",
        }
    } else {
        "simple"
    };
    println!(
        "{}{} {} {}",
        indent,
        block.range.to_string().bright_blue().bold(),
        kind.cyan(),
        block.data.as_deref().unwrap_or("")
    );
    println!("{}   Cells: {}", indent, block.cells.len());
    if !block.styles.is_empty() {
        println!("{}   Conditional styles: {}", indent, block.styles.len());
    }
    if let Some(record) = &block.record_type {
        println!("{}   Record type: {}", indent, record);
    }
    if let Some(cond) = &block.break_condition {
        println!(
            "{}   Break: '{}' at offset ({}, {})",
            indent, cond.value, cond.row_offset, cond.col_offset
        );
    }
    if let Some(child) = &block.child {
        println!("{}   Child:", indent);
        describe_block(child, &format!("{}      ", indent));
    }
}

/// Execute the inspect command
pub fn inspect(definition: PathBuf) -> StencilResult<()> {
    println!("{}", "🔍 Stencil - Inspecting definition".bold().green());
    println!("   File: {}\n", definition.display());

    let def = match parser::parse_definition(&definition) {
        Ok(def) => def,
        Err(e) => {
            println!("{}", format!("❌ Invalid definition: {e}").bold().red());
            return Err(e);
        }
    };

    for (index, sheet) in def.sheets.iter().enumerate() {
        println!(
            "   {} {}",
            format!("Sheet {}:", index).bold(),
            sheet.name.bright_blue().bold()
        );
        if let Some(name) = &sheet.display_name {
            println!("      Display name: {}", name);
        }
        for block in &sheet.blocks {
            describe_block(block, "      ");
        }
        println!();
    }
    if let Some(index) = def.style_sheet {
        println!("   Style sheet: {}", index);
    }
    if !def.styles.is_empty() {
        let names: Vec<&str> = def.styles.keys().map(String::as_str).collect();
        println!("   Styles: {}", names.join(", "));
    }
    for (name, record) in &def.record_types {
        let fields: Vec<String> = record
            .fields
            .iter()
            .map(|(field, t)| format!("{}: {}", field, t))
            .collect();
        println!("   Record {}: {}", name.bold(), fields.join(", "));
    }

    println!("\n{}", "✅ Definition is valid!".bold().green());
    Ok(())
}
