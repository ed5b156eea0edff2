use clap::{Parser, Subcommand};
use royalbit_stencil::cli;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Declarative spreadsheet templates: JSON in, .xlsx out, and back again.")]
#[command(long_about = "Stencil - Declarative spreadsheet templates
One YAML definition drives both directions: render and parse.

COMMANDS:
  render   - Render JSON data into an .xlsx template
  parse    - Extract JSON data from a filled workbook
  inspect  - Validate a definition and print its layout

EXAMPLES:
  stencil render invoice.yaml template.xlsx data.json -o out.xlsx
  stencil render invoice.yaml template.xlsx batch.json -o out.xlsx --per-sheet
  stencil parse invoice.yaml out.xlsx                  # JSON on stdout
  stencil inspect invoice.yaml

LOGGING:
  Set RUST_LOG to control diagnostics, e.g. RUST_LOG=royalbit_stencil=debug

Docs: https://github.com/royalbit/stencil")]
#[command(version)]
struct Cli {
    /// Show verbose steps and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Render JSON data into an .xlsx template.

Sheet i of the template is rendered with sheet i of the definition.
Loop blocks grow the sheet: rows below a row-wise loop move down, merges
and formulas follow their block. Formulas are recalculated before saving.

PER-SHEET MODE:
  With --per-sheet the data file must hold a JSON array. The template's
  first sheet is cloned once per element as 'Auto Generated Sheet N'.")]
    /// Render JSON data into an .xlsx template
    Render {
        /// Path to the YAML definition
        definition: PathBuf,

        /// Path to the .xlsx template
        template: PathBuf,

        /// Path to the JSON data file
        data: PathBuf,

        /// Output workbook path
        #[arg(short, long)]
        output: PathBuf,

        /// Render one sheet per element of a JSON array
        #[arg(long)]
        per_sheet: bool,
    },

    #[command(long_about = "Extract JSON data from a filled workbook.

Loop blocks are read until their break value, the end of the sheet or a
blank window. Conversion problems are collected per cell and reported
together; the partial data is still written.

Exit code is non-zero when any field error was found.")]
    /// Extract JSON data from a filled workbook
    Parse {
        /// Path to the YAML definition
        definition: PathBuf,

        /// Path to the .xlsx workbook
        input: PathBuf,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read every sheet with the first sheet definition
        #[arg(long)]
        per_sheet: bool,
    },

    /// Validate a definition and print its sheets, blocks and styles
    Inspect {
        /// Path to the YAML definition
        definition: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "royalbit_stencil=debug"
    } else {
        "royalbit_stencil=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render {
            definition,
            template,
            data,
            output,
            per_sheet,
        } => cli::render(definition, template, data, output, per_sheet, cli.verbose)?,

        Commands::Parse {
            definition,
            input,
            output,
            per_sheet,
        } => cli::parse(definition, input, output, per_sheet, cli.verbose)?,

        Commands::Inspect { definition } => cli::inspect(definition)?,
    }
    Ok(())
}
