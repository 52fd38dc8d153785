//! nxsom CLI: inspect NeXus files and assemble their spectra.
//!
//! Assembled collections and geometry records are written as JSON.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand};
use log::{info, warn};
use nxsom_core::PixelId;
use nxsom_io::{
    AssembleRequest, Assembler, BlockId, Container, Hdf5Container, InstrumentTable, TreeIndex,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NeXus error: {0}")]
    Nexus(#[from] nxsom_io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load NeXus neutron-scattering files into spectra and instrument geometry.
#[derive(Parser)]
#[command(name = "nxsom")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log progress (debug level unless RUST_LOG says otherwise)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the indexed tree of a file
    Tree {
        /// Input NeXus file
        input: PathBuf,

        /// Only show nodes with this type tag (e.g. NXdata, SDS)
        #[arg(short, long)]
        class: Option<String>,
    },

    /// List the data blocks of a file
    Blocks {
        /// Input NeXus file
        input: PathBuf,
    },

    /// Print the geometry of banks and monitors as JSON
    Geometry {
        /// Input NeXus file
        input: PathBuf,

        /// Group locations to resolve (default: every block)
        #[arg(short, long)]
        location: Vec<String>,

        /// Instrument table (JSON) replacing the built-in one
        #[arg(long)]
        instruments: Option<PathBuf>,
    },

    /// Assemble spectra and write the collection as JSON
    Extract {
        /// Input NeXus file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Blocks as location[:signal] (default: every NXdata block)
        #[arg(short, long, value_parser = parse_block)]
        block: Vec<BlockId>,

        /// Independent axis
        #[arg(short, long)]
        axis: Option<String>,

        /// First pixel id: a flat index or <bank>_<row>_<col>
        #[arg(long, value_parser = parse_pixel_id)]
        start: Option<PixelId>,

        /// Last pixel id (exclusive): a flat index or <bank>_<row>_<col>
        #[arg(long, value_parser = parse_pixel_id)]
        end: Option<PixelId>,

        /// Pixels to leave out
        #[arg(long)]
        mask: Option<PathBuf>,

        /// Pixels to keep, per bank
        #[arg(long)]
        roi: Option<PathBuf>,

        /// Calibration offset added to the independent axis
        #[arg(long, allow_hyphen_values = true)]
        tof_offset: Option<f64>,

        /// Instrument table (JSON) replacing the built-in one
        #[arg(long)]
        instruments: Option<PathBuf>,
    },

    /// Write the built-in instrument table as JSON
    Instruments {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_pixel_id(s: &str) -> std::result::Result<PixelId, String> {
    if let Ok(index) = s.trim().parse::<usize>() {
        return Ok(PixelId::Flat(index));
    }
    s.parse().map_err(|e: nxsom_core::Error| e.to_string())
}

fn parse_block(s: &str) -> std::result::Result<BlockId, String> {
    s.parse().map_err(|e: nxsom_io::Error| e.to_string())
}

fn open_assembler(input: &Path, instruments: Option<&Path>) -> Result<Assembler<Hdf5Container>> {
    let container = Hdf5Container::open(input)?;
    let table = match instruments {
        Some(path) => InstrumentTable::from_file(path)?,
        None => InstrumentTable::builtin(),
    };
    Ok(Assembler::with_table(container, &table))
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Tree { input, class } => {
            let container = Hdf5Container::open(&input)?;
            let tree = TreeIndex::build(&container);

            for (path, kind) in tree.iter() {
                if class.as_deref().is_none_or(|class| kind.tag() == class) {
                    println!("{:<60} {}", path, kind);
                }
            }
            for warning in tree.warnings() {
                warn!("{}", warning);
            }
            info!("{}: {} nodes", container.name(), tree.len());
        }

        Commands::Blocks { input } => {
            let assembler = open_assembler(&input, None)?;
            let selected = assembler.selected_blocks()?;

            println!(
                "{:<40} | {:<8} | {:<16} | {:<10} | Axes",
                "Block", "Selected", "Dimensions", "Type"
            );
            println!("{:-<100}", "");
            for block in assembler.block_ids()? {
                let view = assembler.view(&block)?;
                let variable = view
                    .axis_index(assembler.variable_axis())
                    .unwrap_or(view.variable());
                let kind = view
                    .classify(variable)
                    .map_or_else(|_| "?".to_string(), |(kind, _)| kind.to_string());
                let axes = view
                    .axes()
                    .iter()
                    .map(|axis| axis.label.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{:<40} | {:<8} | {:<16} | {:<10} | {}",
                    block.to_string(),
                    if selected.contains(&block) { "yes" } else { "" },
                    format!("{:?}", view.dimensions()),
                    kind,
                    axes
                );
            }
            if let Some(name) = assembler.instrument_name()? {
                println!("Instrument: {}", name);
            }
            if let Some(beamline) = assembler.beamline()? {
                println!("Beamline: {}", beamline);
            }
        }

        Commands::Geometry {
            input,
            location,
            instruments,
        } => {
            let assembler = open_assembler(&input, instruments.as_deref())?;
            let locations = if location.is_empty() {
                assembler
                    .block_ids()?
                    .into_iter()
                    .map(|block| block.location)
                    .collect()
            } else {
                location
            };

            let mut geometry = serde_json::Map::new();
            for location in locations {
                let record = assembler.geometry(&location)?;
                geometry.insert(location, serde_json::to_value(record)?);
            }
            let mut writer = output_writer(None)?;
            serde_json::to_writer_pretty(&mut writer, &geometry)?;
            writeln!(writer)?;
        }

        Commands::Extract {
            input,
            output,
            block,
            axis,
            start,
            end,
            mask,
            roi,
            tof_offset,
            instruments,
        } => {
            let started = Instant::now();
            let mut assembler = open_assembler(&input, instruments.as_deref())?;

            let mut request = AssembleRequest::new().with_blocks(block);
            if let Some(axis) = axis {
                request = request.with_axis(axis);
            }
            if start.is_some() || end.is_some() {
                request = request.with_range(start, end);
            }
            if let Some(mask) = mask {
                request = request.with_mask_file(mask);
            }
            if let Some(roi) = roi {
                request = request.with_roi_file(roi);
            }
            if let Some(offset) = tof_offset {
                request = request.with_tof_offset(offset);
            }

            let collection = assembler.assemble(&request)?;
            assembler.release();

            let mut writer = output_writer(output.as_deref())?;
            serde_json::to_writer_pretty(&mut writer, &collection)?;
            writeln!(writer)?;
            writer.flush()?;

            info!(
                "assembled {} spectra from {} in {:.2}s",
                collection.len(),
                input.display(),
                started.elapsed().as_secs_f64()
            );
        }

        Commands::Instruments { output } => {
            let mut writer = output_writer(output.as_deref())?;
            writeln!(writer, "{}", InstrumentTable::builtin().to_json()?)?;
            writer.flush()?;
        }
    }

    Ok(())
}
