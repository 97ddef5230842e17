mod tracing;

use crate::tracing::Tracer;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use itertools::Itertools;
use tqc_braid::serialize::{load_circuit_file, load_nanowire_file};
use tqc_braid::CsvRecorder;

/// Compile the braids of a topological circuit into nanowire movements.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Compile braided gates into Majorana movements on a nanowire.")]
struct CmdLineArgs {
    /// Nanowire description.
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "The nanowire layout, as JSON."
    )]
    nanowire: PathBuf,
    /// Circuit description.
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "The circuit to compile, as JSON."
    )]
    circuit: PathBuf,
    /// Output directory
    #[arg(
        short,
        long,
        default_value = ".",
        value_name = "DIR",
        help = "Directory for the movements, states, lines and positions CSV files."
    )]
    output: PathBuf,
    /// Log output file
    #[arg(
        short,
        long,
        value_name = "LOGFILE",
        help = "Logfile to output the progress of the compilation."
    )]
    logfile: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = CmdLineArgs::parse();

    // We need to keep the object around to keep the logging active.
    let tracer = Tracer::setup_tracing(opts.logfile)?;

    let topology = load_nanowire_file(&opts.nanowire)?;
    let circuit = load_circuit_file(&opts.circuit)?;
    println!(
        "Loaded {} gates over {} particles and {} voltage gates.",
        circuit.gates().len(),
        circuit.particles(),
        topology.gate_count()
    );

    fs::create_dir_all(&opts.output)?;
    let csv = |name: &str| -> std::io::Result<BufWriter<File>> {
        Ok(BufWriter::new(File::create(opts.output.join(name))?))
    };
    let mut recorder = CsvRecorder::new(
        csv("movements.csv")?,
        csv("states.csv")?,
        csv("lines.csv")?,
        csv("positions.csv")?,
        circuit.particles(),
        topology.gate_count(),
    )?;

    println!("Braiding...");
    let outcome = match circuit.run(&topology, &mut recorder) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Compilation failed. {e}");
            drop(recorder);
            drop(tracer);
            exit(1);
        }
    };

    println!("Final positions: {}", outcome.positions);
    for (index, relocation) in outcome.relocations.iter().enumerate() {
        if relocation.relocated() {
            println!(
                "Gate {index} relocated pairs {}.",
                relocation.swapped.iter().join(", ")
            );
        }
    }

    println!("Done.");
    Ok(())
}
