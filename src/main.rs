use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use parcore::core::{Color, Core, Owner};
use parcore::metrics::{high_order_entropy, live_cell_count, owner_census};

#[derive(Parser)]
#[command(name = "parcore", about = "Parallel Core War: every cell executes, every generation")]
struct Cli {
    /// Random seed for reproducibility.
    #[arg(long)]
    seed: u64,

    /// Number of cells in the core.
    #[arg(long, default_value_t = 900)]
    size: usize,

    /// Start from an all-zero core instead of a randomized one.
    #[arg(long)]
    zeroed: bool,

    /// Number of generations to run.
    #[arg(long)]
    steps: u64,

    /// Warrior to load, as FILE@ADDR (e.g. imp.pcw@500). Repeatable;
    /// each warrior gets its own owner color.
    #[arg(long = "warrior")]
    warriors: Vec<String>,

    /// Address range LO..HI to dump at each report.
    #[arg(long)]
    dump: Option<String>,

    /// Report metrics every N generations.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    report_interval: u64,
}

/// Parse a "FILE@ADDR" warrior specification.
fn parse_warrior(s: &str) -> Result<(PathBuf, i64), String> {
    let (file, addr) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("Invalid warrior '{s}', expected FILE@ADDR (e.g. imp.pcw@500)"))?;
    let addr = addr
        .parse::<i64>()
        .map_err(|e| format!("Invalid warrior address in '{s}': {e}"))?;
    Ok((PathBuf::from(file), addr))
}

/// Parse a "LO..HI" dump range.
fn parse_range(s: &str) -> Result<(i64, i64), String> {
    let (lo, hi) = s
        .split_once("..")
        .ok_or_else(|| format!("Invalid range '{s}', expected LO..HI (e.g. 500..520)"))?;
    let lo = lo.parse::<i64>().map_err(|e| format!("Invalid range start: {e}"))?;
    let hi = hi.parse::<i64>().map_err(|e| format!("Invalid range end: {e}"))?;
    if hi < lo {
        return Err(format!("Invalid range '{s}': end before start"));
    }
    Ok((lo, hi))
}

fn report(core: &Core, dump: Option<(i64, i64)>) {
    println!(
        "step {:8}  hoe {:.4}  live {:6}  owners {:5}",
        core.instruction_counter(),
        high_order_entropy(core),
        live_cell_count(core),
        owner_census(core).len()
    );
    if let Some((lo, hi)) = dump {
        print!("{}", core.dump(lo, hi));
    }
}

fn main() {
    let cli = Cli::parse();

    let dump = match cli.dump.as_deref().map(parse_range) {
        Some(Ok(range)) => Some(range),
        Some(Err(e)) => {
            eprintln!("{e}");
            process::exit(1);
        }
        None => None,
    };

    let mut core = match Core::new(cli.size, !cli.zeroed, cli.seed) {
        Ok(core) => core,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    // Warrior colors come from their own stream so adding a warrior
    // doesn't reshuffle the core's initial contents.
    let mut color_rng = SmallRng::seed_from_u64(cli.seed.wrapping_add(1));
    for warrior in &cli.warriors {
        let (path, addr) = match parse_warrior(warrior) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        };
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                process::exit(1);
            }
        };
        let owner = Owner::new(Color::random(&mut color_rng));
        match core.assemble(&source, addr, &owner) {
            Ok(words) => {
                println!("loaded {} ({} words at {}, owner {})", path.display(), words, addr, owner.color);
            }
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                process::exit(1);
            }
        }
    }

    report(&core, dump);
    for _ in 0..cli.steps {
        core.step();
        if core.instruction_counter() % cli.report_interval == 0 {
            report(&core, dump);
        }
    }
    if core.instruction_counter() % cli.report_interval != 0 {
        report(&core, dump);
    }
}
