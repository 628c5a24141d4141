use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "compisc", about = "Compiles Compiscript programs to MIPS assembly")]
struct Config {
    #[structopt(name = "SOURCE", parse(from_os_str))]
    source: PathBuf,

    /// Where to write the assembly. Defaults to the source path with an `.asm` extension.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Print the three-address code listing.
    #[structopt(long)]
    emit_ir: bool,

    /// Stop after semantic analysis.
    #[structopt(long)]
    check: bool,
}

impl Config {
    fn destination(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.source.with_extension("asm"))
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_args();

    let source_code = fs::read_to_string(&config.source)
        .with_context(|| format!("reading {}", config.source.display()))?;

    if config.check {
        let errors = compiscript::check(&source_code);
        for err in &errors {
            eprintln!("{}", err);
        }
        if !errors.is_empty() {
            process::exit(1);
        }
        println!("No errors found.");
        return Ok(());
    }

    let output = compiscript::compile(&source_code)?;
    if output.had_errors {
        for err in &output.errors {
            eprintln!("{}", err);
        }
        process::exit(1);
    }

    if config.emit_ir {
        if let Some(ir) = &output.ir {
            print!("{}", ir);
        }
    }

    let destination = config.destination();
    let assembly = output.assembly.unwrap_or_default();
    fs::write(&destination, assembly)
        .with_context(|| format!("writing {}", destination.display()))?;

    log::info!("assembly written to {}", destination.display());
    println!("Compilation successful!");
    Ok(())
}
