use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tarn_bytecode::{disassemble, BytecodeModule};
use tarn_codegen::CompilerOptions;
use tarn_driver::{pipeline, report, DriverError, Inputs, SourceModule};
use tarn_vm::{Value, VmConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tarn",
    version,
    about = "Tarn checker, bytecode compiler and virtual machine",
    long_about = "Checks AST modules for type, nullability and ownership errors,\ncompiles them to bytecode and runs them on a stack VM."
)]
struct Cli {
    /// Log debug events to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type check AST modules, in dependency order
    Check {
        /// AST JSON files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Compile AST modules to an encoded bytecode file
    Build {
        /// AST JSON files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Entry function: `name`, `module::name` or `package::module::name`
        #[arg(long)]
        entry: Option<String>,

        /// Maximum number of generic instantiations
        #[arg(long, default_value_t = CompilerOptions::default().instantiation_limit)]
        instantiation_limit: usize,
    },

    /// Run AST modules or a bytecode file
    Run {
        /// AST JSON files, or one `.tbc` file
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Entry function: `name`, `module::name` or `package::module::name`
        #[arg(long)]
        entry: Option<String>,

        /// Maximum call depth before a stack overflow trap
        #[arg(long, default_value_t = VmConfig::default().max_call_depth)]
        max_call_depth: usize,

        /// Wrap integer arithmetic instead of trapping on overflow
        #[arg(long)]
        wrapping: bool,
    },

    /// Print the disassembly of AST modules or a bytecode file
    Disasm {
        /// AST JSON files, or one `.tbc` file
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Entry function when compiling AST modules
        #[arg(long)]
        entry: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Check { inputs } => check_command(&inputs),
        Commands::Build { inputs, output, entry, instantiation_limit } => {
            build_command(&inputs, output, entry.as_deref(), CompilerOptions { instantiation_limit })
        }
        Commands::Run { inputs, entry, max_call_depth, wrapping } => {
            let config = VmConfig { max_call_depth, checked_arithmetic: !wrapping };
            run_command(&inputs, entry.as_deref(), config)
        }
        Commands::Disasm { inputs, entry } => disasm_command(&inputs, entry.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Err(io_err) = report::failure(&err) {
                eprintln!("error: {} (while reporting: {})", err, io_err);
            }
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn check_command(inputs: &[PathBuf]) -> Result<(), DriverError> {
    let sources = Inputs::load(inputs)?.into_sources()?;
    let typed = pipeline::check(&sources)?;
    let functions: usize = typed.iter().map(|m| m.functions.len()).sum();
    println!("checked {} module(s), {} function(s)", typed.len(), functions);
    Ok(())
}

fn build_command(
    inputs: &[PathBuf],
    output: PathBuf,
    entry: Option<&str>,
    options: CompilerOptions,
) -> Result<(), DriverError> {
    let sources = Inputs::load(inputs)?.into_sources()?;
    let module = pipeline::compile(&sources, entry, &options)?;
    let bytes = module.to_bytes();
    fs::write(&output, &bytes).map_err(|error| DriverError::Output { path: output.clone(), error })?;
    println!(
        "wrote {} ({} function(s), {} bytes)",
        output.display(),
        module.functions.len(),
        bytes.len()
    );
    Ok(())
}

fn run_command(inputs: &[PathBuf], entry: Option<&str>, config: VmConfig) -> Result<(), DriverError> {
    let (module, sources) = load_module(inputs, entry)?;
    let value = pipeline::execute(module, config, &sources)?;
    if value != Value::Unit {
        println!("{}", value);
    }
    Ok(())
}

fn disasm_command(inputs: &[PathBuf], entry: Option<&str>) -> Result<(), DriverError> {
    let (module, _) = load_module(inputs, entry)?;
    print!("{}", disassemble(&module));
    Ok(())
}

/// Compile AST inputs, or decode a bytecode input and retarget its entry
fn load_module(inputs: &[PathBuf], entry: Option<&str>) -> Result<(BytecodeModule, Vec<SourceModule>), DriverError> {
    match Inputs::load(inputs)? {
        Inputs::Ast(sources) => {
            let module = pipeline::compile(&sources, entry, &CompilerOptions::default())?;
            Ok((module, sources))
        }
        Inputs::Bytecode(mut module) => {
            if let Some(name) = entry {
                pipeline::select_entry(&mut module, name)?;
            }
            Ok((module, Vec::new()))
        }
    }
}
