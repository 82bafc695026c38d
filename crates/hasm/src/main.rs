//! `hasm` command-line front end.
//!
//! Commands:
//! - `hasm disasm <module.json> <project>` - write a text project from a module image
//! - `hasm asm <project> <module.json>` - rebuild a module image from a text project

use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use hasm_core::{
    dump_project, load_project, AlwaysOverwrite, ConfirmOverwrite, ErrorClass, MemoryModule,
    ModuleAccessor, ProjectError,
};
use log::info;
#[cfg(test)]
use tempfile as _;

mod logger;
mod prompt;

const EXIT_FAILURE: i32 = 1;
const EXIT_DECLINED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "hasm")]
#[command(about = "Disassemble bytecode modules to editable text and back", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Disassemble a module image into a text project directory
    Disasm {
        /// Module image (JSON)
        module: PathBuf,
        /// Output project directory
        project: PathBuf,
        /// Remove an existing project directory without asking
        #[arg(short, long)]
        force: bool,
    },

    /// Reassemble a text project directory into a module image
    Asm {
        /// Project directory
        project: PathBuf,
        /// Output module image (JSON)
        module: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let result = match cli.command {
        Commands::Disasm {
            module,
            project,
            force,
        } => cmd_disasm(&module, &project, force),
        Commands::Asm { project, module } => cmd_asm(&project, &module),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(exit_code(e.as_ref()));
    }
}

fn exit_code(error: &(dyn Error + 'static)) -> i32 {
    match error.downcast_ref::<ProjectError>().map(ProjectError::class) {
        Some(ErrorClass::Declined) => EXIT_DECLINED,
        _ => EXIT_FAILURE,
    }
}

fn read_image(path: &Path) -> Result<MemoryModule, Box<dyn Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let module = serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(module)
}

/// Disassemble a module image into a project.
fn cmd_disasm(module_path: &Path, project: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    let module = read_image(module_path)?;
    info!(
        "read {} functions and {} strings from '{}'",
        module.function_count(),
        module.string_count(),
        module_path.display()
    );

    let mut always = AlwaysOverwrite;
    let mut ask = |path: &Path| {
        prompt::ask_overwrite(&mut io::stdin().lock(), &mut io::stderr(), path).unwrap_or(false)
    };
    let policy: &mut dyn ConfirmOverwrite = if force {
        &mut always
    } else {
        &mut ask
    };

    let summary = dump_project(&module, project, policy)?;
    println!(
        "Disassembled {} ({} functions, {} strings) -> {}",
        module_path.display(),
        summary.functions,
        summary.strings,
        project.display()
    );
    Ok(())
}

/// Reassemble a project into a module image.
fn cmd_asm(project: &Path, module_path: &Path) -> Result<(), Box<dyn Error>> {
    let module: MemoryModule = load_project(project)?;
    let image = serde_json::to_string_pretty(&module)?;
    fs::write(module_path, image).map_err(|e| format!("{}: {e}", module_path.display()))?;
    println!(
        "Assembled {} ({} functions, {} strings) -> {}",
        project.display(),
        module.function_count(),
        module.string_count(),
        module_path.display()
    );
    Ok(())
}
