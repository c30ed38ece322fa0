use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;
use std::process;
use telestrip_core::install::InstallInfo;
use telestrip_core::resolver::InstallationRoot;
use telestrip_core::script::BatchScript;
use telestrip_core::types::{Outcome, PatchFile, Platform};
use telestrip_core::{executor, parser, resolver, script};

#[derive(Parser, Debug)]
#[command(
    name = "telestrip",
    version,
    about = "Applies patch files that strip telemetry and third-party network calls \
             from a desktop application installation."
)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "OUTPUT",
        help = "Also write an equivalent batch script (.bat/.cmd) to OUTPUT"
    )]
    output: Option<PathBuf>,

    #[arg(
        short = 'd',
        long,
        help = "Report what would happen without changing the installation"
    )]
    dry_run: bool,

    #[arg(short, long, help = "Enable debug logging")]
    verbose: bool,

    #[arg(help = "Installation root of the target application")]
    install: PathBuf,

    #[arg(required = true, help = "Patch files to apply, left to right")]
    patch: Vec<PathBuf>,
}

fn main() {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    if let Some(output) = &args.output {
        if !script::supported_output(output) {
            bail!(
                "unsupported output file extension on {:?} (expected .bat or .cmd)",
                output
            );
        }
    }
    if args.dry_run {
        warn!("this is a dry run, no changes will be made to the installation");
    }

    let root = InstallationRoot::open(&args.install)?;
    let info = InstallInfo::probe(root.path()).with_context(|| {
        format!(
            "{:?} does not look like a supported installation",
            args.install
        )
    })?;
    println!(
        ":: Patching {} v{} at {:?}",
        info.product,
        info.version,
        root.path()
    );

    // Every patch file is parsed and every path resolved before anything
    // runs; a parse or escape error can never leave a half-applied run.
    let mut files: Vec<PatchFile> = Vec::new();
    for path in &args.patch {
        debug!("loading patch file {:?}", path);
        files.push(parser::load(path)?);
    }
    files.retain(
        |file| match file.requires.unmet_reason(&info.product, &info.version) {
            Some(reason) => {
                warn!("skipping '{}': {}", file.name, reason);
                false
            }
            None => true,
        },
    );

    let ops = resolver::resolve_all(&root, &files)?;
    if ops.is_empty() {
        println!("No operations to apply.");
        return Ok(true);
    }

    if let Some(output) = &args.output {
        let text = BatchScript::build(&info, &root, &ops).text();
        fs::write(output, text)
            .with_context(|| format!("failed to write script to {:?}", output))?;
        println!(":: Wrote batch script to {:?}", output);
    }

    let host = Platform::host();
    let mut applied = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for op in &ops {
        let outcome = executor::apply(op, args.dry_run, host);
        let description = op.action.describe();
        match &outcome {
            Outcome::Applied => {
                println!("[{}] applied  {}", op.patch, description);
                applied += 1;
            }
            Outcome::Skipped(reason) => {
                println!("[{}] skipped  {} ({})", op.patch, description, reason);
                skipped += 1;
            }
            Outcome::Failed(reason) => {
                println!("[{}] FAILED   {} ({})", op.patch, description, reason);
                failed += 1;
            }
        }
    }

    println!();
    println!("--- Summary ---");
    println!("Applied: {}  Skipped: {}  Failed: {}", applied, skipped, failed);

    Ok(failed == 0)
}
