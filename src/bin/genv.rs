use std::env;
use std::ffi::OsString;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Command};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use genv::{ConversionMode, EnvLoader, EnvStore, Entry, TargetEnv, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Run commands and read typed values with variables loaded from dotenv files.
#[derive(Debug, Parser)]
#[command(name = "genv", version)]
struct Cli {
    /// Print loader diagnostics to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load dotenv files and execute a command.
    Run(RunArgs),
    /// Load dotenv files and print one variable as a typed value.
    Get(GetArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
struct FileArgs {
    /// Dotenv file path(s). Repeat or pass comma-separated paths.
    #[arg(
        short = 'f',
        long = "file",
        env = "GENV_FILE",
        value_delimiter = ',',
        default_value = ".env"
    )]
    files: Vec<PathBuf>,

    /// Ignore missing dotenv files.
    #[arg(short = 'i', long = "ignore-missing", visible_alias = "ignore")]
    ignore_missing: bool,
}

impl FileArgs {
    fn loader(&self) -> Result<EnvLoader> {
        let files: Vec<&PathBuf> = self
            .files
            .iter()
            .filter(|path| !path.as_os_str().is_empty())
            .collect();
        if files.is_empty() {
            bail!("`-f/--file` requires at least one path");
        }

        Ok(EnvLoader::new()
            .paths(files)
            .required(!self.ignore_missing))
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    files: FileArgs,

    /// Command to execute, followed by its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<OsString>,
}

#[derive(Debug, Args)]
struct GetArgs {
    #[command(flatten)]
    files: FileArgs,

    /// Variable to read.
    key: String,

    /// Type to read the variable as.
    #[arg(short = 't', long = "type", value_enum, default_value_t = Kind::String)]
    kind: Kind,

    /// Value used when the variable is not defined.
    #[arg(short, long)]
    default: Option<String>,

    /// Fail instead of printing a zero value when the variable does not parse.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Bool,
    Float,
    Int,
    String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli.command {
        Commands::Run(args) => execute_run(args),
        Commands::Get(args) => execute_get(args).map(|value| {
            println!("{value}");
            0
        }),
    };

    match code {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("genv: {err:#}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "genv=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    // Keep a subscriber installed earlier.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn execute_run(args: RunArgs) -> Result<i32> {
    let entries = args
        .files
        .loader()?
        .parse_only()
        .context("failed to load dotenv files")?;

    let Some((program, program_args)) = args.command.split_first() else {
        bail!("missing command after `run`");
    };

    let mut command = Command::new(program);
    command.args(program_args);
    apply_entries(&mut command, entries);

    execute_command(command, program)
}

/// Add entries to the child environment unless the variable is already set.
fn apply_entries(command: &mut Command, entries: Vec<Entry>) {
    for entry in entries {
        if env::var_os(&entry.key).is_some() {
            debug!(key = %entry.key, "keeping inherited value");
            continue;
        }
        command.env(entry.key, entry.value);
    }
}

fn execute_get(args: GetArgs) -> Result<String> {
    let mut loader = args.files.loader()?.target(TargetEnv::snapshot());
    loader.load().context("failed to load dotenv files")?;

    let conversion_mode = if args.strict {
        ConversionMode::Strict
    } else {
        ConversionMode::Lenient
    };
    let mut store = EnvStore::new(loader.into_target()).with_conversion_mode(conversion_mode);

    let mut key = store.key(&args.key);
    if let Some(raw) = &args.default {
        key = key.default(parse_default(args.kind, raw)?);
    }

    let value = match args.kind {
        Kind::Bool => key.bool()?.to_string(),
        Kind::Float => key.float()?.to_string(),
        Kind::Int => key.int()?.to_string(),
        Kind::String => key.string()?,
    };
    Ok(value)
}

fn parse_default(kind: Kind, raw: &str) -> Result<Value> {
    let value = match kind {
        Kind::Bool => Value::Bool(
            raw.parse()
                .with_context(|| format!("invalid bool default `{raw}`"))?,
        ),
        Kind::Float => Value::Float(
            raw.parse()
                .with_context(|| format!("invalid float default `{raw}`"))?,
        ),
        Kind::Int => Value::Int(
            raw.parse()
                .with_context(|| format!("invalid int default `{raw}`"))?,
        ),
        Kind::String => Value::Str(raw.to_owned()),
    };
    Ok(value)
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32> {
    let err = command.exec();
    bail!("failed to execute `{}`: {err}", program.to_string_lossy())
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32> {
    let status = command
        .status()
        .with_context(|| format!("failed to execute `{}`", program.to_string_lossy()))?;
    Ok(status.code().unwrap_or(1))
}
