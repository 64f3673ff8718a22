//! Purpose: `strata` CLI entry point: inspect resolution chains and resolve units or resources.
//! Role: Binary crate root; parses args, builds a resolver, emits JSON on stdout.
//! Invariants: stdout carries only JSON payloads; logs and errors go to stderr.
//! Invariants: Errors are emitted as JSON on stderr when stderr is not a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod cache_paths;

use cache_paths::default_cache_dir;
use strata::api::{
    Error, ErrorKind, GroupDescriptor, LayeredResolver, Layout, Resolver, to_exit_code,
};

#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "Resolve compiled units and resources across a primary archive and its bundled subordinates",
    long_about = None,
    after_help = r#"EXAMPLES
  $ strata chain service.jar
  $ strata unit service.jar com.example.Service --out Service.class
  $ strata resource service.jar config/defaults.properties --all

NOTES
  - Subordinates are extracted to ~/.strata/cache/<archive stem> (override with --cache-dir)
  - Set RUST_LOG=debug to trace lookups on stderr"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Directory for extracted subordinate archives (default: ~/.strata/cache/<stem>)",
        value_hint = ValueHint::DirPath
    )]
    cache_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "service",
        help = "Archive layout preset: service|monitor"
    )]
    layout: LayoutPreset,
    #[arg(long, global = true, help = "Override the primary archive's unit prefix")]
    unit_prefix: Option<String>,
    #[arg(long, global = true, help = "Override the primary archive's bundle prefix")]
    bundle_prefix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LayoutPreset {
    Service,
    Monitor,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Show declared subordinates, the resolution chain, and extraction outcomes")]
    Chain {
        #[arg(help = "Primary archive path", value_hint = ValueHint::FilePath)]
        archive: PathBuf,
    },
    #[command(about = "Resolve a compiled unit by dotted name")]
    Unit {
        #[arg(help = "Primary archive path", value_hint = ValueHint::FilePath)]
        archive: PathBuf,
        #[arg(help = "Unit name, e.g. com.example.Service")]
        name: String,
        #[arg(long, help = "Write the unit bytes to this file", value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    #[command(about = "Resolve a resource by path")]
    Resource {
        #[arg(help = "Primary archive path", value_hint = ValueHint::FilePath)]
        archive: PathBuf,
        #[arg(help = "Resource path, e.g. config/defaults.properties")]
        name: String,
        #[arg(long, help = "List every layer's copy instead of the first")]
        all: bool,
    },
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(exit_code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `strata --help`."));
            }
        },
    };

    init_tracing();
    let layout = layout_from_cli(&cli);

    match cli.command {
        Command::Chain { archive } => {
            let resolver = open_resolver(&archive, cli.cache_dir, layout)?;
            emit_json(chain_json(&resolver, &archive)?);
        }
        Command::Unit { archive, name, out } => {
            let resolver = open_resolver(&archive, cli.cache_dir, layout)?;
            let unit = resolver.resolve_unit(&name)?;
            if let Some(out) = &out {
                std::fs::write(out, &unit.bytes)
                    .map_err(|err| Error::from_io(err).with_path(out))?;
            }
            let group = unit.group.as_deref().map(group_json).transpose()?;
            emit_json(json!({
                "name": unit.name,
                "layer": unit.layer,
                "origin": unit.origin.display().to_string(),
                "size": unit.bytes.len(),
                "group": group,
                "out": out.map(|path| path.display().to_string()),
            }));
        }
        Command::Resource { archive, name, all } => {
            let resolver = open_resolver(&archive, cli.cache_dir, layout)?;
            if all {
                let locations = resolver
                    .resolve_all_resources(&name)
                    .iter()
                    .map(|location| location.url())
                    .collect::<Vec<_>>();
                emit_json(json!({ "name": name, "locations": locations }));
            } else {
                let location = resolver.resolve_resource(&name).map(|location| location.url());
                emit_json(json!({ "name": name, "location": location }));
            }
        }
    }
    Ok(0)
}

fn layout_from_cli(cli: &Cli) -> Layout {
    let mut layout = match cli.layout {
        LayoutPreset::Service => Layout::default(),
        LayoutPreset::Monitor => Layout::monitor_extension(),
    };
    if let Some(prefix) = &cli.unit_prefix {
        layout = layout.with_unit_prefix(prefix.as_str());
    }
    if let Some(prefix) = &cli.bundle_prefix {
        layout = layout.with_bundle_prefix(prefix.as_str());
    }
    layout
}

fn open_resolver(
    archive: &Path,
    cache_dir: Option<PathBuf>,
    layout: Layout,
) -> Result<LayeredResolver, Error> {
    let cache_dir = cache_dir.unwrap_or_else(|| default_cache_dir(archive));
    LayeredResolver::open(archive, &cache_dir, layout).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            err.with_hint("Check the archive path.")
        } else {
            err
        }
    })
}

fn chain_json(resolver: &LayeredResolver, archive: &Path) -> Result<Value, Error> {
    let subordinates = serde_json::to_value(resolver.outcomes()).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode subordinate outcomes")
            .with_source(err)
    })?;
    let chain = resolver
        .chain()
        .iter()
        .map(|origin| origin.display().to_string())
        .collect::<Vec<_>>();
    Ok(json!({
        "primary": archive.display().to_string(),
        "declared": resolver.declared(),
        "chain": chain,
        "subordinates": subordinates,
    }))
}

fn group_json(group: &GroupDescriptor) -> Result<Value, Error> {
    serde_json::to_value(group).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode group descriptor")
            .with_name(group.name.as_str())
            .with_source(err)
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: Value) {
    let encoded = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    let json = encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(name) = err.name() {
        inner.insert("name".to_string(), json!(name));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
