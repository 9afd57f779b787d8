use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::Level;

use moxie::core::{print_error_message, print_info_message, Completion, Moxie};
use moxie::env::core::{LogLevel, NoColor};
use moxie::env::EnvVar;
use moxie::network::{HttpTransport, LoopbackTransport, TranslationTransport};
use moxie::parsers::html::{html_to_dom, serialize_document, Dom};
use moxie::translation::{
    generate_example_config, ConfigManager, MoxieConfig, MoxieError, RuleSet, TranslationResult,
};

#[derive(Parser, Debug)]
#[command(
    name = "moxie",
    version,
    about = "Translates an HTML document through a Moxie translation service"
)]
struct Cli {
    /// HTML file to translate; omit or use "-" for stdin
    input: Option<PathBuf>,

    /// URL the page is served from; drives URL rules and the page hash
    #[arg(short, long, default_value = "https://localhost/")]
    url: String,

    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON translation rule table
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Target locale, overrides the configuration
    #[arg(short, long)]
    target: Option<String>,

    /// Echo sources back as targets instead of calling the service
    #[arg(long)]
    dry_run: bool,

    /// Charset of the input document
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// Output destination; omit for stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write an example configuration file to this path and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Some(path) = &cli.generate_config {
        match generate_example_config(path) {
            Ok(()) => print_info_message(&format!("Wrote example configuration to {path}")),
            Err(e) => {
                print_error_message(&e.to_string());
                process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = run(cli) {
        print_error_message(&format!("Error: {e}"));
        process::exit(1);
    }
}

fn init_tracing() {
    let level = LogLevel::get()
        .ok()
        .and_then(|level| level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_ansi(!NoColor::get_or_default(false))
        .try_init();
}

fn run(cli: Cli) -> TranslationResult<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(target) = cli.target {
        config.target_lang = target;
    }

    let rules_path = cli.rules.or_else(|| config.rules_path.as_ref().map(PathBuf::from));
    let rules = match rules_path {
        Some(path) => RuleSet::load(&path)?,
        None => RuleSet::default(),
    };

    let data = read_input(cli.input.as_deref())?;
    let dom = Dom::new(html_to_dom(&data, &cli.encoding)?);

    let completion = if cli.dry_run {
        translate(config, rules, &cli.url, LoopbackTransport, &dom)
    } else {
        let transport = HttpTransport::new(&config)?;
        translate(config, rules, &cli.url, transport, &dom)
    };

    match completion {
        Completion::Translated(report) => tracing::info!(
            "翻译完成: {} 个块，写回 {}，缓存 {}，预翻译 {}，失败 {}",
            report.blocks,
            report.applied,
            report.from_cache,
            report.from_pretranslation,
            report.failed
        ),
        Completion::Queued => {}
        Completion::AlreadyTranslated => return Err(MoxieError::AlreadyTranslated),
        Completion::Failed(message) => {
            tracing::warn!("翻译失败，输出原文: {}", message);
        }
    }

    let output = serialize_document(&dom, &cli.encoding)?;
    write_output(cli.output.as_deref(), &output)
}

fn load_config(path: Option<&str>) -> TranslationResult<MoxieConfig> {
    let manager = match path {
        Some(path) => ConfigManager::from_path(Some(path))?,
        None => ConfigManager::new()?,
    };
    Ok(manager.into_config())
}

fn translate<T: TranslationTransport>(
    config: MoxieConfig,
    rules: RuleSet,
    url: &str,
    transport: T,
    dom: &Dom,
) -> Completion {
    Moxie::new(config, rules, url, transport).translate_page(dom)
}

fn read_input(path: Option<&Path>) -> TranslationResult<Vec<u8>> {
    match path {
        Some(path) if path != Path::new("-") => Ok(fs::read(path)?),
        _ => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

fn write_output(path: Option<&Path>, data: &[u8]) -> TranslationResult<()> {
    match path {
        Some(path) => fs::write(path, data)?,
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
