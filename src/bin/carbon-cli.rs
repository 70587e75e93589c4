//! CLI для архивов Carbon.
//!
//! Конвертирует JSON-документы в архивы, печатает их структуру, сводку и
//! ищет строки в таблице строк.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use carbon::{
    archive::{archive_from_json, write_archive, Archive, ArchiveOptions, Pack, PackerKind},
    config::Settings,
    logging::{init_logging, log_error},
    model::{StringDict, SyncStringDict},
    StackError,
};
use clap::{Parser, Subcommand};
use tracing::debug;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Основная структура CLI аргументов.
#[derive(Parser)]
#[command(name = "carbon-cli")]
#[command(author = "Carbon Contributors")]
#[command(version = VERSION)]
#[command(about = "Carbon CLI - columnar binary archives for JSON documents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Включить подробный вывод (debug)
    #[arg(short, long, global = true, help = "Включить подробный вывод для отладки")]
    verbose: bool,
    /// Подавить логирование
    #[arg(short = 'q', long, global = true, help = "Отключить логирование")]
    quiet: bool,
    /// Файл настроек
    #[arg(
        long,
        global = true,
        env = "CARBON_CONFIG",
        help = "Файл настроек (toml, json, yaml)"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// Подкоманды CLI
#[derive(Subcommand)]
enum Commands {
    /// Сконвертировать JSON-документ в архив
    Convert {
        /// Входной JSON-файл
        json: PathBuf,
        /// Выходной файл архива
        out: PathBuf,
        /// Стратегия упаковки строк
        #[arg(long, help = "Упаковка строк: none | huffman")]
        compressor: Option<PackerKind>,
        /// Запечь индекс SID → смещение
        #[arg(long)]
        bake_index: bool,
        /// Отсортировать ключи групп
        #[arg(long)]
        read_optimized: bool,
        /// Каталог временных файлов
        #[arg(long)]
        tmp_dir: Option<PathBuf>,
    },
    /// Напечатать структуру архива
    #[command(alias = "dump")]
    Print { file: PathBuf },
    /// Показать сводку об архиве
    #[command(alias = "status")]
    Info { file: PathBuf },
    /// Найти строку по SID
    Lookup { file: PathBuf, sid: u64 },
    /// Найти SID строк, содержащих подстроку
    Find { file: PathBuf, substring: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(cli.config.as_deref()).context("load settings")?;

    let mut logging = settings.logging_config();
    if cli.quiet {
        logging.level = "off".to_string();
    } else if cli.verbose {
        logging.level = "debug".to_string();
    }
    init_logging(logging).context("initialize logging")?;

    match handle_command(&cli, &settings) {
        Ok(()) => {
            debug!("Команда выполнена успешно");
            Ok(())
        }
        Err(e) => {
            if let Some(err) = e.downcast_ref::<StackError>() {
                log_error(err);
            }
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn handle_command(
    cli: &Cli,
    settings: &Settings,
) -> Result<()> {
    match &cli.command {
        Commands::Convert {
            json,
            out,
            compressor,
            bake_index,
            read_optimized,
            tmp_dir,
        } => {
            let mut options = settings.archive_options()?;
            if let Some(kind) = compressor {
                options.compressor = *kind;
            }
            options.bake_index |= *bake_index;
            options.read_optimized |= *read_optimized;
            if tmp_dir.is_some() {
                options.tmp_dir = tmp_dir.clone();
            }
            convert(json, out, &options)
        }
        Commands::Print { file } => {
            let archive = open(file, settings)?;
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            archive.print(&mut lock)?;
            lock.flush()?;
            Ok(())
        }
        Commands::Info { file } => info(&open(file, settings)?),
        Commands::Lookup { file, sid } => {
            let archive = open(file, settings)?;
            let s = archive.query().fetch_string(*sid)?;
            println!("{s}");
            Ok(())
        }
        Commands::Find { file, substring } => {
            let archive = open(file, settings)?;
            let query = archive.query();
            for sid in query.find_ids(|s| s.contains(substring.as_str()))? {
                let s = query.fetch_string(sid)?;
                println!("{sid}\t{s}");
            }
            Ok(())
        }
    }
}

fn open(
    path: &Path,
    settings: &Settings,
) -> Result<Archive> {
    let archive = Archive::open(path)?.with_cache_capacity(settings.string_cache_capacity);
    Ok(archive)
}

fn convert(
    json: &Path,
    out: &Path,
    options: &ArchiveOptions,
) -> Result<()> {
    let text =
        fs::read_to_string(json).with_context(|| format!("read JSON file {}", json.display()))?;
    let mut dict = SyncStringDict::new();
    let stream = archive_from_json(&text, &mut dict, options)?;
    write_archive(out, &stream)?;
    println!(
        "{} -> {} ({} bytes, {} strings)",
        json.display(),
        out.display(),
        stream.len(),
        dict.num_distinct()
    );
    Ok(())
}

fn info(archive: &Archive) -> Result<()> {
    let info = archive.info();
    if let Some(path) = archive.path() {
        println!("path:            {}", path.display());
    }
    println!("size:            {} bytes", archive.data().len());
    println!(
        "string table:    {} bytes, {} strings ({})",
        info.string_table_size,
        info.num_embedded_strings,
        archive.string_table().packer.kind()
    );
    println!(
        "record:          {} bytes (sorted: {})",
        info.record_size,
        archive.is_sorted()
    );
    if archive.has_query_index_string_id_to_offset() {
        println!("string id index: {} bytes", info.string_id_index_size);
    } else {
        println!("string id index: none");
    }
    Ok(())
}
