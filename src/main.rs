use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use kfn_helper::app_settings::AppSettings;
use kfn_helper::error::{KfnError, Result};
use kfn_helper::unlock::{UnlockOptions, song_config_text, unlock_with_options};
use kfn_helper::{io, logger, parse_sync_tracks};

#[derive(Debug, Parser)]
#[command(name = "kfn-helper", version, about = "KFN 卡拉OK歌曲包工具")]
struct Cli {
    /// 按需从文件读取，而不是一次读入内存
    #[arg(long, global = true)]
    stream: bool,

    /// 输出更详细的日志（可重复）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 显示头部和子文件目录
    Info { file: PathBuf },

    /// 解锁并另存为新文件
    Unlock {
        file: PathBuf,
        /// 输出路径，默认为 `<文件名>.unlocked.kfn`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 解锁并把所有子文件导出到目录
    Extract {
        file: PathBuf,
        /// 导出目录，默认为当前目录
        #[arg(short = 'd', long, default_value = ".")]
        dir: PathBuf,
    },

    /// 解析同步歌词并以 JSON 输出
    Lyrics {
        file: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = AppSettings::load();

    let console_level = match cli.verbose {
        0 => settings.log_settings.console_log_level,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    logger::init_global_logger(
        console_level,
        settings.log_settings.enable_file_log,
        settings.log_settings.file_log_level,
    );

    match run(&cli, &settings.to_unlock_options()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, options: &UnlockOptions) -> Result<()> {
    match &cli.command {
        Command::Info { file } => print_info(file, cli.stream),
        Command::Unlock { file, output } => {
            let package = unlock_with_options(io::load_package(file, cli.stream)?, options)?;
            let output = output
                .clone()
                .unwrap_or_else(|| io::unlocked_output_path(file));
            io::save_package(&output, &package)?;
            println!("{}", output.display());
            Ok(())
        }
        Command::Extract { file, dir } => {
            let package = unlock_with_options(io::load_package(file, cli.stream)?, options)?;
            for path in io::write_subfiles(dir, &package)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Lyrics { file, pretty } => {
            let package = unlock_with_options(io::load_package(file, cli.stream)?, options)?;
            let text = song_config_text(&package)
                .ok_or_else(|| KfnError::Custom("包中没有可读的歌曲配置".to_string()))?;

            let parsed = parse_sync_tracks(&text);
            if !parsed.warnings.is_empty() {
                log::warn!("[同步解析] 跳过了 {} 行格式错误的内容", parsed.warnings.len());
            }

            let json = if *pretty {
                serde_json::to_string_pretty(&parsed.tracks)?
            } else {
                serde_json::to_string(&parsed.tracks)?
            };
            println!("{json}");
            Ok(())
        }
    }
}

fn print_info(file: &Path, stream: bool) -> Result<()> {
    let package = io::load_package(file, stream)?;

    println!("文件: {}", file.display());
    println!("加密: {}", if package.is_locked() { "是" } else { "否" });
    println!();
    println!("头部:");
    for (key, value) in &package.headers {
        println!("  {key}  {value}");
    }

    println!();
    println!("子文件 ({}):", package.subfiles.len());
    for (index, subfile) in package.subfiles.iter().enumerate() {
        let d = &subfile.descriptor;
        println!(
            "  #{index:<3} {:<32} {:<8} {:>10} 字节{}",
            d.name_lossy(),
            d.kind.to_string(),
            d.unencrypted_len,
            if d.encrypted { "  [加密]" } else { "" }
        );
    }
    Ok(())
}
