use chrono::Local;
use directories::ProjectDirs;
use fern::Dispatch;
use log::LevelFilter;
use std::fs;
use std::path::PathBuf;

fn get_log_file_path() -> Result<PathBuf, String> {
    if let Some(proj_dirs) = ProjectDirs::from("com", "KfnHelper", "KfnHelper") {
        let log_dir = proj_dirs.data_local_dir();
        if !log_dir.exists() {
            fs::create_dir_all(log_dir)
                .map_err(|e| format!("无法创建日志目录 {log_dir:?}: {e}"))?;
        }
        Ok(log_dir.join("kfn_helper.log"))
    } else {
        let current_dir_log_path = PathBuf::from("kfn_helper.log");
        eprintln!("无法获取项目日志目录，将尝试在当前目录创建日志: {current_dir_log_path:?}");
        Ok(current_dir_log_path)
    }
}

/// 初始化全局日志：控制台输出到标准错误，可选地同时写入日志文件。
///
/// 两个输出各有自己的级别。重复调用只会打印一条错误，不会替换已有的日志记录器。
pub fn init_global_logger(
    console_level: LevelFilter,
    enable_file_log: bool,
    file_level: LevelFilter,
) {
    let base_dispatch = Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
                record.level(),
                message
            ));
        })
        // 库代码只输出自己的日志
        .level(LevelFilter::Warn)
        .level_for("kfn_helper", console_level.max(file_level));

    let console_dispatch = Dispatch::new()
        .level(console_level)
        .chain(std::io::stderr());

    let mut final_dispatch = base_dispatch.chain(console_dispatch);
    let mut opened_log_file = None;

    if enable_file_log {
        let log_file_path = match get_log_file_path() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("获取日志文件路径失败: {e}。将写入当前目录。");
                PathBuf::from("kfn_helper_fallback.log")
            }
        };

        match fern::log_file(&log_file_path) {
            Ok(log_file) => {
                final_dispatch =
                    final_dispatch.chain(Dispatch::new().level(file_level).chain(log_file));
                opened_log_file = Some(log_file_path);
            }
            Err(e) => {
                eprintln!("无法打开日志文件 {log_file_path:?}: {e}。文件日志将被禁用。");
            }
        }
    }

    if let Err(e) = final_dispatch.apply() {
        eprintln!("日志记录器初始化失败: {e}");
    } else {
        match opened_log_file {
            Some(path) => log::debug!("日志记录器已初始化。日志文件: {path:?}"),
            None => log::debug!("日志记录器已初始化，文件日志未启用。"),
        }
    }
}
