use directories::ProjectDirs;
use ini::Ini;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::unlock::UnlockOptions;

const LOGGING_SECTION: &str = "Logging";
const UNLOCK_SECTION: &str = "Unlock";
// 同一个键的多个值用这个分隔符连接后写入 INI
const MULTI_VALUE_DELIMITER: &str = ";;;";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub enable_file_log: bool,
    pub file_log_level: LevelFilter,
    pub console_log_level: LevelFilter,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enable_file_log: false,
            file_log_level: LevelFilter::Info,
            console_log_level: LevelFilter::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockSettings {
    pub reset_publishing_rights: bool,
    pub normalize_song_config: bool,
    /// 为空表示保留所有效果段
    pub allowed_effect_ids: Vec<u32>,
}

impl Default for UnlockSettings {
    fn default() -> Self {
        let defaults = UnlockOptions::default();
        Self {
            reset_publishing_rights: defaults.reset_publishing_rights,
            normalize_song_config: defaults.normalize_song_config,
            allowed_effect_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSettings {
    pub log_settings: LogSettings,
    pub unlock_settings: UnlockSettings,
}

fn read_bool(conf: &Ini, section: &str, key: &str, default: bool) -> bool {
    conf.section(Some(section))
        .and_then(|s| s.get(key))
        .and_then(|s| s.trim().parse::<bool>().ok())
        .unwrap_or(default)
}

fn read_level(conf: &Ini, key: &str, default: LevelFilter) -> LevelFilter {
    conf.section(Some(LOGGING_SECTION))
        .and_then(|s| s.get(key))
        .and_then(|s| LevelFilter::from_str(s.trim()).ok())
        .unwrap_or(default)
}

fn read_effect_ids(conf: &Ini) -> Vec<u32> {
    let Some(raw) = conf
        .section(Some(UNLOCK_SECTION))
        .and_then(|s| s.get("AllowedEffectIds"))
    else {
        return Vec::new();
    };

    raw.split(MULTI_VALUE_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<u32>() {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("配置中的效果编号 '{s}' 无效: {e}，已忽略");
                None
            }
        })
        .collect()
}

impl AppSettings {
    fn config_path() -> Option<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("com", "KfnHelper", "KfnHelper") {
            let config_dir = proj_dirs.config_dir();
            if !config_dir.exists() {
                if let Err(e) = fs::create_dir_all(config_dir) {
                    log::error!("无法创建配置目录 {config_dir:?}: {e}");
                    return None;
                }
            }
            Some(config_dir.join("kfn_helper.ini"))
        } else {
            log::error!("无法获取项目配置目录路径。");
            None
        }
    }

    /// 从默认位置加载配置。文件不存在时写出一份默认配置。
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            log::warn!("无法确定配置文件路径。将使用运行时默认配置。");
            return Self::default();
        };

        if path.exists() {
            match Self::load_from_path(&path) {
                Ok(settings) => return settings,
                Err(e) => {
                    log::error!("加载配置文件 {path:?} 失败: {e}。将使用默认配置。");
                }
            }
        } else {
            log::info!("配置文件 {path:?} 未找到。将创建并使用默认配置。");
            let default_settings = Self::default();
            if let Err(e) = default_settings.save_to_path(&path) {
                log::error!("无法保存初始默认配置文件到 {path:?}: {e}");
            }
            return default_settings;
        }

        Self::default()
    }

    /// 从指定文件加载配置。缺失或无法识别的键取默认值。
    pub fn load_from_path(path: &Path) -> Result<Self, ini::Error> {
        let conf = Ini::load_from_file(path)?;
        let log_defaults = LogSettings::default();
        let unlock_defaults = UnlockSettings::default();

        let settings = Self {
            log_settings: LogSettings {
                enable_file_log: read_bool(
                    &conf,
                    LOGGING_SECTION,
                    "EnableFileLog",
                    log_defaults.enable_file_log,
                ),
                file_log_level: read_level(&conf, "FileLogLevel", log_defaults.file_log_level),
                console_log_level: read_level(
                    &conf,
                    "ConsoleLogLevel",
                    log_defaults.console_log_level,
                ),
            },
            unlock_settings: UnlockSettings {
                reset_publishing_rights: read_bool(
                    &conf,
                    UNLOCK_SECTION,
                    "ResetPublishingRights",
                    unlock_defaults.reset_publishing_rights,
                ),
                normalize_song_config: read_bool(
                    &conf,
                    UNLOCK_SECTION,
                    "NormalizeSongConfig",
                    unlock_defaults.normalize_song_config,
                ),
                allowed_effect_ids: read_effect_ids(&conf),
            },
        };

        log::debug!("从 {path:?} 加载配置成功。");
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), ini::Error> {
        if let Some(path) = Self::config_path() {
            self.save_to_path(&path)
        } else {
            let err_msg = "无法确定配置文件路径，保存失败。".to_string();
            log::error!("{err_msg}");
            Err(ini::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                err_msg,
            )))
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ini::Error> {
        let mut conf = Ini::new();
        conf.with_section(Some(LOGGING_SECTION))
            .set(
                "EnableFileLog",
                self.log_settings.enable_file_log.to_string(),
            )
            .set("FileLogLevel", self.log_settings.file_log_level.to_string())
            .set(
                "ConsoleLogLevel",
                self.log_settings.console_log_level.to_string(),
            );

        let effect_ids: Vec<String> = self
            .unlock_settings
            .allowed_effect_ids
            .iter()
            .map(ToString::to_string)
            .collect();
        conf.with_section(Some(UNLOCK_SECTION))
            .set(
                "ResetPublishingRights",
                self.unlock_settings.reset_publishing_rights.to_string(),
            )
            .set(
                "NormalizeSongConfig",
                self.unlock_settings.normalize_song_config.to_string(),
            )
            .set("AllowedEffectIds", effect_ids.join(MULTI_VALUE_DELIMITER));

        match conf.write_to_file(path) {
            Ok(()) => {
                log::info!("配置已保存到 {path:?}。");
                Ok(())
            }
            Err(write_error) => {
                log::error!("保存配置到 {path:?} 失败: {write_error}");
                Err(ini::Error::Io(write_error))
            }
        }
    }

    /// 转换为解锁引擎使用的选项。
    #[must_use]
    pub fn to_unlock_options(&self) -> UnlockOptions {
        let settings = &self.unlock_settings;
        UnlockOptions {
            reset_publishing_rights: settings.reset_publishing_rights,
            normalize_song_config: settings.normalize_song_config,
            allowed_effect_ids: (!settings.allowed_effect_ids.is_empty())
                .then(|| settings.allowed_effect_ids.clone()),
        }
    }
}
