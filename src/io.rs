//! 文件级辅助函数：读写 KFN 文件、导出子文件。

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::container::{self, Package};
use crate::error::{KfnError, Result};

/// 读取一个 KFN 文件。
///
/// `streaming` 为真时按需从文件中读取，否则先把整个文件读入内存。
pub fn load_package(path: &Path, streaming: bool) -> Result<Package> {
    let package = if streaming {
        let reader = BufReader::new(File::open(path)?);
        container::decode_from_reader(reader)?
    } else {
        let bytes = fs::read(path)?;
        container::decode(&bytes)?
    };

    log::info!(
        "[KFN 解码] 已读取 '{}': {} 个头部，{} 个子文件",
        path.display(),
        package.headers.len(),
        package.subfiles.len()
    );
    Ok(package)
}

pub fn save_package(path: &Path, package: &Package) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    container::encode_to_writer(package, &mut writer)?;
    writer.flush()?;
    log::info!("[KFN 编码] 文件已成功保存到: {}", path.display());
    Ok(())
}

/// `song.kfn` -> `song.unlocked.kfn`，放在输入文件旁边。
#[must_use]
pub fn unlocked_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy());
    input.with_file_name(format!("{stem}.unlocked.kfn"))
}

/// 把所有子文件写入 `dir`，返回写出的路径。
///
/// 子文件名只取最后一段，不会写到 `dir` 之外。仍处于加密状态的子文件原样写出。
pub fn write_subfiles(dir: &Path, package: &Package) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(package.subfiles.len());
    for (index, subfile) in package.subfiles.iter().enumerate() {
        let name = subfile.descriptor.name_lossy();
        let file_name = Path::new(&name)
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| KfnError::Custom(format!("子文件 #{index} 的名称无效: '{name}'")))?;

        let target = dir.join(file_name);
        if subfile.descriptor.encrypted {
            log::warn!("子文件 '{name}' 仍是加密状态，按原样导出");
        }
        fs::write(&target, &subfile.data)?;
        log::debug!("已导出 '{name}' ({} 字节)", subfile.data.len());
        written.push(target);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{HeaderValue, Subfile, SubfileType, keys};

    fn sample_package() -> Package {
        Package {
            headers: vec![
                (keys::TITLE, HeaderValue::Bytes(b"Sample".to_vec())),
                (keys::END_OF_HEADERS, HeaderValue::Int(u32::MAX)),
            ],
            subfiles: vec![
                Subfile::new("Song.ini", SubfileType::Song, b"[General]\r\n".to_vec()),
                Subfile::new("../escape.mp3", SubfileType::Audio, vec![7; 64]),
            ],
        }
    }

    #[test]
    fn test_save_then_load_both_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.kfn");
        let package = sample_package();

        save_package(&path, &package).unwrap();
        assert_eq!(load_package(&path, false).unwrap(), package);
        assert_eq!(load_package(&path, true).unwrap(), package);
    }

    #[test]
    fn test_unlocked_output_path() {
        assert_eq!(
            unlocked_output_path(Path::new("/music/song.kfn")),
            PathBuf::from("/music/song.unlocked.kfn")
        );
    }

    #[test]
    fn test_write_subfiles_stays_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let written = write_subfiles(&out, &sample_package()).unwrap();
        assert_eq!(written, vec![out.join("Song.ini"), out.join("escape.mp3")]);
        assert_eq!(fs::read(out.join("escape.mp3")).unwrap(), vec![7; 64]);
        assert!(!dir.path().join("escape.mp3").exists());
    }
}
