//! # KFN 解锁
//!
//! 1. 读取 `FLID` 密钥，解密所有带加密标志的子文件，然后把密钥清零。
//! 2. 把发布权限头部 `RGHT` 置零。
//! 3. 规范化歌曲配置子文件。
//!
//! 解密要么全部成功，要么什么都不改。对已解锁的包再次调用不会产生变化。

pub mod decrypter;
pub mod song_config;

pub use decrypter::{UNLOCK_KEY_LEN, UnlockKey, decrypt_subfile};
pub use song_config::{normalize_song_config, song_config_text};

use crate::container::{HeaderValue, Package, Subfile, SubfileType, keys};
use crate::error::{SongConfigError, UnlockError};

/// 解锁时的可选步骤。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockOptions {
    /// 把 `RGHT` 头部置零
    pub reset_publishing_rights: bool,
    /// 重新写出 `Song.ini`
    pub normalize_song_config: bool,
    /// 规范化时只保留这些编号的效果段。`None` 表示不过滤。
    pub allowed_effect_ids: Option<Vec<u32>>,
}

impl Default for UnlockOptions {
    fn default() -> Self {
        Self {
            reset_publishing_rights: true,
            normalize_song_config: true,
            allowed_effect_ids: None,
        }
    }
}

/// 使用默认选项解锁。
pub fn unlock(package: Package) -> Result<Package, UnlockError> {
    unlock_with_options(package, &UnlockOptions::default())
}

pub fn unlock_with_options(
    mut package: Package,
    options: &UnlockOptions,
) -> Result<Package, UnlockError> {
    match UnlockKey::from_package(&package)? {
        Some(key) => {
            // 先全部解密，全部成功后才写回
            let decrypted = decrypt_all(&key, &package.subfiles)?;
            let mut count = 0;
            for (subfile, plain) in package.subfiles.iter_mut().zip(decrypted) {
                if let Some(plain) = plain {
                    subfile.replace_plain_data(plain);
                    count += 1;
                }
            }
            package.set_header(
                keys::UNLOCK_KEY,
                HeaderValue::Bytes(vec![0; UNLOCK_KEY_LEN]),
            );
            log::info!("[KFN 解锁] 已解密 {count} 个子文件，密钥已清除");
        }
        None => {
            let still_encrypted = package
                .subfiles
                .iter()
                .filter(|s| s.descriptor.encrypted)
                .count();
            if still_encrypted > 0 {
                log::warn!(
                    "[KFN 解锁] 包中没有密钥，但有 {still_encrypted} 个子文件带加密标志，保持原样"
                );
            } else {
                log::debug!("[KFN 解锁] 包中没有密钥，跳过解密");
            }
        }
    }

    if options.reset_publishing_rights && package.header(keys::PUBLISHING_RIGHTS).is_some() {
        package.set_header(keys::PUBLISHING_RIGHTS, HeaderValue::Int(0));
    }

    if options.normalize_song_config {
        let allowed = options.allowed_effect_ids.as_deref();
        for (index, subfile) in package.subfiles.iter_mut().enumerate() {
            if subfile.descriptor.kind != SubfileType::Song || subfile.descriptor.encrypted {
                continue;
            }
            // 配置无法解析时只跳过这一步，不影响整体解锁
            if let Err(e) = normalize_subfile(index, subfile, allowed) {
                log::warn!("[KFN 解锁] {e}，保留原始配置");
            }
        }
    }

    Ok(package)
}

fn normalize_subfile(
    index: usize,
    subfile: &mut Subfile,
    allowed_effect_ids: Option<&[u32]>,
) -> Result<(), SongConfigError> {
    let normalized = normalize_song_config(&subfile.data, allowed_effect_ids)
        .map_err(|source| SongConfigError { index, source })?;
    subfile.replace_plain_data(normalized);
    Ok(())
}

/// 解密所有带加密标志的子文件。未加密的位置为 `None`。
fn decrypt_all(key: &UnlockKey, subfiles: &[Subfile]) -> Result<Vec<Option<Vec<u8>>>, UnlockError> {
    let decrypt_one = |(index, subfile): (usize, &Subfile)| {
        if subfile.descriptor.encrypted {
            decrypt_subfile(key, index, subfile).map(Some)
        } else {
            Ok(None)
        }
    };

    #[cfg(feature = "rayon")]
    let results: Result<Vec<_>, UnlockError> = {
        use rayon::prelude::*;
        subfiles.par_iter().enumerate().map(decrypt_one).collect()
    };

    #[cfg(not(feature = "rayon"))]
    let results: Result<Vec<_>, UnlockError> =
        subfiles.iter().enumerate().map(decrypt_one).collect();

    results
}

#[cfg(test)]
mod tests {
    use super::decrypter::tests::{TEST_KEY, encrypt_subfile};
    use super::*;
    use crate::container::{decode, encode};

    const SONG_INI: &[u8] = b"[General]\r\nTitle=Test\r\n\r\n[Eff1]\r\nID=51\r\n\
        Sync0=0,100,250\r\nText0=Hello World\r\n";

    fn plain_subfiles() -> Vec<Subfile> {
        vec![
            Subfile::new("Song.ini", SubfileType::Song, SONG_INI.to_vec()),
            Subfile::new("song.mp3", SubfileType::Audio, (0..=255).cycle().take(1000).collect()),
            Subfile::new("bg.jpg", SubfileType::Image, vec![0x42; 33]),
        ]
    }

    fn locked_package() -> Package {
        let subfiles = plain_subfiles();
        Package {
            headers: vec![
                (keys::TITLE, HeaderValue::Bytes(b"Test".to_vec())),
                (keys::PUBLISHING_RIGHTS, HeaderValue::Int(1)),
                (keys::UNLOCK_KEY, HeaderValue::Bytes(TEST_KEY.to_vec())),
                (keys::END_OF_HEADERS, HeaderValue::Int(u32::MAX)),
            ],
            // 配置和音频加密，图片保持明文
            subfiles: vec![
                encrypt_subfile(&TEST_KEY, &subfiles[0]),
                encrypt_subfile(&TEST_KEY, &subfiles[1]),
                subfiles[2].clone(),
            ],
        }
    }

    #[test]
    fn test_unlock_decrypts_and_scrubs_key() {
        let original = plain_subfiles();
        let unlocked = unlock(locked_package()).unwrap();

        assert_eq!(unlocked.unlock_key(), Some(&[0u8; 16][..]));
        assert!(!unlocked.is_locked());
        assert_eq!(
            unlocked.header(keys::PUBLISHING_RIGHTS),
            Some(&HeaderValue::Int(0))
        );

        for subfile in &unlocked.subfiles {
            assert!(!subfile.descriptor.encrypted);
            assert_eq!(subfile.data.len(), subfile.descriptor.unencrypted_len as usize);
            assert_eq!(subfile.data.len(), subfile.descriptor.disk_len as usize);
        }
        assert_eq!(unlocked.subfiles[1].data, original[1].data);
        assert_eq!(unlocked.subfiles[2].data, original[2].data);

        let text = song_config_text(&unlocked).unwrap();
        assert!(text.contains("Text0=Hello World"), "内容: {text}");
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let once = unlock(locked_package()).unwrap();
        let twice = unlock(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unlocked_package_survives_round_trip() {
        let unlocked = unlock(locked_package()).unwrap();
        let decoded = decode(&encode(&unlocked).unwrap()).unwrap();
        assert_eq!(decoded, unlocked);
    }

    #[test]
    fn test_crypto_failure_aborts_everything() {
        let mut package = locked_package();
        package.subfiles[1].data.truncate(999);

        let err = unlock(package).unwrap_err();
        assert!(
            matches!(err, UnlockError::CryptoFailure { index: 1, .. }),
            "收到的错误: {err:?}"
        );
    }

    #[test]
    fn test_wrong_key_size_is_rejected() {
        let mut package = locked_package();
        package.set_header(keys::UNLOCK_KEY, HeaderValue::Bytes(vec![1; 8]));
        assert!(matches!(
            unlock(package),
            Err(UnlockError::InvalidKey { len: 8 })
        ));
    }

    #[test]
    fn test_broken_song_config_does_not_block_unlock() {
        let mut subfiles = plain_subfiles();
        subfiles[0] = Subfile::new("Song.ini", SubfileType::Song, b"[Eff1\r\nSync0=1".to_vec());
        let package = Package {
            headers: vec![
                (keys::UNLOCK_KEY, HeaderValue::Bytes(TEST_KEY.to_vec())),
                (keys::END_OF_HEADERS, HeaderValue::Int(u32::MAX)),
            ],
            subfiles: subfiles
                .iter()
                .map(|s| encrypt_subfile(&TEST_KEY, s))
                .collect(),
        };

        let unlocked = unlock(package).unwrap();
        assert_eq!(unlocked.subfiles[0].data, b"[Eff1\r\nSync0=1");
        assert_eq!(unlocked.subfiles[1].data, subfiles[1].data);
    }

    #[test]
    fn test_options_can_disable_steps() {
        let options = UnlockOptions {
            reset_publishing_rights: false,
            normalize_song_config: false,
            allowed_effect_ids: None,
        };
        let unlocked = unlock_with_options(locked_package(), &options).unwrap();

        assert_eq!(
            unlocked.header(keys::PUBLISHING_RIGHTS),
            Some(&HeaderValue::Int(1))
        );
        assert_eq!(unlocked.subfiles[0].data, SONG_INI);
    }

    #[test]
    fn test_without_key_encrypted_subfiles_stay_untouched() {
        let mut package = locked_package();
        package.set_header(keys::UNLOCK_KEY, HeaderValue::Bytes(vec![0; 16]));
        let before = package.subfiles.clone();

        let after = unlock(package).unwrap();
        assert_eq!(after.subfiles[0], before[0]);
        assert_eq!(after.subfiles[1], before[1]);
    }
}
