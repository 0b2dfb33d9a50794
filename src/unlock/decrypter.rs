//! KFN 子文件的 AES-128 ECB 解密。
//!
//! 密钥直接存放在容器的 `FLID` 头部里。没有初始化向量，分组之间没有链接，
//! 也不依赖任何填充方案：解密后按目录中记录的未加密长度截断即可。

use aes::Aes128;
use cipher::{BlockDecryptMut, KeyInit};
use block_padding::NoPadding;
use ecb::Decryptor as EcbModeDecryptor;

use crate::container::{HeaderValue, Package, Subfile, keys};
use crate::error::UnlockError;

const AES_BLOCK_SIZE: usize = 16;
pub const UNLOCK_KEY_LEN: usize = 16;

/// 从 `FLID` 头部读出的16字节密钥。
#[derive(Clone, PartialEq, Eq)]
pub struct UnlockKey([u8; UNLOCK_KEY_LEN]);

impl UnlockKey {
    #[must_use]
    pub const fn new(bytes: [u8; UNLOCK_KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; UNLOCK_KEY_LEN] {
        &self.0
    }

    /// 读取包中的密钥。头部缺失或全零时返回 `None`，表示无需解密。
    pub fn from_package(package: &Package) -> Result<Option<Self>, UnlockError> {
        match package.header(keys::UNLOCK_KEY) {
            None => Ok(None),
            Some(HeaderValue::Int(0)) => Ok(None),
            Some(HeaderValue::Int(_)) => Err(UnlockError::InvalidKey { len: 4 }),
            Some(HeaderValue::Bytes(bytes)) if bytes.iter().all(|&b| b == 0) => Ok(None),
            Some(HeaderValue::Bytes(bytes)) => <[u8; UNLOCK_KEY_LEN]>::try_from(bytes.as_slice())
                .map(|key| Some(Self(key)))
                .map_err(|_| UnlockError::InvalidKey { len: bytes.len() }),
        }
    }
}

// 不在日志里打印密钥本身
impl std::fmt::Debug for UnlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UnlockKey(..)")
    }
}

/// 解密一个子文件，返回截断到未加密长度的明文。不修改输入。
pub fn decrypt_subfile(
    key: &UnlockKey,
    index: usize,
    subfile: &Subfile,
) -> Result<Vec<u8>, UnlockError> {
    let failure = |reason: String| UnlockError::CryptoFailure {
        index,
        name: subfile.descriptor.name_lossy(),
        reason,
    };

    if subfile.data.len() % AES_BLOCK_SIZE != 0 {
        return Err(failure(format!(
            "加密数据长度 {} 不是 {AES_BLOCK_SIZE} 的倍数",
            subfile.data.len()
        )));
    }

    let decryptor = EcbModeDecryptor::<Aes128>::new_from_slice(key.as_bytes())
        .map_err(|e| failure(format!("无法创建解密器: {e}")))?;

    let mut buffer = subfile.data.clone();
    let plaintext = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| failure(format!("解密失败: {e:?}")))?;

    let wanted = subfile.descriptor.unencrypted_len as usize;
    if plaintext.len() < wanted {
        return Err(failure(format!(
            "解密后只有 {} 字节，少于声明的 {wanted} 字节",
            plaintext.len()
        )));
    }

    buffer.truncate(wanted);
    Ok(buffer)
}
