//! ID 生成
//!
//! - 订阅 ID：10 位 62 进制字符串（0-9, a-z, A-Z）
//! - 加载批次 ID：UUID v4，用于串联一次加载的日志

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// 62 进制字符集
const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 订阅 ID 长度
const ID_LENGTH: usize = 10;

/// 生成 10 位 62 进制 ID
///
/// 时间戳与随机数异或后转换为 62 进制。
///
/// # Example
///
/// ```
/// use chips_moduli::utils::id::generate_id;
///
/// let id = generate_id();
/// assert_eq!(id.len(), 10);
/// ```
pub fn generate_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let random: u64 = rand::thread_rng().gen();

    let mut value = timestamp ^ random;
    let mut result = String::with_capacity(ID_LENGTH);
    for _ in 0..ID_LENGTH {
        result.insert(0, BASE62_CHARS[(value % 62) as usize] as char);
        value /= 62;
    }
    result
}

/// 检查 ID 是否为合法的 10 位 62 进制字符串
///
/// ```
/// use chips_moduli::utils::id::is_valid_id;
///
/// assert!(is_valid_id("a1B2c3D4e5"));
/// assert!(!is_valid_id("too-short"));
/// ```
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// 生成 UUID v4 格式的加载批次 ID
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
