//! 推送帧的压缩处理
//!
//! 推送通道的二进制帧是 gzip 压缩的 JSON，文本帧是明文 JSON。

use flate2::read::GzDecoder;
use std::io::Read;

/// gzip 魔数（二进制帧是否压缩靠它判断）
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 数据是否带 gzip 魔数
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == GZIP_MAGIC[0] && data[1] == GZIP_MAGIC[1]
}

/// 解压 gzip 数据
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
