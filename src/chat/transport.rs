//! WebSocket 推送传输
//!
//! 薄传输层：读取文本/二进制（gzip）帧，解码 `{event, data}` 信封后
//! 交给推送合并器。单帧解码失败只记日志丢弃，接收环路继续；
//! 连接断开后返回，重连由调用方负责。

use crate::chat::error::Result;
use crate::chat::realtime::events::{parse_event, PushEvent};
use crate::chat::realtime::service::RealtimeMerger;
use crate::chat::serialization::{decompress_gzip, is_gzip};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// 推送信封
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// 把一帧原始字节解码为推送事件
///
/// 二进制帧按 gzip 魔数判断是否需要解压，随后与文本帧共用同一条
/// JSON 信封解析路径。
pub(crate) fn decode_frame(data: &[u8]) -> Result<PushEvent> {
    let plain;
    let bytes = if is_gzip(data) {
        plain = decompress_gzip(data)
            .map_err(|e| crate::chat::error::ChatError::Payload(format!("gzip 解压失败: {}", e)))?;
        &plain[..]
    } else {
        data
    };
    let envelope: PushEnvelope = serde_json::from_slice(bytes)?;
    parse_event(&envelope.event, &envelope.data)
}

/// 推送传输
pub struct PushTransport {
    merger: Arc<RealtimeMerger>,
}

impl PushTransport {
    pub fn new(merger: Arc<RealtimeMerger>) -> Self {
        Self { merger }
    }

    /// 连接推送服务器并阻塞在接收环路上，直到连接关闭或出错
    pub async fn run(&self, ws_url: &str) -> Result<()> {
        let (ws_stream, response) = connect_async(ws_url).await?;
        info!("[RT] ✅ 推送连接成功, 状态: {}", response.status());

        let (_write, mut read) = ws_stream.split();
        while let Some(frame) = read.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => self.dispatch(text.as_bytes()).await,
                Ok(WsMessage::Binary(data)) => self.dispatch(&data).await,
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    warn!("[RT] 👋 推送连接关闭: {:?}", frame);
                    break;
                }
                Err(e) => {
                    error!("[RT] 推送连接错误: {}", e);
                    return Err(e.into());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// 解码一帧并交给合并器。坏帧丢弃，不中断环路。
    async fn dispatch(&self, data: &[u8]) {
        let event = match decode_frame(data) {
            Ok(event) => event,
            Err(e) => {
                warn!("[RT] 丢弃无法解码的推送帧: {}", e);
                return;
            }
        };
        debug!("[RT] 📥 推送事件: {:?}", event);
        if let Err(e) = self.merger.handle_event(event).await {
            error!("[RT] 推送事件处理失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_text_frame() {
        let frame = br#"{"event":"typing","data":{"groupId":1,"accountId":"a","isTyping":true}}"#;
        let event = decode_frame(frame).unwrap();
        assert!(matches!(event, PushEvent::Typing { group_id: 1, .. }));
    }

    #[test]
    fn test_decode_gzip_binary_frame() {
        let frame = gzip(br#"{"event":"seen","data":{"groupId":9}}"#);
        let event = decode_frame(&frame).unwrap();
        assert_eq!(event, PushEvent::Seen { group_id: 9 });
    }

    #[test]
    fn test_bad_frames_rejected() {
        assert!(decode_frame(b"not json").is_err());
        assert!(decode_frame(br#"{"event":"unknown","data":{}}"#).is_err());
        // data 缺失时按空对象处理，必填字段校验照常生效
        assert!(decode_frame(br#"{"event":"seen"}"#).is_err());
    }
}
