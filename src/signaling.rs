//! 연결별 시그널링 스트림
//!
//! 수신 콜백으로 들어온 바이트 조각을 연결별 `FrameDecoder`에 모아
//! 완성된 프레임만 돌려준다.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::codec::{Frame, FrameDecoder};
use crate::session::ConnectionId;
use crate::Result;

/// 연결별 디코더 모음
#[derive(Debug, Default)]
pub struct SignalingStreams {
    streams: Mutex<HashMap<ConnectionId, FrameDecoder>>,
}

impl SignalingStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// 바이트를 추가하고 완성된 프레임을 모두 추출
    ///
    /// 디코딩 에러가 나면 해당 스트림을 버리고 `Error::Decode`를 돌려준다.
    /// 호출자는 연결을 닫아야 한다.
    pub fn ingest(&self, id: ConnectionId, data: &[u8]) -> Result<Vec<Frame>> {
        let mut streams = self.streams.lock();
        let decoder = streams.entry(id).or_default();
        decoder.feed(data);

        let mut frames = Vec::new();
        loop {
            match decoder.extract() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                Err(e) => {
                    warn!("connection({}) 시그널링 스트림 손상: {}", id, e);
                    streams.remove(&id);
                    return Err(e.into());
                }
            }
        }
    }

    /// 연결 종료 시 스트림 제거
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.streams.lock().remove(&id).is_some()
    }

    /// 아직 프레임이 되지 못한 바이트 수
    pub fn buffered(&self, id: ConnectionId) -> usize {
        self.streams.lock().get(&id).map_or(0, FrameDecoder::len)
    }

    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Command, DecodeError};
    use crate::transport::SocketId;
    use crate::Error;

    #[test]
    fn test_streams_are_independent() {
        let streams = SignalingStreams::new();
        let a = SocketId(1);
        let b = SocketId(2);
        let frame = Frame::data(&b"HELLO"[..], 1).encode();

        assert!(streams.ingest(a, &frame[..10]).unwrap().is_empty());
        assert!(streams.ingest(b, &frame[..3]).unwrap().is_empty());
        assert_eq!(streams.buffered(a), 10);

        let frames = streams.ingest(a, &frame[10..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), Some(Command::Data));
        assert_eq!(streams.buffered(a), 0);
        assert_eq!(streams.buffered(b), 3);
        assert_eq!(streams.len(), 2);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let streams = SignalingStreams::new();
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&Frame::allocate("peer-1").encode());
        chunk.extend_from_slice(&Frame::linked().encode());
        chunk.extend_from_slice(&Frame::open().encode()[..4]);

        let frames = streams.ingest(SocketId(9), &chunk).unwrap();
        let commands: Vec<_> = frames.iter().map(|f| f.command()).collect();
        assert_eq!(commands, vec![Some(Command::Allocate), Some(Command::Linked)]);
        assert_eq!(streams.buffered(SocketId(9)), 4);
    }

    #[test]
    fn test_corrupt_stream_is_dropped() {
        let streams = SignalingStreams::new();
        let id = SocketId(5);
        assert!(matches!(
            streams.ingest(id, b"i5ei1ei2ei6x0"),
            Err(Error::Decode(DecodeError::InvalidInteger))
        ));
        assert_eq!(streams.buffered(id), 0);
        assert!(streams.is_empty());
        assert!(!streams.remove(id));
    }
}
