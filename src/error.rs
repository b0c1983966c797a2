//! 에러 타입 정의

use std::net::SocketAddr;

use thiserror::Error;

use crate::codec::DecodeError;
use crate::transport::{SocketId, TransportError};

/// ANT 세션 계층 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("전송 계층 에러 ({op}): {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("알 수 없는 연결: {0}")]
    UnknownConnection(SocketId),

    #[error("이미 리슨 중: {0}")]
    AlreadyListening(SocketAddr),

    #[error("세션이 이미 실행 중")]
    AlreadyRunning,

    #[error("송신 버퍼가 비어있지 않음: connection={0}")]
    BufferNotEmpty(SocketId),

    #[error("유효하지 않은 워터마크: high={high}, low={low}")]
    InvalidWatermarks { high: usize, low: usize },

    #[error("프레임 디코딩 에러: {0}")]
    Decode(#[from] DecodeError),
}

impl Error {
    /// 전송 계층 호출 실패 래핑
    pub fn transport(op: &'static str, source: TransportError) -> Self {
        Error::Transport { op, source }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
