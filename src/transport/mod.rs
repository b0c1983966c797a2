//! 신뢰성 데이터그램 전송 계층 인터페이스
//!
//! 세션 매니저는 재전송/순서 보장/암호화를 직접 하지 않고 이 trait으로
//! 추상화된 전송 계층을 사용한다. 소켓 생성, 연결/수락, 송수신,
//! 소켓 옵션, 준비 상태 멀티플렉싱을 제공해야 한다.

pub mod memory;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::TransmissionMode;

pub use memory::{MemoryNetwork, MemoryTransport};

/// 전송 계층 소켓 핸들
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u32);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 소켓 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Init,
    Opened,
    Listening,
    Connecting,
    Connected,
    Broken,
    Closed,
    NonExistent,
}

impl SocketStatus {
    /// 더 이상 사용할 수 없는 상태
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            SocketStatus::Broken | SocketStatus::Closed | SocketStatus::NonExistent
        )
    }
}

/// 소켓 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    TransmissionMode(TransmissionMode),
    ReuseAddr(bool),
    /// false면 send가 블로킹하지 않음
    SendBlocking(bool),
    /// false면 recv가 블로킹하지 않음
    RecvBlocking(bool),
    /// close 시 미전송 데이터 대기 시간 (0이면 즉시)
    Linger(Duration),
    /// 최대 세그먼트 크기
    Mss(usize),
    /// 최대 대역폭 (bytes/sec, 0 = 무제한)
    MaxBandwidth(u64),
    /// 입력 대역폭 (bytes/sec, 0 = 자동)
    InputBandwidth(u64),
    /// 오버헤드 대역폭 (%)
    OverheadBandwidth(u32),
    /// 수신 버퍼 크기 (바이트)
    RecvBuffer(usize),
}

/// 멀티플렉서 등록 관심사
///
/// 에러 준비 상태는 항상 포함된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READ: Interest = Interest {
        read: true,
        write: false,
    };

    pub const READ_WRITE: Interest = Interest {
        read: true,
        write: true,
    };
}

/// 준비 상태 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub id: SocketId,
    pub readable: bool,
    pub writable: bool,
    /// 연결 끊김/에러
    pub error: bool,
}

/// 전송 계층 에러 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// 지금은 진행할 수 없음 (재시도 가능)
    WouldBlock,
    ConnectionLost,
    ConnectionRefused,
    AddrInUse,
    InvalidSocket,
    InvalidOperation,
    Other,
}

/// 전송 계층 에러 (코드 + 메시지)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code})")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub code: i32,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        let code = match kind {
            TransportErrorKind::WouldBlock => 6002,
            TransportErrorKind::ConnectionLost => 2001,
            TransportErrorKind::ConnectionRefused => 1002,
            TransportErrorKind::AddrInUse => 5001,
            TransportErrorKind::InvalidSocket => 5004,
            TransportErrorKind::InvalidOperation => 5000,
            TransportErrorKind::Other => -1,
        };
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn would_block() -> Self {
        Self::new(TransportErrorKind::WouldBlock, "operation would block")
    }

    pub fn invalid_socket(id: SocketId) -> Self {
        Self::new(
            TransportErrorKind::InvalidSocket,
            format!("invalid socket {}", id),
        )
    }

    pub fn is_would_block(&self) -> bool {
        self.kind == TransportErrorKind::WouldBlock
    }

    /// 연결을 더 이상 쓸 수 없음을 나타내는지
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::ConnectionLost
                | TransportErrorKind::ConnectionRefused
                | TransportErrorKind::InvalidSocket
        )
    }
}

/// 전송 계층 결과 타입
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// 신뢰성 데이터그램 전송 계층
///
/// 구현체 하나가 멀티플렉서 하나를 가진다. `poll_*` 호출은 그 멀티플렉서에
/// 대한 등록/대기이며, `wake`는 진행 중인 `poll_wait`를 즉시 깨운다.
pub trait Transport: Send + Sync + 'static {
    /// 새 소켓 생성
    fn socket(&self) -> TransportResult<SocketId>;

    fn set_option(&self, id: SocketId, option: SocketOption) -> TransportResult<()>;

    /// 바인드 후 실제 바인드된 주소 반환
    fn bind(&self, id: SocketId, addr: SocketAddr) -> TransportResult<SocketAddr>;

    fn listen(&self, id: SocketId, backlog: usize) -> TransportResult<()>;

    /// 대기 중인 연결 수락 (없으면 WouldBlock)
    fn accept(&self, id: SocketId) -> TransportResult<(SocketId, SocketAddr)>;

    /// 비동기 연결 시작, 선택된 로컬 주소 반환
    ///
    /// 완료/실패는 준비 상태와 `status`로 보고된다.
    fn connect(&self, id: SocketId, remote: SocketAddr) -> TransportResult<SocketAddr>;

    /// 보낸 바이트 수 반환 (일부만 보낼 수 있음)
    fn send(&self, id: SocketId, data: &[u8]) -> TransportResult<usize>;

    /// 받은 바이트 수 반환 (없으면 WouldBlock)
    fn recv(&self, id: SocketId, buf: &mut [u8]) -> TransportResult<usize>;

    fn status(&self, id: SocketId) -> SocketStatus;

    /// 소켓의 마지막 에러
    fn last_error(&self, id: SocketId) -> Option<TransportError>;

    /// 협상된 최대 세그먼트 크기
    fn max_segment_size(&self, id: SocketId) -> TransportResult<usize>;

    /// 수신 대기 중인 패킷 수
    fn pending_recv(&self, id: SocketId) -> usize;

    fn close(&self, id: SocketId) -> TransportResult<()>;

    fn poll_add(&self, id: SocketId, interest: Interest) -> TransportResult<()>;

    fn poll_modify(&self, id: SocketId, interest: Interest) -> TransportResult<()>;

    fn poll_remove(&self, id: SocketId) -> TransportResult<()>;

    /// 등록된 소켓 중 준비된 것을 최대 `timeout` 동안 대기
    fn poll_wait(&self, timeout: Duration) -> TransportResult<Vec<Readiness>>;

    fn wake(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TransportError::would_block().is_would_block());
        assert!(!TransportError::would_block().is_connection_lost());

        let lost = TransportError::new(TransportErrorKind::ConnectionLost, "peer closed");
        assert!(lost.is_connection_lost());
        assert_eq!(lost.to_string(), "peer closed (2001)");
    }

    #[test]
    fn test_dead_status() {
        assert!(SocketStatus::Broken.is_dead());
        assert!(SocketStatus::NonExistent.is_dead());
        assert!(!SocketStatus::Connecting.is_dead());
    }
}
