//! 세션 이벤트 전달
//!
//! 폴링 스레드는 레지스트리 락을 놓은 뒤 `SessionEvents`를 호출한다.
//! 콜백을 폴링 스레드 밖에서 처리하려면 `ChannelEvents`로 채널에 넘긴다.

use std::net::SocketAddr;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};

use crate::session::ConnectionId;

/// 연결 수명주기 콜백
///
/// 모든 메서드는 기본 구현이 비어있다.
pub trait SessionEvents: Send + Sync + 'static {
    /// 나가는 연결 성립
    fn on_connect(&self, _id: ConnectionId, _remote: SocketAddr) {}

    /// 나가는 연결 실패
    fn on_connect_error(&self, _id: ConnectionId, _remote: SocketAddr, _error: String) {}

    /// 들어오는 연결 수락
    fn on_accept(&self, _id: ConnectionId, _remote: SocketAddr) {}

    /// 데이터 수신 (소유권 이전)
    fn on_receive(&self, _id: ConnectionId, _data: Bytes) {}

    /// 송신 큐가 low watermark 아래로 내려감
    fn on_low_watermark(&self, _id: ConnectionId) {}

    /// 연결 끊김
    fn on_break(&self, _id: ConnectionId) {}
}

/// 아무것도 하지 않는 이벤트 처리기
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl SessionEvents for NoopEvents {}

/// 세션 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { id: ConnectionId, remote: SocketAddr },
    ConnectError { id: ConnectionId, remote: SocketAddr, error: String },
    Accepted { id: ConnectionId, remote: SocketAddr },
    Received { id: ConnectionId, data: Bytes },
    LowWatermark { id: ConnectionId },
    Broken { id: ConnectionId },
}

impl SessionEvent {
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            SessionEvent::Connected { id, .. }
            | SessionEvent::ConnectError { id, .. }
            | SessionEvent::Accepted { id, .. }
            | SessionEvent::Received { id, .. }
            | SessionEvent::LowWatermark { id }
            | SessionEvent::Broken { id } => *id,
        }
    }

    /// 이 연결의 마지막 이벤트인지
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::ConnectError { .. } | SessionEvent::Broken { .. }
        )
    }

    /// 처리기에 전달
    pub fn dispatch(self, handler: &dyn SessionEvents) {
        match self {
            SessionEvent::Connected { id, remote } => handler.on_connect(id, remote),
            SessionEvent::ConnectError { id, remote, error } => {
                handler.on_connect_error(id, remote, error)
            }
            SessionEvent::Accepted { id, remote } => handler.on_accept(id, remote),
            SessionEvent::Received { id, data } => handler.on_receive(id, data),
            SessionEvent::LowWatermark { id } => handler.on_low_watermark(id),
            SessionEvent::Broken { id } => handler.on_break(id),
        }
    }
}

/// 이벤트를 채널로 넘기는 처리기
///
/// 수신측이 사라지면 이벤트는 버려진다.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: Sender<SessionEvent>,
}

impl ChannelEvents {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// 무제한 채널과 함께 생성
    pub fn unbounded() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl SessionEvents for ChannelEvents {
    fn on_connect(&self, id: ConnectionId, remote: SocketAddr) {
        self.forward(SessionEvent::Connected { id, remote });
    }

    fn on_connect_error(&self, id: ConnectionId, remote: SocketAddr, error: String) {
        self.forward(SessionEvent::ConnectError { id, remote, error });
    }

    fn on_accept(&self, id: ConnectionId, remote: SocketAddr) {
        self.forward(SessionEvent::Accepted { id, remote });
    }

    fn on_receive(&self, id: ConnectionId, data: Bytes) {
        self.forward(SessionEvent::Received { id, data });
    }

    fn on_low_watermark(&self, id: ConnectionId) {
        self.forward(SessionEvent::LowWatermark { id });
    }

    fn on_break(&self, id: ConnectionId) {
        self.forward(SessionEvent::Broken { id });
    }
}
