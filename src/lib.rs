//! # ANT Transport
//!
//! 신뢰성 데이터그램 전송 위의 세션 계층
//!
//! ## 핵심 특징
//! - **시그널링 코덱**: bencode 정수/바이트 문자열 기반 자기 기술형 프레임
//! - **증분 디코딩**: 바이트를 누적하고 완성된 프레임만 추출
//! - **세션 매니저**: 연결별 송신 큐와 준비 상태 폴링 루프
//! - **백프레셔**: High/Low watermark 혼잡 상태와 LWM 이벤트
//! - **채널 통계**: 고정 용량 기록 기반 이동 평균/극값

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod session;
pub mod signaling;
pub mod stats;
pub mod transport;

pub use codec::{AllocatedStatus, Command, DecodeError, Frame, FrameDecoder};
pub use config::{BufferLimits, SessionConfig, TransmissionMode};
pub use error::{Error, Result};
pub use events::{ChannelEvents, NoopEvents, SessionEvent, SessionEvents};
pub use logging::{LogConfig, Subsystem};
pub use session::{ConnectionId, ConnectionInfo, ConnectionState, SendStatus, SessionManager};
pub use signaling::SignalingStreams;
pub use stats::{ChannelStats, StatsSnapshot};
pub use transport::{MemoryNetwork, MemoryTransport, SocketId, Transport, TransportError};

/// 프로토콜 major 버전
pub const MAJOR_VERSION: i32 = 1;

/// 프로토콜 minor 버전
pub const MINOR_VERSION: i32 = 2;

/// 메시지 최대 크기 (바이트)
pub const MAX_MESSAGE_LEN: usize = 10_000_000;

/// 바이트 문자열 최대 길이
pub const MAX_BYTE_STRING_LEN: usize = 10_000_000;

/// 커맨드 이름 최대 길이
pub const COMMAND_MAX_LEN: usize = 9;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 3010;

/// 기본 최대 세그먼트 크기 (바이트)
pub const DEFAULT_MSS: usize = 1360;

/// 수신 대기 크기를 모를 때의 수신 버퍼 (바이트)
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 50_000;

/// 지표별 통계 기록 용량
pub const STATS_HISTORY_CAPACITY: usize = 100;
