//! 세션 설정

use std::time::Duration;

use crate::{DEFAULT_MSS, DEFAULT_RECV_BUFFER_SIZE};

/// 전송 모드 (SRT transtype 대응)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionMode {
    /// 라이브 스트림 (메시지 크기 제한, 지연 우선)
    Live,
    /// 파일/벌크 전송 (처리량 우선)
    File,
}

/// 연결별 송신 버퍼 제한
///
/// `None`은 제한 없음
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferLimits {
    /// 큐에 쌓을 수 있는 최대 바이트
    pub max_size: Option<usize>,

    /// 혼잡 진입 임계값 (바이트)
    pub high_watermark: Option<usize>,

    /// 혼잡 해제 임계값 (바이트)
    pub low_watermark: Option<usize>,
}

impl BufferLimits {
    /// 제한 없음
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// 워터마크 쌍만 지정
    pub fn watermarks(high: usize, low: usize) -> Self {
        Self {
            max_size: None,
            high_watermark: Some(high),
            low_watermark: Some(low),
        }
    }

    /// 최대 크기 지정
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// 혼잡 제어 활성 여부 (두 워터마크 모두 설정됨)
    pub fn congestion_enabled(&self) -> bool {
        self.high_watermark.is_some() && self.low_watermark.is_some()
    }
}

/// 세션 매니저 설정
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 준비 상태 대기 타임아웃
    /// 정지 요청 관찰 지연의 상한
    pub poll_timeout: Duration,

    /// 수신 대기 데이터 크기를 알 수 없을 때 사용하는 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 기본 최대 세그먼트 크기 (바이트)
    pub default_mss: usize,

    /// 전송 모드
    pub transmission_mode: TransmissionMode,

    /// 최대 대역폭 (bytes/sec, 0이면 제한 없음)
    pub max_bandwidth: u64,

    /// 입력 대역폭 추정값 (bytes/sec, 0이면 자동)
    pub input_bandwidth: u64,

    /// 오버헤드 대역폭 비율 (%)
    pub overhead_bandwidth_pct: u32,

    /// 리슨 백로그
    pub listen_backlog: usize,

    /// 새 연결에 적용할 기본 버퍼 제한
    pub default_buffer: Option<BufferLimits>,

    /// 통계 조회 기본 윈도우
    pub stats_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(200),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            default_mss: DEFAULT_MSS,
            transmission_mode: TransmissionMode::File,
            max_bandwidth: 0,
            input_bandwidth: 0,
            overhead_bandwidth_pct: 100,
            listen_backlog: 1,
            default_buffer: None,
            stats_period: Duration::from_millis(1000),
        }
    }
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 벌크 전송용 설정
    pub fn file_transfer() -> Self {
        Self {
            recv_buffer_size: 4 * DEFAULT_RECV_BUFFER_SIZE,
            listen_backlog: 16,
            default_buffer: Some(BufferLimits::watermarks(4 * 1024 * 1024, 1024 * 1024)),
            ..Self::default()
        }
    }

    /// 저지연 시그널링용 설정
    pub fn low_latency() -> Self {
        Self {
            poll_timeout: Duration::from_millis(20),
            transmission_mode: TransmissionMode::Live,
            default_buffer: Some(BufferLimits::watermarks(256 * 1024, 64 * 1024)),
            stats_period: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// 타임아웃 변경
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// 기본 버퍼 제한 변경
    pub fn with_default_buffer(mut self, limits: BufferLimits) -> Self {
        self.default_buffer = Some(limits);
        self
    }
}
