//! 로깅 설정
//!
//! 서브시스템별 로그 레벨을 일반 설정 데이터로 표현하고
//! `tracing_subscriber` 필터로 변환한다. 라이브러리는 전역 구독자를
//! 직접 설치하지 않으며, 바이너리가 `LogConfig::init`으로 설치한다.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// 로그 서브시스템
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Session,
    Codec,
    Stats,
    Transport,
    Probe,
}

impl Subsystem {
    /// tracing 타겟 (모듈 경로)
    pub fn target(&self) -> &'static str {
        match self {
            Subsystem::Session => "ant_transport::session",
            Subsystem::Codec => "ant_transport::codec",
            Subsystem::Stats => "ant_transport::stats",
            Subsystem::Transport => "ant_transport::transport",
            Subsystem::Probe => "ant_probe",
        }
    }
}

/// 로깅 설정
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 기본 레벨
    pub default: Level,

    /// 서브시스템별 레벨
    pub overrides: Vec<(Subsystem, Level)>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default: Level::INFO,
            overrides: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn new(default: Level) -> Self {
        Self {
            default,
            overrides: Vec::new(),
        }
    }

    /// 서브시스템 레벨 지정 (같은 서브시스템은 덮어씀)
    pub fn with(mut self, subsystem: Subsystem, level: Level) -> Self {
        self.overrides.retain(|(s, _)| *s != subsystem);
        self.overrides.push((subsystem, level));
        self
    }

    /// 서브시스템의 실효 레벨
    pub fn level_of(&self, subsystem: Subsystem) -> Level {
        self.overrides
            .iter()
            .find(|(s, _)| *s == subsystem)
            .map(|(_, level)| *level)
            .unwrap_or(self.default)
    }

    /// EnvFilter 지시문 문자열
    pub fn directives(&self) -> String {
        let mut parts = vec![level_name(self.default).to_string()];
        for (subsystem, level) in &self.overrides {
            parts.push(format!("{}={}", subsystem.target(), level_name(*level)));
        }
        parts.join(",")
    }

    /// EnvFilter 생성
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::new(self.directives())
    }

    /// fmt 구독자를 전역으로 설치
    pub fn init(&self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::util::SubscriberInitExt;

        tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_thread_names(true)
            .finish()
            .try_init()
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}
