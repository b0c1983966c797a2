//! ANT 프로브 - 세션 계층 진단 도구
//!
//! 메모리 네트워크 위에 리스너와 커넥터 세션을 띄우고
//! - 커넥터가 주기적으로 타임스탬프가 담긴 data 프레임을 보냄
//! - 리스너는 같은 타임스탬프로 mark 2 data 프레임을 돌려줌
//! - 커넥터가 왕복 시간, HWM/LWM, 채널 통계를 로그로 출력
//!
//! 사용법:
//!   cargo run --release --bin ant-probe -- [OPTIONS]
//!
//! 예시:
//!   # 작은 윈도우로 혼잡 상태 관찰
//!   cargo run --release --bin ant-probe -- --window 8192 --hwm 16384 --lwm 4096 --interval-ms 1

use std::net::SocketAddr;
use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{error, info, warn, Level};

use ant_transport::stats::stats_now;
use ant_transport::transport::memory::DEFAULT_WINDOW;
use ant_transport::{
    BufferLimits, ChannelEvents, ChannelStats, Command, Frame, LogConfig, MemoryNetwork,
    MemoryTransport, SendStatus, SessionConfig, SessionEvent, SessionManager, SignalingStreams,
    Subsystem, DEFAULT_PORT,
};

/// 응답 프레임 마크
const ECHO_MARK: i32 = 2;

/// 통계 출력 주기
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// 프로브 설정
struct ProbeConfig {
    interval: Duration,
    duration: Option<Duration>,
    payload: usize,
    hwm: usize,
    lwm: usize,
    window: usize,
    log_level: Level,
    session_log_level: Option<Level>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            duration: None,
            payload: 1000,
            hwm: 1024 * 1024,
            lwm: 256 * 1024,
            window: DEFAULT_WINDOW,
            log_level: Level::INFO,
            session_log_level: None,
        }
    }
}

fn parse_value<T: FromStr>(args: &[String], i: usize, name: &str) -> T {
    match args.get(i + 1).map(|v| v.parse()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("{}: 유효한 값 필요", name);
            process::exit(2);
        }
    }
}

fn parse_args() -> ProbeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ProbeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--interval-ms" | "-i" => {
                config.interval = Duration::from_millis(parse_value(&args, i, "--interval-ms"));
                i += 1;
            }
            "--duration" | "-d" => {
                let secs: u64 = parse_value(&args, i, "--duration");
                config.duration = (secs > 0).then(|| Duration::from_secs(secs));
                i += 1;
            }
            "--payload" | "-p" => {
                config.payload = parse_value(&args, i, "--payload");
                i += 1;
            }
            "--hwm" => {
                config.hwm = parse_value(&args, i, "--hwm");
                i += 1;
            }
            "--lwm" => {
                config.lwm = parse_value(&args, i, "--lwm");
                i += 1;
            }
            "--window" | "-w" => {
                config.window = parse_value(&args, i, "--window");
                i += 1;
            }
            "--log" => {
                config.log_level = parse_value(&args, i, "--log");
                i += 1;
            }
            "--session-log" => {
                config.session_log_level = Some(parse_value(&args, i, "--session-log"));
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"ANT Probe - 세션 계층 진단 도구

메모리 네트워크 위에서 리스너/커넥터 세션을 실행하고
왕복 시간과 송신 통계를 출력한다.

사용법:
  cargo run --release --bin ant-probe -- [OPTIONS]

옵션:
  -i, --interval-ms <MS>   프레임 전송 주기 (기본: 100)
  -d, --duration <SECS>    실행 시간, 0이면 무한 (기본: 0)
  -p, --payload <BYTES>    프레임 페이로드 크기 (기본: 1000)
  --hwm <BYTES>            high watermark (기본: 1048576)
  --lwm <BYTES>            low watermark (기본: 262144)
  -w, --window <BYTES>     메모리 네트워크 수신 윈도우 (기본: 262144)
  --log <LEVEL>            기본 로그 레벨 (기본: info)
  --session-log <LEVEL>    세션 서브시스템 로그 레벨
  -h, --help               이 도움말 출력
"#
                );
                process::exit(0);
            }
            other => {
                eprintln!("알 수 없는 옵션: {}", other);
                process::exit(2);
            }
        }
        i += 1;
    }

    if config.lwm > config.hwm {
        eprintln!("--lwm은 --hwm보다 클 수 없음");
        process::exit(2);
    }
    config
}

/// 타임스탬프 + 패딩 페이로드
fn probe_payload(size: usize) -> Vec<u8> {
    let mut payload = stats_now().to_string().into_bytes();
    if payload.len() < size {
        payload.push(b':');
        payload.resize(size.max(payload.len()), b'.');
    }
    payload
}

fn payload_timestamp(payload: &[u8]) -> Option<i64> {
    let digits: Vec<u8> = payload
        .iter()
        .copied()
        .take_while(u8::is_ascii_digit)
        .collect();
    std::str::from_utf8(&digits).ok()?.parse().ok()
}

/// 리스너측: data 프레임을 mark 2로 되돌려 보냄
fn run_echo(
    listener: Arc<SessionManager<MemoryTransport>>,
    events: Receiver<SessionEvent>,
    running: Arc<AtomicBool>,
) {
    let streams = SignalingStreams::new();
    while running.load(Ordering::Relaxed) {
        let event = match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match event {
            SessionEvent::Accepted { id, remote } => info!("리스너: {} 수락 (connection {})", remote, id),
            SessionEvent::Received { id, data } => match streams.ingest(id, &data) {
                Ok(frames) => {
                    for frame in frames {
                        if frame.command() != Some(Command::Data) {
                            continue;
                        }
                        let echo = Frame::data(frame.payload, ECHO_MARK).encode();
                        if listener.send(id, echo) == SendStatus::Failed {
                            warn!("리스너: connection {} 응답 실패", id);
                        }
                    }
                }
                Err(e) => {
                    error!("리스너: connection {} 스트림 손상: {}", id, e);
                    listener.close(id);
                }
            },
            SessionEvent::Broken { id } => {
                info!("리스너: connection {} 끊김", id);
                streams.remove(id);
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let probe = parse_args();
    // 통계 시계 기준점
    stats_now();

    let mut log_config = LogConfig::new(probe.log_level);
    if let Some(level) = probe.session_log_level {
        log_config = log_config.with(Subsystem::Session, level);
    }
    log_config.init()?;

    info!("ANT Probe starting...");
    info!(
        "interval: {:?}, payload: {} bytes, HWM: {}, LWM: {}, window: {}",
        probe.interval, probe.payload, probe.hwm, probe.lwm, probe.window
    );

    let net = MemoryNetwork::with_window(probe.window);

    // 리스너 세션
    let (listener_events, listener_rx) = ChannelEvents::unbounded();
    let listener = Arc::new(SessionManager::new(
        net.transport(),
        SessionConfig::file_transfer(),
        Arc::new(listener_events),
    ));
    let server_addr = listener.start(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))?;
    info!("리스너 주소: {}", server_addr);

    let running = Arc::new(AtomicBool::new(true));
    let echo = {
        let listener = Arc::clone(&listener);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("ant-probe-echo".to_string())
            .spawn(move || run_echo(listener, listener_rx, running))?
    };

    // 커넥터 세션
    let (connector_events, events) = ChannelEvents::unbounded();
    let connector = SessionManager::new(
        net.transport(),
        SessionConfig::default(),
        Arc::new(connector_events),
    );
    connector.start(SocketAddr::from(([127, 0, 0, 1], 0)))?;
    let id = connector.connect(server_addr, None)?;
    connector.set_buffer(id, BufferLimits::watermarks(probe.hwm, probe.lwm))?;
    let stats = Arc::new(ChannelStats::new().with_default_period(REPORT_INTERVAL));
    connector.set_stat_handler(id, Arc::clone(&stats))?;

    let streams = SignalingStreams::new();
    let started = Instant::now();
    let mut connected = false;
    let mut congested = false;
    let mut next_send = Instant::now();
    let mut next_report = Instant::now() + REPORT_INTERVAL;
    let mut sent_frames: u64 = 0;
    let mut echoed_frames: u64 = 0;

    'probe: loop {
        if probe.duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }

        let wait = next_send.saturating_duration_since(Instant::now());
        match events.recv_timeout(wait) {
            Ok(event) => match event {
                SessionEvent::Connected { remote, .. } => {
                    info!("커넥터: {} 연결됨", remote);
                    connected = true;
                }
                SessionEvent::ConnectError { remote, error, .. } => {
                    error!("커넥터: {} 연결 실패: {}", remote, error);
                    break 'probe;
                }
                SessionEvent::Received { id, data } => match streams.ingest(id, &data) {
                    Ok(frames) => {
                        for frame in frames.into_iter().filter(|f| f.mark == ECHO_MARK) {
                            echoed_frames += 1;
                            if let Some(sent_at) = payload_timestamp(&frame.payload) {
                                info!("RTT: {} ms", stats_now() - sent_at);
                            }
                        }
                    }
                    Err(e) => {
                        error!("커넥터: 스트림 손상: {}", e);
                        break 'probe;
                    }
                },
                SessionEvent::LowWatermark { .. } => {
                    info!("커넥터: LWM, 전송 재개");
                    congested = false;
                }
                SessionEvent::Broken { .. } => {
                    warn!("커넥터: 연결 끊김");
                    break 'probe;
                }
                SessionEvent::Accepted { .. } => {}
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        if connected && !congested && now >= next_send {
            let frame = Frame::data(probe_payload(probe.payload), 1).encode();
            match connector.send(id, frame) {
                SendStatus::Ok => {}
                SendStatus::HighWatermark => {
                    warn!("커넥터: HWM, 전송 일시 중지");
                    congested = true;
                }
                SendStatus::Failed => {
                    error!("커넥터: 전송 실패");
                    break;
                }
            }
            sent_frames += 1;
            next_send = now + probe.interval;
        } else if now >= next_send {
            next_send = now + probe.interval;
        }

        if now >= next_report {
            let snapshot = stats.snapshot();
            info!(
                "frames sent: {}, echoed: {}, sent rate: {:?} B/s, sending rate: {:?} B/s, buffer: {:?}..{:?}",
                sent_frames,
                echoed_frames,
                snapshot.sent_rate,
                snapshot.sending_rate,
                snapshot.min_buffer,
                snapshot.max_buffer
            );
            stats.dump();
            next_report = now + REPORT_INTERVAL;
        }
    }

    connector.stop();
    running.store(false, Ordering::Relaxed);
    if echo.join().is_err() {
        error!("echo 스레드 패닉");
    }
    listener.stop();

    info!("ANT Probe finished: sent {}, echoed {}", sent_frames, echoed_frames);
    Ok(())
}
