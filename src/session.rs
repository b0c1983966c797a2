//! 세션 매니저
//!
//! 리스닝 소켓 하나와 여러 피어 연결을 관리한다.
//! - 연결별 송신 큐 (FIFO, 호출 순서 유지)
//! - High/Low watermark 기반 혼잡 상태
//! - 전용 스레드의 준비 상태 폴링 루프
//! - 수명주기 이벤트 (락을 놓은 뒤 호출)

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{BufferLimits, SessionConfig};
use crate::events::{SessionEvent, SessionEvents};
use crate::stats::ChannelStats;
use crate::transport::{Interest, Readiness, SocketId, SocketOption, SocketStatus, Transport};
use crate::{Error, Result};

/// 연결 식별자 (전송 계층 소켓 핸들)
pub type ConnectionId = SocketId;

/// 루프 진단 로그 주기
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    Connecting,
    Connected,
    Broken,
    Closed,
}

/// send 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// 전송 또는 큐잉됨
    Ok,
    /// 큐잉됐지만 연결이 혼잡 상태
    ///
    /// 큐가 high watermark 이상이라는 뜻이 아니다. 혼잡에 들어간 뒤
    /// low watermark 이벤트 전까지의 send는 큐 크기와 무관하게 이 값을 받는다.
    HighWatermark,
    /// 알 수 없는 연결 또는 최대 버퍼 초과
    Failed,
}

/// 연결 정보 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub local: Option<SocketAddr>,
    pub remote: SocketAddr,
    pub queued_bytes: usize,
    pub congested: bool,
    pub mss: usize,
    pub limits: BufferLimits,
}

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    local: Option<SocketAddr>,
    remote: SocketAddr,
    queue: VecDeque<Bytes>,
    /// 큐에 남은 바이트 합
    queued: usize,
    limits: BufferLimits,
    congested: bool,
    /// 쓰기 준비 관심 등록 여부
    write_interest: bool,
    mss: usize,
    stats: Option<Arc<ChannelStats>>,
    /// 진단 주기 동안의 읽기 준비 횟수
    read_count: u32,
}

impl Connection {
    fn new(id: ConnectionId, remote: SocketAddr, config: &SessionConfig) -> Self {
        Self {
            id,
            state: ConnectionState::Initial,
            local: None,
            remote,
            queue: VecDeque::new(),
            queued: 0,
            limits: config.default_buffer.unwrap_or_default(),
            congested: false,
            write_interest: false,
            mss: config.default_mss,
            stats: None,
            read_count: 0,
        }
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state: self.state,
            local: self.local,
            remote: self.remote,
            queued_bytes: self.queued,
            congested: self.congested,
            mss: self.mss,
            limits: self.limits,
        }
    }

    /// 큐 앞부분부터 전송 계층에 넘김
    ///
    /// 부분 전송이면 남은 부분을 앞에 두고 멈춘다.
    fn drain<T: Transport>(&mut self, transport: &T) {
        while let Some(front) = self.queue.front_mut() {
            if front.is_empty() {
                self.queue.pop_front();
                continue;
            }
            let len = front.len();
            match transport.send(self.id, front) {
                Ok(0) => break,
                Ok(sent) => {
                    debug!("send({}, {}) = {} bytes", self.id, len, sent);
                    self.queued -= sent;
                    if let Some(stats) = &self.stats {
                        stats.push_sent(sent, None);
                    }
                    if sent == len {
                        self.queue.pop_front();
                    } else {
                        front.advance(sent);
                        break;
                    }
                }
                Err(e) if e.is_would_block() => break,
                Err(e) => {
                    error!("send({}) 에러: {}", self.id, e);
                    if transport.status(self.id).is_dead() {
                        error!("peer ({}): 연결 끊김", self.remote);
                    }
                    break;
                }
            }
        }
    }

    /// 큐가 남아있는 동안만 쓰기 준비를 구독
    fn sync_write_interest<T: Transport>(&mut self, transport: &T) {
        let wanted = self.queued > 0;
        if wanted == self.write_interest {
            return;
        }
        let interest = if wanted {
            Interest::READ_WRITE
        } else {
            Interest::READ
        };
        match transport.poll_modify(self.id, interest) {
            Ok(()) => self.write_interest = wanted,
            Err(e) => error!("poll_modify({}) 에러: {}", self.id, e),
        }
    }

    fn clear_queue(&mut self) {
        self.queue.clear();
        self.queued = 0;
        if let Some(stats) = &self.stats {
            stats.push_buffer(0, None);
        }
    }

    fn reached_high_watermark(&self) -> bool {
        self.limits.congestion_enabled()
            && self.limits.high_watermark.is_some_and(|high| self.queued >= high)
    }

    fn reached_low_watermark(&self) -> bool {
        match self.limits.low_watermark {
            Some(low) => self.queued <= low,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    listener: Option<(SocketId, SocketAddr)>,
    peers: HashMap<ConnectionId, Connection>,
    /// 혼잡 상태 연결 수
    congested: usize,
}

impl Registry {
    fn recount_congested(&mut self) {
        self.congested = self.peers.values().filter(|c| c.congested).count();
    }
}

/// 루프 진단 누적값
struct LoopReport {
    since: Instant,
    wait: Duration,
    events: usize,
}

struct Inner<T: Transport> {
    transport: T,
    config: SessionConfig,
    events: Arc<dyn SessionEvents>,
    registry: Mutex<Registry>,
    stop: AtomicBool,
}

/// 세션 매니저
pub struct SessionManager<T: Transport> {
    inner: Arc<Inner<T>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, config: SessionConfig, events: Arc<dyn SessionEvents>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                events,
                registry: Mutex::new(Registry::default()),
                stop: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// 리슨 시작 후 폴링 스레드 실행
    pub fn start(&self, bind: SocketAddr) -> Result<SocketAddr> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let bound = self.listen(bind)?;
        self.inner.stop.store(false, Ordering::Release);

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("ant-session".to_string())
            .spawn(move || inner.run())?;
        *slot = Some(handle);

        Ok(bound)
    }

    /// 폴링 스레드 정지, 모든 소켓 닫기
    pub fn stop(&self) {
        let handle = self.thread.lock().take();
        self.inner.stop.store(true, Ordering::Release);
        self.inner.transport.wake();

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                warn!("세션 스레드 안에서 stop 호출, join 생략");
            } else if handle.join().is_err() {
                error!("세션 스레드 패닉");
            }
        }

        let transport = &self.inner.transport;
        let mut registry = self.inner.registry.lock();
        if let Some((sock, addr)) = registry.listener.take() {
            let _ = transport.poll_remove(sock);
            let _ = transport.close(sock);
            info!("리스너 닫힘: {}", addr);
        }
        for (id, _) in registry.peers.drain() {
            let _ = transport.poll_remove(id);
            let _ = transport.close(id);
        }
        registry.congested = 0;
    }

    /// 리스닝 소켓 생성/바인드
    pub fn listen(&self, bind: SocketAddr) -> Result<SocketAddr> {
        let transport = &self.inner.transport;
        let config = &self.inner.config;

        let mut registry = self.inner.registry.lock();
        if let Some((_, addr)) = registry.listener {
            return Err(Error::AlreadyListening(addr));
        }

        let sock = transport.socket().map_err(|e| {
            error!("socket() 에러: {}", e);
            Error::transport("socket", e)
        })?;

        let setup = || -> Result<SocketAddr> {
            self.inner.configure(
                sock,
                &[
                    SocketOption::TransmissionMode(config.transmission_mode),
                    SocketOption::ReuseAddr(true),
                    SocketOption::RecvBlocking(false),
                    SocketOption::Mss(config.default_mss),
                    SocketOption::MaxBandwidth(config.max_bandwidth),
                ],
            )?;
            info!("binding {}..", bind);
            let bound = transport.bind(sock, bind).map_err(|e| {
                error!("bind() 에러: {}", e);
                Error::transport("bind", e)
            })?;
            transport
                .listen(sock, config.listen_backlog)
                .map_err(|e| Error::transport("listen", e))?;
            transport
                .poll_add(sock, Interest::READ)
                .map_err(|e| Error::transport("poll_add", e))?;
            Ok(bound)
        };

        match setup() {
            Ok(bound) => {
                info!("로컬 주소에 바인드됨: {}", bound);
                registry.listener = Some((sock, bound));
                Ok(bound)
            }
            Err(e) => {
                let _ = transport.close(sock);
                Err(e)
            }
        }
    }

    /// 리스닝 주소
    pub fn bind_address(&self) -> Option<SocketAddr> {
        self.inner.registry.lock().listener.map(|(_, addr)| addr)
    }

    /// 나가는 연결 시작
    ///
    /// 결과는 `on_connect`/`on_connect_error`로 전달된다.
    /// `pending`이 이미 등록된 연결이면 새로 만들지 않고 그대로 반환한다.
    pub fn connect(&self, remote: SocketAddr, pending: Option<ConnectionId>) -> Result<ConnectionId> {
        let transport = &self.inner.transport;
        let config = &self.inner.config;

        let mut registry = self.inner.registry.lock();
        debug!("connecting to {}", remote);

        if let Some(id) = pending.filter(|id| registry.peers.contains_key(id)) {
            debug!("connection({})이 이미 존재", id);
            return Ok(id);
        }

        let sock = transport.socket().map_err(|e| {
            error!("socket() 에러: {}", e);
            Error::transport("socket", e)
        })?;

        let setup = || -> Result<()> {
            self.inner.configure(
                sock,
                &[
                    SocketOption::TransmissionMode(config.transmission_mode),
                    SocketOption::SendBlocking(false),
                    SocketOption::RecvBlocking(false),
                    SocketOption::Linger(Duration::ZERO),
                    SocketOption::Mss(config.default_mss),
                    SocketOption::MaxBandwidth(config.max_bandwidth),
                ],
            )?;
            transport
                .poll_add(sock, Interest::READ)
                .map_err(|e| Error::transport("poll_add", e))
        };
        if let Err(e) = setup() {
            let _ = transport.close(sock);
            return Err(e);
        }

        let mut conn = Connection::new(sock, remote, config);
        conn.state = ConnectionState::Connecting;
        registry.peers.insert(sock, conn);

        match transport.connect(sock, remote) {
            Ok(local) => {
                debug!("outgoing connection({}) from {}", sock, local);
                if let Some(conn) = registry.peers.get_mut(&sock) {
                    conn.local = Some(local);
                }
                Ok(sock)
            }
            Err(e) => {
                debug!("connect() 에러: {}", e);
                registry.peers.remove(&sock);
                let _ = transport.poll_remove(sock);
                let _ = transport.close(sock);
                Err(Error::transport("connect", e))
            }
        }
    }

    /// 데이터 전송 (소유권 이전)
    pub fn send(&self, id: ConnectionId, data: impl Into<Bytes>) -> SendStatus {
        let data = data.into();
        let transport = &self.inner.transport;

        let mut registry = self.inner.registry.lock();
        let Some(conn) = registry.peers.get_mut(&id) else {
            return SendStatus::Failed;
        };

        if let Some(max_size) = conn.limits.max_size {
            if conn.queued + data.len() > max_size {
                warn!(
                    "peer ({}): 버퍼 초과 ({}+{} > {})",
                    conn.remote,
                    conn.queued,
                    data.len(),
                    max_size
                );
                return SendStatus::Failed;
            }
        }

        if let Some(stats) = &conn.stats {
            stats.push_sending(data.len(), None);
        }
        let len = data.len();
        conn.queue.push_back(data);
        conn.queued += len;

        if !conn.congested {
            conn.drain(transport);
        } else {
            warn!("peer ({}): HWM(+{}={})", conn.remote, len, conn.queued);
        }

        let mut entered_congestion = false;
        if conn.queued > 0 {
            if let Some(stats) = &conn.stats {
                stats.push_buffer(conn.queued, None);
            }
            if !conn.congested && conn.reached_high_watermark() {
                warn!("peer ({}): HWM({})", conn.remote, conn.queued);
                conn.congested = true;
                entered_congestion = true;
            }
        }
        conn.sync_write_interest(transport);

        let status = if conn.congested {
            SendStatus::HighWatermark
        } else {
            SendStatus::Ok
        };
        if entered_congestion {
            registry.recount_congested();
        }
        status
    }

    /// 버퍼 제한 설정 (큐가 비어있을 때만)
    pub fn set_buffer(&self, id: ConnectionId, limits: BufferLimits) -> Result<()> {
        if let (Some(high), Some(low)) = (limits.high_watermark, limits.low_watermark) {
            if low > high {
                return Err(Error::InvalidWatermarks { high, low });
            }
        }

        let mut registry = self.inner.registry.lock();
        let conn = registry
            .peers
            .get_mut(&id)
            .ok_or(Error::UnknownConnection(id))?;
        if conn.queued != 0 {
            return Err(Error::BufferNotEmpty(id));
        }
        conn.limits = limits;
        Ok(())
    }

    /// 연결에 통계 수집기 연결
    pub fn set_stat_handler(&self, id: ConnectionId, stats: Arc<ChannelStats>) -> Result<()> {
        let mut registry = self.inner.registry.lock();
        let conn = registry
            .peers
            .get_mut(&id)
            .ok_or(Error::UnknownConnection(id))?;
        conn.stats = Some(stats);
        Ok(())
    }

    /// 연결 닫기 (알 수 없는 id면 무시)
    pub fn close(&self, id: ConnectionId) {
        debug!("close {}", id);
        let transport = &self.inner.transport;

        let mut registry = self.inner.registry.lock();
        let Some(mut conn) = registry.peers.remove(&id) else {
            return;
        };
        conn.state = ConnectionState::Closed;
        let _ = transport.poll_remove(id);
        if let Err(e) = transport.close(id) {
            debug!("close({}) 에러: {}", id, e);
        }
        if conn.congested {
            registry.recount_congested();
        }
    }

    pub fn connection_info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.inner.registry.lock().peers.get(&id).map(Connection::info)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.inner.registry.lock().peers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// 혼잡 상태 연결 수
    pub fn congested_count(&self) -> usize {
        self.inner.registry.lock().congested
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }
}

impl<T: Transport> Drop for SessionManager<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: Transport> Inner<T> {
    fn configure(&self, sock: SocketId, options: &[SocketOption]) -> Result<()> {
        for option in options {
            self.transport
                .set_option(sock, *option)
                .map_err(|e| Error::transport("set_option", e))?;
        }
        Ok(())
    }

    /// 폴링 루프
    fn run(&self) {
        info!("세션 스레드 실행");
        let mut report = LoopReport {
            since: Instant::now(),
            wait: Duration::ZERO,
            events: 0,
        };

        while !self.stop.load(Ordering::Acquire) {
            let waited = Instant::now();
            let ready = match self.transport.poll_wait(self.config.poll_timeout) {
                Ok(ready) => ready,
                Err(e) => {
                    error!("poll 에러: {}", e);
                    thread::sleep(self.config.poll_timeout);
                    continue;
                }
            };
            report.wait += waited.elapsed();
            report.events += ready.len();

            if self.stop.load(Ordering::Acquire) {
                break;
            }
            if !ready.is_empty() {
                debug!("poll: {} 이벤트", ready.len());
            }
            for readiness in ready {
                self.handle_readiness(readiness);
            }

            if report.since.elapsed() > REPORT_INTERVAL {
                self.log_report(&report);
                report = LoopReport {
                    since: Instant::now(),
                    wait: Duration::ZERO,
                    events: 0,
                };
            }
        }

        info!("세션 스레드 정지");
    }

    fn log_report(&self, report: &LoopReport) {
        let period = self.config.stats_period.as_millis() as i64;
        let mut registry = self.registry.lock();
        for (id, conn) in registry.peers.iter_mut() {
            let sent_rate = conn.stats.as_ref().and_then(|s| s.sent_rate(period, None));
            debug!(
                "connection({}): TS: {} ms, poll_time: {} ms, events: {}, read count: {}, sent rate: {:?}",
                id,
                report.since.elapsed().as_millis(),
                report.wait.as_millis(),
                report.events,
                conn.read_count,
                sent_rate
            );
            conn.read_count = 0;
        }
    }

    fn handle_readiness(&self, readiness: Readiness) {
        let listener = self.registry.lock().listener.map(|(sock, _)| sock);
        if listener == Some(readiness.id) {
            if readiness.readable {
                self.accept_pending(readiness.id);
            }
            return;
        }

        let status = self.transport.status(readiness.id);
        debug!("socket {} 준비: {:?} ({:?})", readiness.id, readiness, status);
        match status {
            SocketStatus::Connected | SocketStatus::Connecting => {
                if readiness.readable {
                    self.receive(readiness.id);
                }
                if readiness.writable {
                    self.ready_to_send(readiness.id);
                }
            }
            SocketStatus::Broken | SocketStatus::Closed | SocketStatus::NonExistent => {
                self.broken(readiness.id);
            }
            other => {
                warn!("socket {} 예상치 못한 상태: {:?}", readiness.id, other);
            }
        }
    }

    fn accept_pending(&self, listener: SocketId) {
        let mut events = Vec::new();
        loop {
            let (sock, remote) = match self.transport.accept(listener) {
                Ok(accepted) => accepted,
                Err(e) if e.is_would_block() => break,
                Err(e) => {
                    error!("accept() 에러: {}", e);
                    break;
                }
            };
            debug!("peer ({}): 새 연결", remote);

            let mss = self
                .transport
                .max_segment_size(sock)
                .unwrap_or(self.config.default_mss);
            info!("MSS: {} bytes", mss);

            let setup = self
                .configure(
                    sock,
                    &[
                        SocketOption::SendBlocking(false),
                        SocketOption::RecvBlocking(false),
                        SocketOption::Linger(Duration::ZERO),
                        SocketOption::InputBandwidth(self.config.input_bandwidth),
                        SocketOption::OverheadBandwidth(self.config.overhead_bandwidth_pct),
                    ],
                )
                .and_then(|_| {
                    self.transport
                        .poll_add(sock, Interest::READ)
                        .map_err(|e| Error::transport("poll_add", e))
                });
            if let Err(e) = setup {
                error!("수락한 연결 설정 실패: {}", e);
                let _ = self.transport.close(sock);
                continue;
            }

            let mut registry = self.registry.lock();
            let mut conn = Connection::new(sock, remote, &self.config);
            conn.state = ConnectionState::Connected;
            conn.local = registry.listener.map(|(_, addr)| addr);
            conn.mss = mss;
            registry.peers.insert(sock, conn);
            events.push(SessionEvent::Accepted { id: sock, remote });
        }
        self.dispatch(events);
    }

    fn receive(&self, id: ConnectionId) {
        let mut events = Vec::new();
        {
            let mut registry = self.registry.lock();
            let Some(conn) = registry.peers.get_mut(&id) else {
                return;
            };
            conn.read_count += 1;

            if conn.state == ConnectionState::Connecting
                && self.transport.status(id) == SocketStatus::Connected
            {
                self.finish_connect(conn);
                events.push(SessionEvent::Connected {
                    id,
                    remote: conn.remote,
                });
                // 연결 중에 쌓인 데이터
                if !conn.congested {
                    conn.drain(&self.transport);
                }
                conn.sync_write_interest(&self.transport);
            }

            loop {
                let pending = self.transport.pending_recv(id);
                let size = if pending > 0 {
                    pending * conn.mss
                } else {
                    self.config.recv_buffer_size
                };
                debug!("수신 가능: {} bytes", size);

                let mut buf = BytesMut::zeroed(size.max(1));
                match self.transport.recv(id, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        debug!("recv({}) = {} bytes", id, n);
                        buf.truncate(n);
                        events.push(SessionEvent::Received {
                            id,
                            data: buf.freeze(),
                        });
                    }
                    Err(e) if e.is_would_block() => break,
                    Err(e) => {
                        if !e.is_connection_lost() {
                            error!("recv({}) 에러: {}", id, e);
                        }
                        break;
                    }
                }
            }
        }
        self.dispatch(events);
    }

    fn finish_connect(&self, conn: &mut Connection) {
        match self.transport.max_segment_size(conn.id) {
            Ok(mss) => {
                info!("MSS: {} bytes", mss);
                conn.mss = mss;
            }
            Err(e) => warn!("MSS 조회 실패: {}", e),
        }
        if let Err(e) = self.configure(
            conn.id,
            &[
                SocketOption::InputBandwidth(self.config.input_bandwidth),
                SocketOption::OverheadBandwidth(self.config.overhead_bandwidth_pct),
            ],
        ) {
            warn!("연결 옵션 설정 실패: {}", e);
        }
        conn.state = ConnectionState::Connected;
    }

    fn ready_to_send(&self, id: ConnectionId) {
        let mut registry = self.registry.lock();
        let Some(conn) = registry.peers.get_mut(&id) else {
            return;
        };

        conn.drain(&self.transport);
        conn.sync_write_interest(&self.transport);

        if !(conn.congested && conn.reached_low_watermark()) {
            return;
        }
        warn!("peer ({}): LWM", conn.remote);
        conn.congested = false;
        if let Some(stats) = &conn.stats {
            stats.push_buffer(conn.queued, None);
        }
        registry.recount_congested();
        drop(registry);

        self.dispatch(vec![SessionEvent::LowWatermark { id }]);
    }

    fn broken(&self, id: ConnectionId) {
        let mut registry = self.registry.lock();
        let _ = self.transport.poll_remove(id);
        let Some(mut conn) = registry.peers.remove(&id) else {
            return;
        };
        registry.recount_congested();
        drop(registry);

        let error = self.transport.last_error(id);
        let event = if conn.state == ConnectionState::Connecting {
            SessionEvent::ConnectError {
                id,
                remote: conn.remote,
                error: error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "connection failed".to_string()),
            }
        } else {
            match &error {
                Some(e) => warn!("peer ({}): connection({}) 끊김: {}", conn.remote, id, e),
                None => warn!("peer ({}): connection({}) 상대측이 닫음", conn.remote, id),
            }
            SessionEvent::Broken { id }
        };

        conn.clear_queue();
        conn.state = ConnectionState::Broken;
        let _ = self.transport.close(id);

        self.dispatch(vec![event]);
    }

    /// 락 없이 이벤트 전달, 콜백 패닉은 루프를 멈추지 않음
    fn dispatch(&self, events: Vec<SessionEvent>) {
        for event in events {
            let handler = self.events.as_ref();
            if panic::catch_unwind(AssertUnwindSafe(|| event.dispatch(handler))).is_err() {
                error!("이벤트 처리기 패닉");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelEvents;
    use crate::transport::MemoryNetwork;
    use crossbeam_channel::Receiver;

    fn any_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn manager(net: &MemoryNetwork) -> (SessionManager<crate::transport::MemoryTransport>, Receiver<SessionEvent>) {
        let (events, rx) = ChannelEvents::unbounded();
        let manager = SessionManager::new(
            net.transport(),
            SessionConfig::default().with_poll_timeout(Duration::from_millis(20)),
            Arc::new(events),
        );
        (manager, rx)
    }

    fn next(rx: &Receiver<SessionEvent>) -> SessionEvent {
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_listen_twice_fails() {
        let net = MemoryNetwork::new();
        let (server, _rx) = manager(&net);
        let bound = server.listen(any_addr()).unwrap();
        assert_eq!(server.bind_address(), Some(bound));
        assert!(matches!(
            server.listen(any_addr()),
            Err(Error::AlreadyListening(addr)) if addr == bound
        ));
    }

    #[test]
    fn test_start_twice_fails() {
        let net = MemoryNetwork::new();
        let (server, _rx) = manager(&net);
        server.start(any_addr()).unwrap();
        assert!(server.is_running());
        assert!(matches!(server.start(any_addr()), Err(Error::AlreadyRunning)));
        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.bind_address(), None);
    }

    #[test]
    fn test_unknown_connection() {
        let net = MemoryNetwork::new();
        let (server, _rx) = manager(&net);
        let id = SocketId(999);

        assert_eq!(server.send(id, &b"data"[..]), SendStatus::Failed);
        assert!(matches!(
            server.set_buffer(id, BufferLimits::watermarks(10, 5)),
            Err(Error::UnknownConnection(_))
        ));
        server.close(id);
        assert!(server.connection_info(id).is_none());
    }

    #[test]
    fn test_invalid_watermarks_rejected() {
        let net = MemoryNetwork::new();
        let (server, _rx) = manager(&net);
        assert!(matches!(
            server.set_buffer(SocketId(1), BufferLimits::watermarks(10, 20)),
            Err(Error::InvalidWatermarks { high: 10, low: 20 })
        ));
    }

    #[test]
    fn test_connect_accept_and_receive() {
        let net = MemoryNetwork::new();
        let (server, server_rx) = manager(&net);
        let (client, client_rx) = manager(&net);
        let addr = server.start(any_addr()).unwrap();
        client.start(any_addr()).unwrap();

        let id = client.connect(addr, None).unwrap();
        assert_eq!(client.connect(addr, Some(id)).unwrap(), id);
        assert_eq!(client.connection_ids(), vec![id]);

        assert_eq!(next(&client_rx), SessionEvent::Connected { id, remote: addr });
        let accepted = match next(&server_rx) {
            SessionEvent::Accepted { id, .. } => id,
            other => panic!("unexpected {:?}", other),
        };

        let info = client.connection_info(id).unwrap();
        assert_eq!(info.state, ConnectionState::Connected);
        assert!(info.local.is_some());

        assert_eq!(client.send(id, &b"hello"[..]), SendStatus::Ok);
        assert_eq!(
            next(&server_rx),
            SessionEvent::Received {
                id: accepted,
                data: Bytes::from_static(b"hello")
            }
        );
    }

    #[test]
    fn test_connect_error_is_terminal() {
        let net = MemoryNetwork::new();
        let (client, rx) = manager(&net);
        client.start(any_addr()).unwrap();

        let id = client.connect("127.0.0.1:9".parse().unwrap(), None).unwrap();
        match next(&rx) {
            SessionEvent::ConnectError { id: failed, error, .. } => {
                assert_eq!(failed, id);
                assert!(error.contains("refused"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(client.connection_info(id).is_none());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_set_buffer_requires_empty_queue() {
        let net = MemoryNetwork::with_window(4);
        let (server, _server_rx) = manager(&net);
        let (client, client_rx) = manager(&net);
        let addr = server.start(any_addr()).unwrap();
        client.start(any_addr()).unwrap();

        let id = client.connect(addr, None).unwrap();
        assert!(matches!(next(&client_rx), SessionEvent::Connected { .. }));

        client.set_buffer(id, BufferLimits::unbounded()).unwrap();
        // 윈도우보다 크게 보내서 큐에 남김
        client.send(id, vec![0u8; 4096]);
        assert!(matches!(
            client.set_buffer(id, BufferLimits::watermarks(10, 5)),
            Err(Error::BufferNotEmpty(_))
        ));
    }

    #[test]
    fn test_max_size_rejects_overflow() {
        let net = MemoryNetwork::with_window(4);
        let (server, _server_rx) = manager(&net);
        let (client, client_rx) = manager(&net);
        let addr = server.start(any_addr()).unwrap();
        client.start(any_addr()).unwrap();

        let id = client.connect(addr, None).unwrap();
        assert!(matches!(next(&client_rx), SessionEvent::Connected { .. }));
        client
            .set_buffer(id, BufferLimits::unbounded().with_max_size(16))
            .unwrap();

        assert_eq!(client.send(id, vec![1u8; 10]), SendStatus::Ok);
        assert_eq!(client.send(id, vec![1u8; 20]), SendStatus::Failed);
        // 거부된 바이트는 큐에 들어가지 않음
        assert!(client.connection_info(id).unwrap().queued_bytes <= 6);
    }

    #[test]
    fn test_close_is_silent() {
        let net = MemoryNetwork::new();
        let (server, server_rx) = manager(&net);
        let (client, client_rx) = manager(&net);
        let addr = server.start(any_addr()).unwrap();
        client.start(any_addr()).unwrap();

        let id = client.connect(addr, None).unwrap();
        assert!(matches!(next(&client_rx), SessionEvent::Connected { .. }));
        let accepted = next(&server_rx).connection_id();

        client.close(id);
        client.close(id);
        assert!(client.connection_ids().is_empty());
        assert_eq!(next(&server_rx), SessionEvent::Broken { id: accepted });
        assert!(client_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_handler_panic_does_not_stop_loop() {
        struct Panicky;
        impl SessionEvents for Panicky {
            fn on_accept(&self, _id: ConnectionId, _remote: SocketAddr) {
                panic!("handler bug");
            }
        }

        let net = MemoryNetwork::new();
        let config = SessionConfig {
            listen_backlog: 4,
            ..SessionConfig::default().with_poll_timeout(Duration::from_millis(20))
        };
        let server = SessionManager::new(net.transport(), config, Arc::new(Panicky));
        let (client, client_rx) = manager(&net);
        let addr = server.start(any_addr()).unwrap();
        client.start(any_addr()).unwrap();

        client.connect(addr, None).unwrap();
        client.connect(addr, None).unwrap();
        assert!(matches!(next(&client_rx), SessionEvent::Connected { .. }));
        assert!(matches!(next(&client_rx), SessionEvent::Connected { .. }));

        let deadline = Instant::now() + Duration::from_secs(2);
        while server.connection_ids().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(server.connection_ids().len(), 2);
    }
}
