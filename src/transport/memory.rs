//! 프로세스 내 메모리 전송 계층
//!
//! `MemoryNetwork` 하나가 가상의 네트워크이고, `MemoryTransport`는 그 위의
//! 소켓 API와 멀티플렉서 하나를 가진 핸들이다. 메시지 경계를 유지하며,
//! 엔드포인트마다 수신 윈도우가 있어 가득 차면 부분 전송/WouldBlock이 난다.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tracing::{debug, trace};

use super::{
    Interest, Readiness, SocketId, SocketOption, SocketStatus, Transport, TransportError,
    TransportErrorKind, TransportResult,
};
use crate::DEFAULT_MSS;

/// 기본 수신 윈도우 (바이트)
pub const DEFAULT_WINDOW: usize = 256 * 1024;

const EPHEMERAL_PORT_MIN: u16 = 49152;
const EPHEMERAL_PORT_MAX: u16 = 65535;
const EPHEMERAL_PORT_ATTEMPTS: usize = 64;

type PollerId = u64;

#[derive(Debug)]
struct Endpoint {
    /// 이 소켓의 준비 상태를 받을 멀티플렉서
    owner: PollerId,
    status: SocketStatus,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
    peer: Option<SocketId>,
    /// 리스너가 수락해 만든 소켓 (주소 충돌 검사 제외)
    accepted: bool,
    inbox: VecDeque<Bytes>,
    inbox_bytes: usize,
    window: usize,
    backlog: VecDeque<SocketId>,
    backlog_limit: usize,
    mss: usize,
    reuse_addr: bool,
    /// 연결 완료 후 한 번만 보고되는 읽기 준비
    connect_signal: bool,
    last_error: Option<TransportError>,
}

impl Endpoint {
    fn new(owner: PollerId, window: usize) -> Self {
        Self {
            owner,
            status: SocketStatus::Init,
            local: None,
            remote: None,
            peer: None,
            accepted: false,
            inbox: VecDeque::new(),
            inbox_bytes: 0,
            window,
            backlog: VecDeque::new(),
            backlog_limit: 0,
            mss: DEFAULT_MSS,
            reuse_addr: false,
            connect_signal: false,
            last_error: None,
        }
    }

    fn lose_connection(&mut self, message: &str) {
        if !self.status.is_dead() {
            self.status = SocketStatus::Broken;
            self.last_error = Some(TransportError::new(
                TransportErrorKind::ConnectionLost,
                message,
            ));
        }
    }
}

#[derive(Debug, Default)]
struct Poller {
    interests: HashMap<SocketId, Interest>,
    woken: bool,
}

#[derive(Debug, Default)]
struct Fabric {
    endpoints: HashMap<SocketId, Endpoint>,
    pollers: HashMap<PollerId, Poller>,
}

impl Fabric {
    fn endpoint(&self, id: SocketId) -> TransportResult<&Endpoint> {
        self.endpoints
            .get(&id)
            .ok_or_else(|| TransportError::invalid_socket(id))
    }

    fn endpoint_mut(&mut self, id: SocketId) -> TransportResult<&mut Endpoint> {
        self.endpoints
            .get_mut(&id)
            .ok_or_else(|| TransportError::invalid_socket(id))
    }

    fn addr_in_use(&self, addr: SocketAddr, reuse_addr: bool) -> bool {
        self.endpoints.values().any(|ep| {
            let Some(local) = ep.local else {
                return false;
            };
            !ep.accepted
                && !ep.status.is_dead()
                && local.port() == addr.port()
                && ip_overlaps(local.ip(), addr.ip())
                && !(reuse_addr && ep.reuse_addr)
        })
    }

    fn ephemeral_addr(&self, ip: IpAddr) -> TransportResult<SocketAddr> {
        let mut rng = rand::thread_rng();
        for _ in 0..EPHEMERAL_PORT_ATTEMPTS {
            let addr = SocketAddr::new(ip, rng.gen_range(EPHEMERAL_PORT_MIN..=EPHEMERAL_PORT_MAX));
            if !self.addr_in_use(addr, false) {
                return Ok(addr);
            }
        }
        Err(TransportError::new(
            TransportErrorKind::AddrInUse,
            "no free ephemeral port",
        ))
    }

    fn find_listener(&self, remote: SocketAddr) -> Option<SocketId> {
        self.endpoints.iter().find_map(|(id, ep)| {
            let local = ep.local?;
            let matches = ep.status == SocketStatus::Listening
                && local.port() == remote.port()
                && ip_overlaps(local.ip(), remote.ip());
            matches.then_some(*id)
        })
    }

    /// 상대 엔드포인트 수신 윈도우의 남은 공간
    fn peer_room(&self, ep: &Endpoint) -> usize {
        ep.peer
            .and_then(|peer| self.endpoints.get(&peer))
            .map(|peer| peer.window.saturating_sub(peer.inbox_bytes))
            .unwrap_or(0)
    }

    /// 소켓 제거, 상대와 대기 중인 수락 소켓에 끊김 전파
    fn close_endpoint(&mut self, id: SocketId) -> bool {
        let mut pending = vec![id];
        let mut closed_any = false;
        while let Some(id) = pending.pop() {
            let Some(ep) = self.endpoints.remove(&id) else {
                continue;
            };
            closed_any = true;
            for poller in self.pollers.values_mut() {
                poller.interests.remove(&id);
            }
            if let Some(peer) = ep.peer.and_then(|peer| self.endpoints.get_mut(&peer)) {
                peer.lose_connection("connection closed by peer");
            }
            pending.extend(ep.backlog);
        }
        closed_any
    }

    fn collect_ready(&mut self, poller: PollerId) -> Vec<Readiness> {
        let Some(interests) = self.pollers.get(&poller).map(|p| p.interests.clone()) else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        for (id, interest) in interests {
            let Some(ep) = self.endpoints.get(&id) else {
                ready.push(Readiness {
                    id,
                    readable: interest.read,
                    writable: false,
                    error: true,
                });
                continue;
            };
            let error = ep.status.is_dead();
            let readable = interest.read
                && (!ep.inbox.is_empty() || !ep.backlog.is_empty() || ep.connect_signal);
            let writable =
                interest.write && ep.status == SocketStatus::Connected && self.peer_room(ep) > 0;
            if error || readable || writable {
                ready.push(Readiness {
                    id,
                    readable: readable || error,
                    writable,
                    error,
                });
            }
        }

        for readiness in &ready {
            if let Some(ep) = self.endpoints.get_mut(&readiness.id) {
                ep.connect_signal = false;
            }
        }
        ready.sort_by_key(|r| r.id);
        ready
    }
}

fn ip_overlaps(a: IpAddr, b: IpAddr) -> bool {
    a == b || a.is_unspecified() || b.is_unspecified()
}

#[derive(Debug)]
struct Shared {
    fabric: Mutex<Fabric>,
    changed: Condvar,
    next_socket: AtomicU32,
    next_poller: AtomicU64,
    window: usize,
}

impl Shared {
    fn notify(&self) {
        self.changed.notify_all();
    }
}

/// 메모리 네트워크
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    shared: Arc<Shared>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// 엔드포인트 기본 수신 윈도우 지정
    pub fn with_window(window: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                fabric: Mutex::new(Fabric::default()),
                changed: Condvar::new(),
                next_socket: AtomicU32::new(1),
                next_poller: AtomicU64::new(1),
                window: window.max(1),
            }),
        }
    }

    /// 멀티플렉서를 가진 새 전송 핸들
    pub fn transport(&self) -> MemoryTransport {
        let poller = self.shared.next_poller.fetch_add(1, Ordering::Relaxed);
        self.shared
            .fabric
            .lock()
            .pollers
            .insert(poller, Poller::default());
        MemoryTransport {
            shared: Arc::clone(&self.shared),
            poller,
        }
    }

    /// 살아있는 소켓 수
    pub fn socket_count(&self) -> usize {
        self.shared.fabric.lock().endpoints.len()
    }
}

/// 메모리 네트워크 위의 전송 핸들
///
/// 드롭되면 이 핸들이 만든 소켓을 모두 닫는다.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    poller: PollerId,
}

impl MemoryTransport {
    fn lock(&self) -> parking_lot::MutexGuard<'_, Fabric> {
        self.shared.fabric.lock()
    }
}

impl Transport for MemoryTransport {
    fn socket(&self) -> TransportResult<SocketId> {
        let id = SocketId(self.shared.next_socket.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .endpoints
            .insert(id, Endpoint::new(self.poller, self.shared.window));
        trace!("socket {} 생성", id);
        Ok(id)
    }

    fn set_option(&self, id: SocketId, option: SocketOption) -> TransportResult<()> {
        let mut fabric = self.lock();
        let ep = fabric.endpoint_mut(id)?;
        match option {
            SocketOption::Mss(mss) => ep.mss = mss.max(1),
            SocketOption::ReuseAddr(reuse) => ep.reuse_addr = reuse,
            SocketOption::RecvBuffer(window) => ep.window = window.max(1),
            other => trace!("socket {}: {:?} 무시", id, other),
        }
        Ok(())
    }

    fn bind(&self, id: SocketId, addr: SocketAddr) -> TransportResult<SocketAddr> {
        let mut fabric = self.lock();
        let ep = fabric.endpoint(id)?;
        if ep.status != SocketStatus::Init {
            return Err(TransportError::new(
                TransportErrorKind::InvalidOperation,
                "socket already bound",
            ));
        }
        let reuse_addr = ep.reuse_addr;

        let bound = if addr.port() == 0 {
            fabric.ephemeral_addr(addr.ip())?
        } else if fabric.addr_in_use(addr, reuse_addr) {
            return Err(TransportError::new(
                TransportErrorKind::AddrInUse,
                format!("address {} already in use", addr),
            ));
        } else {
            addr
        };

        let ep = fabric.endpoint_mut(id)?;
        ep.local = Some(bound);
        ep.status = SocketStatus::Opened;
        debug!("socket {} bound to {}", id, bound);
        Ok(bound)
    }

    fn listen(&self, id: SocketId, backlog: usize) -> TransportResult<()> {
        let mut fabric = self.lock();
        let ep = fabric.endpoint_mut(id)?;
        if ep.status != SocketStatus::Opened {
            return Err(TransportError::new(
                TransportErrorKind::InvalidOperation,
                "socket not bound",
            ));
        }
        ep.status = SocketStatus::Listening;
        ep.backlog_limit = backlog.max(1);
        Ok(())
    }

    fn accept(&self, id: SocketId) -> TransportResult<(SocketId, SocketAddr)> {
        let mut fabric = self.lock();
        let ep = fabric.endpoint_mut(id)?;
        if ep.status != SocketStatus::Listening {
            return Err(TransportError::new(
                TransportErrorKind::InvalidOperation,
                "socket not listening",
            ));
        }
        let accepted = ep.backlog.pop_front().ok_or_else(TransportError::would_block)?;
        let remote = fabric
            .endpoint(accepted)
            .ok()
            .and_then(|ep| ep.remote)
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        Ok((accepted, remote))
    }

    fn connect(&self, id: SocketId, remote: SocketAddr) -> TransportResult<SocketAddr> {
        let mut fabric = self.lock();
        let ep = fabric.endpoint(id)?;
        let local = match ep.status {
            SocketStatus::Init => {
                let ip = match remote {
                    SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                };
                fabric.ephemeral_addr(ip)?
            }
            SocketStatus::Opened => ep.local.ok_or_else(|| TransportError::invalid_socket(id))?,
            _ => {
                return Err(TransportError::new(
                    TransportErrorKind::InvalidOperation,
                    "socket cannot connect in current state",
                ))
            }
        };
        let client_mss = ep.mss;

        let listener = fabric.find_listener(remote).and_then(|lid| {
            let listener = fabric.endpoints.get(&lid)?;
            (listener.backlog.len() < listener.backlog_limit).then_some((
                lid,
                listener.owner,
                listener.mss,
                listener.window,
            ))
        });

        match listener {
            Some((lid, owner, listener_mss, window)) => {
                let mss = client_mss.min(listener_mss);
                let server_id = SocketId(self.shared.next_socket.fetch_add(1, Ordering::Relaxed));
                let mut server = Endpoint::new(owner, window);
                server.status = SocketStatus::Connected;
                server.local = Some(remote);
                server.remote = Some(local);
                server.peer = Some(id);
                server.accepted = true;
                server.mss = mss;
                fabric.endpoints.insert(server_id, server);
                fabric.endpoint_mut(lid)?.backlog.push_back(server_id);

                let ep = fabric.endpoint_mut(id)?;
                ep.status = SocketStatus::Connected;
                ep.local = Some(local);
                ep.remote = Some(remote);
                ep.peer = Some(server_id);
                ep.mss = mss;
                ep.connect_signal = true;
                debug!("socket {} connected {} -> {} (peer {})", id, local, remote, server_id);
            }
            None => {
                let ep = fabric.endpoint_mut(id)?;
                ep.status = SocketStatus::Broken;
                ep.local = Some(local);
                ep.remote = Some(remote);
                ep.last_error = Some(TransportError::new(
                    TransportErrorKind::ConnectionRefused,
                    format!("connection refused by {}", remote),
                ));
                debug!("socket {} connect to {} refused", id, remote);
            }
        }

        self.shared.notify();
        Ok(local)
    }

    fn send(&self, id: SocketId, data: &[u8]) -> TransportResult<usize> {
        let mut fabric = self.lock();
        let ep = fabric.endpoint(id)?;
        match ep.status {
            SocketStatus::Connected => {}
            SocketStatus::Broken | SocketStatus::Closed => {
                return Err(ep.last_error.clone().unwrap_or_else(|| {
                    TransportError::new(TransportErrorKind::ConnectionLost, "connection lost")
                }))
            }
            _ => return Err(TransportError::would_block()),
        }
        if data.is_empty() {
            return Ok(0);
        }

        let room = fabric.peer_room(ep);
        let Some(peer_id) = ep.peer.filter(|peer| fabric.endpoints.contains_key(peer)) else {
            fabric
                .endpoint_mut(id)?
                .lose_connection("peer endpoint vanished");
            self.shared.notify();
            return Err(TransportError::new(
                TransportErrorKind::ConnectionLost,
                "peer endpoint vanished",
            ));
        };
        if room == 0 {
            return Err(TransportError::would_block());
        }

        let written = room.min(data.len());
        let peer = fabric.endpoint_mut(peer_id)?;
        peer.inbox.push_back(Bytes::copy_from_slice(&data[..written]));
        peer.inbox_bytes += written;
        self.shared.notify();
        Ok(written)
    }

    fn recv(&self, id: SocketId, buf: &mut [u8]) -> TransportResult<usize> {
        let mut fabric = self.lock();
        let ep = fabric.endpoint_mut(id)?;
        if let Some(front) = ep.inbox.front_mut() {
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
            if n == front.len() {
                ep.inbox.pop_front();
            } else {
                front.advance(n);
            }
            ep.inbox_bytes -= n;
            self.shared.notify();
            return Ok(n);
        }
        if ep.status.is_dead() {
            return Err(ep.last_error.clone().unwrap_or_else(|| {
                TransportError::new(TransportErrorKind::ConnectionLost, "connection lost")
            }));
        }
        Err(TransportError::would_block())
    }

    fn status(&self, id: SocketId) -> SocketStatus {
        self.lock()
            .endpoints
            .get(&id)
            .map(|ep| ep.status)
            .unwrap_or(SocketStatus::NonExistent)
    }

    fn last_error(&self, id: SocketId) -> Option<TransportError> {
        self.lock()
            .endpoints
            .get(&id)
            .and_then(|ep| ep.last_error.clone())
    }

    fn max_segment_size(&self, id: SocketId) -> TransportResult<usize> {
        Ok(self.lock().endpoint(id)?.mss)
    }

    fn pending_recv(&self, id: SocketId) -> usize {
        self.lock()
            .endpoints
            .get(&id)
            .map(|ep| ep.inbox.len())
            .unwrap_or(0)
    }

    fn close(&self, id: SocketId) -> TransportResult<()> {
        let closed = self.lock().close_endpoint(id);
        self.shared.notify();
        if closed {
            trace!("socket {} 닫힘", id);
            Ok(())
        } else {
            Err(TransportError::invalid_socket(id))
        }
    }

    fn poll_add(&self, id: SocketId, interest: Interest) -> TransportResult<()> {
        let mut fabric = self.lock();
        fabric.endpoint(id)?;
        fabric
            .pollers
            .entry(self.poller)
            .or_default()
            .interests
            .insert(id, interest);
        self.shared.notify();
        Ok(())
    }

    fn poll_modify(&self, id: SocketId, interest: Interest) -> TransportResult<()> {
        let mut fabric = self.lock();
        let registered = fabric
            .pollers
            .get_mut(&self.poller)
            .and_then(|p| p.interests.get_mut(&id))
            .ok_or_else(|| {
                TransportError::new(TransportErrorKind::InvalidOperation, "socket not registered")
            })?;
        *registered = interest;
        self.shared.notify();
        Ok(())
    }

    fn poll_remove(&self, id: SocketId) -> TransportResult<()> {
        if let Some(poller) = self.lock().pollers.get_mut(&self.poller) {
            poller.interests.remove(&id);
        }
        Ok(())
    }

    fn poll_wait(&self, timeout: Duration) -> TransportResult<Vec<Readiness>> {
        let deadline = Instant::now() + timeout;
        let mut fabric = self.lock();
        loop {
            let woken = fabric
                .pollers
                .get_mut(&self.poller)
                .map(|p| std::mem::take(&mut p.woken))
                .unwrap_or(false);
            let ready = fabric.collect_ready(self.poller);
            if woken || !ready.is_empty() {
                return Ok(ready);
            }
            if self.shared.changed.wait_until(&mut fabric, deadline).timed_out() {
                return Ok(fabric.collect_ready(self.poller));
            }
        }
    }

    fn wake(&self) {
        if let Some(poller) = self.lock().pollers.get_mut(&self.poller) {
            poller.woken = true;
        }
        self.shared.notify();
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let mut fabric = self.shared.fabric.lock();
        let owned: Vec<SocketId> = fabric
            .endpoints
            .iter()
            .filter(|(_, ep)| ep.owner == self.poller)
            .map(|(id, _)| *id)
            .collect();
        for id in owned {
            fabric.close_endpoint(id);
        }
        fabric.pollers.remove(&self.poller);
        drop(fabric);
        self.shared.notify();
    }
}
