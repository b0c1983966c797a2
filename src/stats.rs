//! 채널 통계
//!
//! 연결마다 세 가지 지표(sent, sending, buffer)의 최근 이벤트를 고정 용량
//! 링 버퍼에 보관하고, 지정한 시간 윈도우에 대한 이동 평균과 극값을 계산한다.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::STATS_HISTORY_CAPACITY;

/// 통계 시각 (통계 시계 기준 밀리초)
pub type StatTime = i64;

static STATS_EPOCH: OnceLock<Instant> = OnceLock::new();

/// 통계 시계의 현재 시각
///
/// 프로세스에서 처음 호출된 시점이 0이다.
pub fn stats_now() -> StatTime {
    let epoch = *STATS_EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as StatTime
}

/// 통계 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatEvent {
    pub time: StatTime,
    pub value: usize,
}

/// 고정 용량 이벤트 기록
///
/// 용량에 도달하면 가장 오래된 항목을 덮어쓴다.
#[derive(Debug, Clone)]
pub struct EventHistory {
    slots: Vec<StatEvent>,
    capacity: usize,
    /// 가장 오래된 항목 위치
    head: usize,
    len: usize,
}

impl EventHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, event: StatEvent) {
        let capacity = self.capacity;
        if self.slots.len() < capacity {
            self.slots.push(event);
            self.len += 1;
            return;
        }
        self.slots[self.head] = event;
        self.head = (self.head + 1) % capacity;
        self.len = capacity;
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.len = 0;
    }

    /// 오래된 것부터 순회
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StatEvent> + '_ {
        let (tail, front) = self.slots.split_at(self.head);
        front.iter().chain(tail.iter())
    }

    /// 가장 최근 항목
    pub fn last(&self) -> Option<&StatEvent> {
        self.iter().next_back()
    }

    /// 윈도우 `(now - period, now]` 안의 이벤트를 최신부터 순회
    ///
    /// 삽입 순서가 시간 순서라고 보고, 첫 윈도우 밖 이벤트에서 멈춘다.
    /// 길이가 0 이하이거나 시작점이 0 이하인 윈도우는 `None`.
    fn window(&self, period: StatTime, now: StatTime) -> Option<impl Iterator<Item = &StatEvent> + '_> {
        if period <= 0 {
            return None;
        }
        let start = now.checked_sub(period)?;
        if start <= 0 {
            return None;
        }
        Some(self.iter().rev().take_while(move |event| event.time > start))
    }
}

/// 단순 이동 평균 (초당 값)
///
/// 윈도우에 이벤트가 없으면 `None`.
pub fn simple_moving_average(history: &EventHistory, period: StatTime, now: StatTime) -> Option<u64> {
    let mut found = false;
    let sum: u64 = history
        .window(period, now)?
        .inspect(|_| found = true)
        .map(|event| event.value as u64)
        .sum();
    if !found {
        return None;
    }
    Some((sum as f64 / (period as f64 / 1000.0)) as u64)
}

/// 극값 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Min,
    Max,
}

/// 윈도우 내 최솟값/최댓값
pub fn extremum(history: &EventHistory, kind: Extremum, period: StatTime, now: StatTime) -> Option<usize> {
    let values = history.window(period, now)?.map(|event| event.value);
    match kind {
        Extremum::Min => values.min(),
        Extremum::Max => values.max(),
    }
}

#[derive(Debug)]
struct Metrics {
    /// 전송 계층에 실제로 넘긴 바이트
    sent: EventHistory,
    /// 애플리케이션이 제출한 바이트
    sending: EventHistory,
    /// 송신 큐 점유량
    buffer: EventHistory,
}

/// 연결별 통계
///
/// 폴링 스레드와 외부 조회자가 함께 쓰므로 자체 락을 가진다.
#[derive(Debug)]
pub struct ChannelStats {
    metrics: Mutex<Metrics>,
    default_period: Duration,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::with_capacity(STATS_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            metrics: Mutex::new(Metrics {
                sent: EventHistory::with_capacity(capacity),
                sending: EventHistory::with_capacity(capacity),
                buffer: EventHistory::with_capacity(capacity),
            }),
            default_period: Duration::from_millis(1000),
        }
    }

    /// 기본 조회 윈도우 변경
    pub fn with_default_period(mut self, period: Duration) -> Self {
        self.default_period = period;
        self
    }

    pub fn default_period(&self) -> StatTime {
        self.default_period.as_millis() as StatTime
    }

    pub fn push_sent(&self, bytes: usize, at: Option<StatTime>) {
        let event = stat_event(bytes, at);
        self.metrics.lock().sent.push(event);
    }

    pub fn push_sending(&self, bytes: usize, at: Option<StatTime>) {
        let event = stat_event(bytes, at);
        self.metrics.lock().sending.push(event);
    }

    pub fn push_buffer(&self, bytes: usize, at: Option<StatTime>) {
        let event = stat_event(bytes, at);
        self.metrics.lock().buffer.push(event);
    }

    /// 송신 완료 속도 (bytes/sec)
    pub fn sent_rate(&self, period: StatTime, at: Option<StatTime>) -> Option<u64> {
        let now = at.unwrap_or_else(stats_now);
        simple_moving_average(&self.metrics.lock().sent, period, now)
    }

    /// 송신 요청 속도 (bytes/sec)
    pub fn sending_rate(&self, period: StatTime, at: Option<StatTime>) -> Option<u64> {
        let now = at.unwrap_or_else(stats_now);
        simple_moving_average(&self.metrics.lock().sending, period, now)
    }

    pub fn min_buffer(&self, period: StatTime, at: Option<StatTime>) -> Option<usize> {
        let now = at.unwrap_or_else(stats_now);
        extremum(&self.metrics.lock().buffer, Extremum::Min, period, now)
    }

    pub fn max_buffer(&self, period: StatTime, at: Option<StatTime>) -> Option<usize> {
        let now = at.unwrap_or_else(stats_now);
        extremum(&self.metrics.lock().buffer, Extremum::Max, period, now)
    }

    /// 기본 윈도우로 네 지표를 한 번에 조회
    pub fn snapshot(&self) -> StatsSnapshot {
        let period = self.default_period();
        let now = stats_now();
        StatsSnapshot {
            period,
            sent_rate: self.sent_rate(period, Some(now)),
            sending_rate: self.sending_rate(period, Some(now)),
            min_buffer: self.min_buffer(period, Some(now)),
            max_buffer: self.max_buffer(period, Some(now)),
        }
    }

    /// 가장 최근의 송신 큐 점유량 기록
    pub fn last_buffer(&self) -> Option<StatEvent> {
        self.metrics.lock().buffer.last().copied()
    }

    /// 세 지표의 기록을 모두 지움
    pub fn clear(&self) {
        let mut metrics = self.metrics.lock();
        metrics.sent.clear();
        metrics.sending.clear();
        metrics.buffer.clear();
    }

    /// 기록 길이 (sent, sending, buffer)
    pub fn history_len(&self) -> (usize, usize, usize) {
        let metrics = self.metrics.lock();
        (metrics.sent.len(), metrics.sending.len(), metrics.buffer.len())
    }

    /// 전체 기록을 debug 레벨로 출력
    pub fn dump(&self) {
        let metrics = self.metrics.lock();
        for (name, history) in [
            ("sent", &metrics.sent),
            ("sending", &metrics.sending),
            ("buffer", &metrics.buffer),
        ] {
            debug!("{}: {} events", name, history.len());
            for event in history.iter() {
                debug!("  {}: t={} value={}", name, event.time, event.value);
            }
        }
    }
}

fn stat_event(value: usize, at: Option<StatTime>) -> StatEvent {
    StatEvent {
        time: at.unwrap_or_else(stats_now),
        value,
    }
}

/// 조회 결과 묶음
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub period: StatTime,
    pub sent_rate: Option<u64>,
    pub sending_rate: Option<u64>,
    pub min_buffer: Option<usize>,
    pub max_buffer: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_eviction() {
        let mut history = EventHistory::with_capacity(3);
        for i in 0..5 {
            history.push(StatEvent { time: i, value: i as usize });
        }
        assert_eq!(history.len(), 3);
        let times: Vec<_> = history.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![2, 3, 4]);
        assert_eq!(history.last().map(|e| e.time), Some(4));

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.last(), None);
    }

    #[test]
    fn test_moving_average_accuracy() {
        let stats = ChannelStats::new();
        stats.push_sent(50, Some(1000));
        stats.push_sent(60, Some(2000));
        stats.push_sent(70, Some(3000));

        assert_eq!(stats.sent_rate(2000, Some(3001)), Some(65));
        assert_eq!(stats.sent_rate(3000, Some(3001)), Some(60));
    }

    #[test]
    fn test_window_start_must_be_positive() {
        let stats = ChannelStats::new();
        stats.push_sent(100, Some(10));
        assert_eq!(stats.sent_rate(1000, Some(1000)), None);
        assert_eq!(stats.max_buffer(1000, Some(500)), None);
    }

    #[test]
    fn test_non_positive_or_extreme_period() {
        let stats = ChannelStats::new();
        stats.push_sent(100, Some(4000));
        stats.push_buffer(100, Some(4000));

        assert_eq!(stats.sent_rate(0, Some(5000)), None);
        assert_eq!(stats.sent_rate(-1000, Some(5000)), None);
        assert_eq!(stats.max_buffer(0, Some(5000)), None);
        assert_eq!(stats.sent_rate(StatTime::MAX, Some(5000)), None);
        assert_eq!(stats.min_buffer(StatTime::MAX, Some(StatTime::MIN)), None);
        assert_eq!(stats.sent_rate(StatTime::MIN, Some(5000)), None);
    }

    #[test]
    fn test_no_data_in_window() {
        let stats = ChannelStats::new();
        assert_eq!(stats.sent_rate(1000, Some(5000)), None);

        stats.push_sent(100, Some(1000));
        stats.push_buffer(100, Some(1000));
        assert_eq!(stats.sent_rate(1000, Some(5000)), None);
        assert_eq!(stats.min_buffer(1000, Some(5000)), None);
    }

    #[test]
    fn test_scan_stops_at_first_out_of_window_event() {
        let stats = ChannelStats::new();
        stats.push_sent(100, Some(4500));
        stats.push_sent(100, Some(1000));
        stats.push_sent(100, Some(4800));

        // 4500은 윈도우 안이지만 1000에서 스캔이 끝난다
        assert_eq!(stats.sent_rate(1000, Some(5000)), Some(100));
    }

    #[test]
    fn test_sending_equals_sent_when_drained() {
        let stats = ChannelStats::new();
        stats.push_sent(2764, Some(26877));
        stats.push_sent(2419, Some(26877));
        let rounds: [(StatTime, usize, usize, &[(usize, StatTime)]); 9] = [
            (27130, 32823, 10000, &[(16584, 27130), (16239, 27132)]),
            (27384, 32823, 10000, &[(19348, 27384), (13475, 27385)]),
            (27637, 32823, 10000, &[(16584, 27637), (4146, 27638), (5528, 27638), (6565, 27638)]),
            (27892, 32823, 10000, &[(22112, 27892), (10711, 27893)]),
            (28148, 32823, 10000, &[(13820, 28148), (11056, 28149), (5528, 28149), (2419, 28149)]),
            (28401, 32823, 10000, &[(22112, 28401), (10711, 28402)]),
            (28657, 32824, 10000, &[(15202, 28657), (9674, 28658), (7948, 28658)]),
            (28912, 32824, 10000, &[(22112, 28912), (9674, 28913), (1038, 28913)]),
            (29167, 32824, 5000, &[(16584, 29167), (15202, 29168), (1038, 29168)]),
        ];
        for (at, sending, buffer, sent) in rounds {
            stats.push_sending(sending, Some(at));
            stats.push_buffer(buffer, Some(at));
            for &(bytes, t) in sent {
                stats.push_sent(bytes, Some(t));
            }
        }

        let sending = stats.sending_rate(2000, Some(29200));
        assert!(sending.is_some());
        assert_eq!(sending, stats.sent_rate(2000, Some(29200)));
        assert_eq!(stats.min_buffer(2000, Some(29200)), Some(5000));
        assert_eq!(stats.max_buffer(2000, Some(29200)), Some(10000));
    }

    #[test]
    fn test_history_capacity_limit() {
        let stats = ChannelStats::new();
        for _ in 0..STATS_HISTORY_CAPACITY * 2 {
            stats.push_sent(100, Some(100));
        }
        assert_eq!(stats.history_len().0, STATS_HISTORY_CAPACITY);
    }

    #[test]
    fn test_clear_resets_all_metrics() {
        let stats = ChannelStats::new();
        stats.push_sent(1, Some(10));
        stats.push_sending(1, Some(10));
        stats.push_buffer(1, Some(10));
        stats.dump();
        stats.clear();
        assert_eq!(stats.history_len(), (0, 0, 0));
    }

    #[test]
    fn test_stats_clock_is_monotonic() {
        let a = stats_now();
        let b = stats_now();
        assert!(b >= a);
    }
}
