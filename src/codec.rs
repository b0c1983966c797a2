//! 시그널링 메시지 코덱
//!
//! bencode 정수/바이트 문자열로 구성된 자기 기술형 프레임.
//!
//! ```text
//! [MSG_SIZE][MAJOR][MINOR][MARK][COMMAND][PAYLOAD]
//!   i24e     i1e    i2e   i600e  4:data   5:HELLO
//! ```
//!
//! `MSG_SIZE`는 자신을 제외한 나머지 다섯 필드의 인코딩 길이다.
//! 디코더는 바이트를 누적하고 완성된 프레임만 앞에서부터 잘라낸다.

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{COMMAND_MAX_LEN, MAJOR_VERSION, MAX_BYTE_STRING_LEN, MAX_MESSAGE_LEN, MINOR_VERSION};

/// 데이터 커맨드의 기본 마크
pub const DEFAULT_DATA_MARK: i32 = 1;

/// 디코딩 에러
///
/// 데이터 부족은 에러가 아니라 `Ok(None)`으로 표현된다.
/// 아래 에러는 모두 스트림에 치명적이며, 호출자가 스트림을 버려야 한다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("잘못된 정수 필드")]
    InvalidInteger,

    #[error("정수 오버플로우 (32비트 범위 초과)")]
    IntegerOverflow,

    #[error("잘못된 바이트 문자열")]
    InvalidByteString,

    #[error("선언된 길이 {declared}가 최대 {limit} 초과")]
    SizeExceeded { declared: usize, limit: usize },

    #[error("커맨드 길이 {len}가 최대 {max} 초과")]
    CommandTooLong { len: usize, max: usize },

    #[error("음수 메시지 크기: {0}")]
    NegativeSize(i32),

    #[error("메시지 크기 불일치: declared={declared}, actual={actual}")]
    SizeMismatch { declared: usize, actual: usize },
}

/// 시그널링 커맨드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// 애플리케이션 데이터
    Data,

    /// 연결 할당 요청 (payload = connection id)
    Allocate,

    /// 할당 응답 (payload = 상태 코드 한 자리)
    Allocated,

    /// 상대측 연결 확인
    Linked,

    /// 채널 오픈
    Open,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Data,
        Command::Allocate,
        Command::Allocated,
        Command::Linked,
        Command::Open,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Data => "data",
            Command::Allocate => "allocate",
            Command::Allocated => "allocated",
            Command::Linked => "linked",
            Command::Open => "open",
        }
    }

    pub fn from_bytes(name: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str().as_bytes() == name)
    }
}

/// `allocated` 상태 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AllocatedStatus {
    Success = 0,
    Duplicate = 1,
    OncomingConnection = 2,
}

impl AllocatedStatus {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AllocatedStatus::Success),
            1 => Some(AllocatedStatus::Duplicate),
            2 => Some(AllocatedStatus::OncomingConnection),
            _ => None,
        }
    }
}

/// 시그널링 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub major: i32,
    pub minor: i32,
    pub mark: i32,
    pub command: Bytes,
    pub payload: Bytes,
}

impl Frame {
    /// 현재 프로토콜 버전으로 프레임 생성
    pub fn new(command: Command, payload: impl Into<Bytes>, mark: i32) -> Self {
        Self {
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            mark,
            command: Bytes::from_static(command.as_str().as_bytes()),
            payload: payload.into(),
        }
    }

    pub fn data(payload: impl Into<Bytes>, mark: i32) -> Self {
        Self::new(Command::Data, payload, mark)
    }

    pub fn allocate(connection_id: &str) -> Self {
        Self::new(
            Command::Allocate,
            Bytes::copy_from_slice(connection_id.as_bytes()),
            1,
        )
    }

    pub fn allocated(status: AllocatedStatus) -> Self {
        Self::new(Command::Allocated, vec![b'0' + status.code()], 1)
    }

    pub fn linked() -> Self {
        Self::new(Command::Linked, Bytes::from_static(b"0"), 1)
    }

    pub fn open() -> Self {
        Self::new(Command::Open, Bytes::from_static(b"0"), 1)
    }

    /// 알려진 커맨드면 반환
    pub fn command(&self) -> Option<Command> {
        Command::from_bytes(&self.command)
    }

    /// `allocated` 프레임의 상태 코드
    pub fn allocated_status(&self) -> Option<AllocatedStatus> {
        if self.command() != Some(Command::Allocated) || self.payload.len() != 1 {
            return None;
        }
        let digit = self.payload[0].checked_sub(b'0')?;
        AllocatedStatus::from_code(digit)
    }

    /// 크기 필드를 제외한 본문 길이
    pub fn body_len(&self) -> usize {
        integer_len(self.major as i64)
            + integer_len(self.minor as i64)
            + integer_len(self.mark as i64)
            + byte_string_len(self.command.len())
            + byte_string_len(self.payload.len())
    }

    /// 크기 필드를 포함한 전체 인코딩 길이
    pub fn encoded_len(&self) -> usize {
        let body = self.body_len();
        integer_len(body as i64) + body
    }

    /// 프레임 인코딩
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out.freeze()
    }

    /// 기존 버퍼 뒤에 인코딩
    pub fn encode_into(&self, out: &mut BytesMut) {
        encode_integer(out, self.body_len() as i64);
        encode_integer(out, self.major as i64);
        encode_integer(out, self.minor as i64);
        encode_integer(out, self.mark as i64);
        encode_byte_string(out, &self.command);
        encode_byte_string(out, &self.payload);
    }
}

/// `i<digits>e` 형식으로 정수 인코딩, 쓴 바이트 수 반환
pub fn encode_integer(out: &mut BytesMut, value: i64) -> usize {
    let digits = value.to_string();
    out.reserve(digits.len() + 2);
    out.put_u8(b'i');
    out.put_slice(digits.as_bytes());
    out.put_u8(b'e');
    digits.len() + 2
}

/// `<len>:<bytes>` 형식으로 바이트 문자열 인코딩, 쓴 바이트 수 반환
pub fn encode_byte_string(out: &mut BytesMut, data: &[u8]) -> usize {
    let digits = data.len().to_string();
    out.reserve(digits.len() + 1 + data.len());
    out.put_slice(digits.as_bytes());
    out.put_u8(b':');
    out.put_slice(data);
    digits.len() + 1 + data.len()
}

fn decimal_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 10 {
        value /= 10;
        len += 1;
    }
    len
}

fn integer_len(value: i64) -> usize {
    let sign = usize::from(value < 0);
    2 + sign + decimal_len(value.unsigned_abs())
}

fn byte_string_len(len: usize) -> usize {
    decimal_len(len as u64) + 1 + len
}

/// 정수 필드 파싱
///
/// `Ok(Some((value, consumed)))`, 데이터가 부족하면 `Ok(None)`.
/// 부호 뒤에 `0`만 이어지는 경우(`i000e`, `i-000e`)는 0으로 허용한다.
pub fn parse_integer(data: &[u8]) -> Result<Option<(i32, usize)>, DecodeError> {
    if data.is_empty() {
        return Ok(None);
    }
    if data[0] != b'i' {
        return Err(DecodeError::InvalidInteger);
    }

    let mut pos = 1;
    let negative = data.get(pos) == Some(&b'-');
    if negative {
        pos += 1;
    }

    let digits_start = pos;
    let mut magnitude: i64 = 0;
    loop {
        let Some(&byte) = data.get(pos) else {
            return Ok(None);
        };
        match byte {
            b'0'..=b'9' => {
                magnitude = magnitude * 10 + i64::from(byte - b'0');
                // i32::MIN의 절댓값까지만 허용
                if magnitude > i64::from(i32::MAX) + 1 {
                    return Err(DecodeError::IntegerOverflow);
                }
                pos += 1;
            }
            b'e' => break,
            _ => return Err(DecodeError::InvalidInteger),
        }
    }

    let digits = &data[digits_start..pos];
    if digits.is_empty() {
        return Err(DecodeError::InvalidInteger);
    }
    if digits.len() > 1 && digits[0] == b'0' && magnitude != 0 {
        return Err(DecodeError::InvalidInteger);
    }

    let value = if negative { -magnitude } else { magnitude };
    let value = i32::try_from(value).map_err(|_| DecodeError::IntegerOverflow)?;

    Ok(Some((value, pos + 1)))
}

/// 바이트 문자열 파싱
///
/// `Ok(Some((contents, consumed)))`, 데이터가 부족하면 `Ok(None)`.
/// 선언된 길이가 `limit`을 넘으면 데이터 도착 여부와 무관하게 실패한다.
pub fn parse_byte_string(data: &[u8], limit: usize) -> Result<Option<(&[u8], usize)>, DecodeError> {
    let mut pos = 0;
    let mut declared: usize = 0;
    loop {
        let Some(&byte) = data.get(pos) else {
            return Ok(None);
        };
        match byte {
            b'0'..=b'9' => {
                declared = declared * 10 + usize::from(byte - b'0');
                if declared > limit {
                    return Err(DecodeError::SizeExceeded { declared, limit });
                }
                pos += 1;
            }
            b':' => break,
            _ => return Err(DecodeError::InvalidByteString),
        }
    }
    if pos == 0 {
        return Err(DecodeError::InvalidByteString);
    }

    let start = pos + 1;
    let end = start + declared;
    if data.len() < end {
        return Ok(None);
    }

    Ok(Some((&data[start..end], end)))
}

/// 버퍼 내 프레임 필드 위치
struct FrameLayout {
    declared: usize,
    size_len: usize,
    major: i32,
    minor: i32,
    mark: i32,
    command: Range<usize>,
    payload: Range<usize>,
    consumed: usize,
}

fn parse_layout(data: &[u8]) -> Result<Option<FrameLayout>, DecodeError> {
    let Some((declared, size_len)) = parse_integer(data)? else {
        return Ok(None);
    };
    if declared < 0 {
        return Err(DecodeError::NegativeSize(declared));
    }
    let declared = declared as usize;
    if declared > MAX_MESSAGE_LEN {
        return Err(DecodeError::SizeExceeded {
            declared,
            limit: MAX_MESSAGE_LEN,
        });
    }
    if data.len() < size_len + declared {
        return Ok(None);
    }

    let mut pos = size_len;
    let mut versions = [0i32; 3];
    for field in versions.iter_mut() {
        let Some((value, n)) = parse_integer(&data[pos..])? else {
            return Ok(None);
        };
        *field = value;
        pos += n;
    }
    let [major, minor, mark] = versions;

    let command = match parse_byte_string(&data[pos..], COMMAND_MAX_LEN) {
        Ok(Some((name, n))) => {
            let range = pos + n - name.len()..pos + n;
            pos += n;
            range
        }
        Ok(None) => return Ok(None),
        Err(DecodeError::SizeExceeded { declared, limit }) => {
            return Err(DecodeError::CommandTooLong {
                len: declared,
                max: limit,
            })
        }
        Err(e) => return Err(e),
    };

    let Some((payload, n)) = parse_byte_string(&data[pos..], MAX_BYTE_STRING_LEN)? else {
        return Ok(None);
    };
    let payload = pos + n - payload.len()..pos + n;
    pos += n;

    Ok(Some(FrameLayout {
        declared,
        size_len,
        major,
        minor,
        mark,
        command,
        payload,
        consumed: pos,
    }))
}

/// 증분 프레임 디코더
///
/// `feed`로 바이트를 덧붙이고 `extract`가 `Ok(None)`을 돌려줄 때까지 반복 호출한다.
/// 에러가 나면 스트림은 복구 불가이며 호출자가 `clear` 하거나 연결을 닫아야 한다.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 바이트 추가, 누적 버퍼 길이 반환
    pub fn feed(&mut self, data: &[u8]) -> usize {
        self.buf.extend_from_slice(data);
        self.buf.len()
    }

    /// 완성된 프레임 하나를 추출
    pub fn extract(&mut self) -> Result<Option<Frame>, DecodeError> {
        let Some(layout) = parse_layout(&self.buf)? else {
            return Ok(None);
        };

        let raw = self.buf.split_to(layout.consumed).freeze();
        let actual = layout.consumed - layout.size_len;
        if actual != layout.declared {
            warn!(
                "프레임 크기 불일치: declared={}, actual={}",
                layout.declared, actual
            );
            return Err(DecodeError::SizeMismatch {
                declared: layout.declared,
                actual,
            });
        }

        let frame = Frame {
            major: layout.major,
            minor: layout.minor,
            mark: layout.mark,
            command: raw.slice(layout.command),
            payload: raw.slice(layout.payload),
        };
        debug!(
            "프레임 추출: command={:?}, payload={} bytes, remaining={}",
            String::from_utf8_lossy(&frame.command),
            frame.payload.len(),
            self.buf.len()
        );
        Ok(Some(frame))
    }

    /// 대기 중인 프레임의 전체 길이 (크기 필드를 읽을 수 있을 때)
    pub fn expected_len(&self) -> Option<usize> {
        match parse_integer(&self.buf) {
            Ok(Some((declared, size_len))) if declared >= 0 => Some(size_len + declared as usize),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer(input: &str) -> Result<Option<(i32, usize)>, DecodeError> {
        parse_integer(input.as_bytes())
    }

    fn byte_string(input: &str) -> Result<Option<(Vec<u8>, usize)>, DecodeError> {
        parse_byte_string(input.as_bytes(), MAX_BYTE_STRING_LEN)
            .map(|r| r.map(|(s, n)| (s.to_vec(), n)))
    }

    #[test]
    fn test_parse_integer_values() {
        assert_eq!(integer("i0e"), Ok(Some((0, 3))));
        assert_eq!(integer("i-1e"), Ok(Some((-1, 4))));
        assert_eq!(integer("i1e"), Ok(Some((1, 3))));
        assert_eq!(integer("i1234567890e"), Ok(Some((1234567890, 12))));
        assert_eq!(integer("i-1234567890e"), Ok(Some((-1234567890, 13))));
        assert_eq!(integer("i2147483647e"), Ok(Some((i32::MAX, 12))));
        assert_eq!(integer("i-2147483648e"), Ok(Some((i32::MIN, 13))));
    }

    #[test]
    fn test_parse_integer_zero_runs() {
        assert_eq!(integer("i0eHello"), Ok(Some((0, 3))));
        assert_eq!(integer("i000eHello"), Ok(Some((0, 5))));
        assert_eq!(integer("i-000eHello"), Ok(Some((0, 6))));
        assert_eq!(integer("i0123e"), Err(DecodeError::InvalidInteger));
    }

    #[test]
    fn test_parse_integer_malformed() {
        for input in ["i--1e", "iie", "iee", "ie", "i-e", "i+1e", "0123456789i32e", "abcdefghiji32e"] {
            assert_eq!(integer(input), Err(DecodeError::InvalidInteger), "{}", input);
        }
        assert_eq!(integer("i2147483648e"), Err(DecodeError::IntegerOverflow));
        assert_eq!(
            integer("i123456789012345678901234567890e"),
            Err(DecodeError::IntegerOverflow)
        );
        assert_eq!(
            integer("i1234567890123456789012345678901e"),
            Err(DecodeError::IntegerOverflow)
        );
    }

    #[test]
    fn test_parse_integer_need_more() {
        for input in ["", "i", "i1", "i-", "i-1"] {
            assert_eq!(integer(input), Ok(None), "{:?}", input);
        }
    }

    #[test]
    fn test_parse_byte_string() {
        assert_eq!(byte_string(""), Ok(None));
        assert_eq!(byte_string("10"), Ok(None));
        assert_eq!(byte_string("10:"), Ok(None));
        assert_eq!(byte_string("10:012345678"), Ok(None));

        let (contents, consumed) = byte_string("20:0123456789abcdefghij").unwrap().unwrap();
        assert_eq!(contents, b"0123456789abcdefghij");
        assert_eq!(consumed, 23);

        let (contents, consumed) = byte_string("20:0123456789abcdefghij0").unwrap().unwrap();
        assert_eq!(contents.len(), 20);
        assert_eq!(consumed, 23);

        assert_eq!(byte_string("0:"), Ok(Some((vec![], 2))));
        assert_eq!(
            byte_string("10000001:0123456789abcdefghij"),
            Err(DecodeError::SizeExceeded {
                declared: 10_000_001,
                limit: MAX_BYTE_STRING_LEN
            })
        );
        assert_eq!(byte_string(":abc"), Err(DecodeError::InvalidByteString));
        assert_eq!(byte_string("4x:abcd"), Err(DecodeError::InvalidByteString));
    }

    #[test]
    fn test_encode_primitives() {
        let mut out = BytesMut::new();
        assert_eq!(encode_integer(&mut out, 0), 3);
        assert_eq!(encode_integer(&mut out, -42), 5);
        assert_eq!(encode_byte_string(&mut out, b"spam"), 6);
        assert_eq!(encode_byte_string(&mut out, b""), 2);
        assert_eq!(&out[..], b"i0ei-42e4:spam0:");
    }

    #[test]
    fn test_encode_data_frame_layout() {
        let bytes = Frame::data(&b"HELLO"[..], 600).encode();
        assert_eq!(&bytes[..], b"i24ei1ei2ei600e4:data5:HELLO");
        assert_eq!(Frame::data(&b"HELLO"[..], 600).encoded_len(), bytes.len());
    }

    #[test]
    fn test_control_frames_roundtrip() {
        let mut decoder = FrameDecoder::new();

        decoder.feed(&Frame::data(&b"Hello, world"[..], DEFAULT_DATA_MARK).encode());
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::Data));
        assert_eq!(&frame.payload[..], b"Hello, world");
        assert_eq!(frame.mark, 1);
        assert_eq!((frame.major, frame.minor), (MAJOR_VERSION, MINOR_VERSION));

        decoder.feed(&Frame::allocate("test_id").encode());
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::Allocate));
        assert_eq!(&frame.payload[..], b"test_id");

        decoder.feed(&Frame::allocated(AllocatedStatus::Success).encode());
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::Allocated));
        assert_eq!(&frame.payload[..], b"0");
        assert_eq!(frame.allocated_status(), Some(AllocatedStatus::Success));

        decoder.feed(&Frame::allocated(AllocatedStatus::OncomingConnection).encode());
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.allocated_status(), Some(AllocatedStatus::OncomingConnection));

        decoder.feed(&Frame::linked().encode());
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::Linked));
        assert_eq!(&frame.payload[..], b"0");

        decoder.feed(&Frame::open().encode());
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::Open));

        assert_eq!(decoder.extract(), Ok(None));
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decoder_reference_stream() {
        let mut decoder = FrameDecoder::new();

        assert_eq!(decoder.feed(b""), 0);
        assert_eq!(decoder.extract(), Ok(None));

        let ok = b"i24ei1ei2ei600e4:data5:HELLO";
        assert_eq!(decoder.feed(ok), ok.len());
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.payload.len(), 5);
        assert_eq!(frame.mark, 600);
        assert_eq!(frame.command(), Some(Command::Data));
    }

    #[test]
    fn test_decoder_size_mismatch_removes_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"i23ei1ei2ei600e4:data5:HELLO");
        assert_eq!(
            decoder.extract(),
            Err(DecodeError::SizeMismatch {
                declared: 23,
                actual: 24
            })
        );
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decoder_split_feeds() {
        let mut decoder = FrameDecoder::new();

        assert_eq!(decoder.feed(b"i24ei1ei2"), 9);
        assert_eq!(decoder.extract(), Ok(None));
        assert_eq!(decoder.feed(b"ei600e4:dat"), 20);
        assert_eq!(decoder.extract(), Ok(None));
        assert_eq!(decoder.feed(b"a5:HELLO"), 28);
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"HELLO");

        decoder.feed(b"i24");
        decoder.feed(b"ei1ei2ei600e4:dat");
        decoder.feed(b"a5:HELLOi24ei1ei2ei601e4:data5:");
        decoder.feed(b"OLLEH");
        assert_eq!(decoder.expected_len(), Some(28));
        let first = decoder.extract().unwrap().unwrap();
        let second = decoder.extract().unwrap().unwrap();
        assert_eq!(&first.payload[..], b"HELLO");
        assert_eq!(&second.payload[..], b"OLLEH");
        assert_eq!(second.mark, 601);
        assert_eq!(decoder.extract(), Ok(None));
    }

    #[test]
    fn test_decoder_three_frames_in_order() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"i25ei1ei2ei600e4:data6:HELLO1");
        decoder.feed(b"i25ei1ei2ei601e4:data6:HELLO2");
        decoder.feed(b"i25ei1ei2ei602e4:data6:HELLO3");

        let mut marks = Vec::new();
        while let Some(frame) = decoder.extract().unwrap() {
            assert_eq!(frame.payload.len(), 6);
            marks.push(frame.mark);
        }
        assert_eq!(marks, vec![600, 601, 602]);
    }

    #[test]
    fn test_decoder_lost_segment_is_malformed() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"i24ei1ei2ei600");
        decoder.feed(b"i25ei1ei2ei600e4:data6:HELLO1");
        assert_eq!(decoder.extract(), Err(DecodeError::InvalidInteger));

        decoder.clear();
        assert_eq!(decoder.extract(), Ok(None));

        decoder.feed(b"i24ei1ei2ei600e4:data5:HELLO");
        let frame = decoder.extract().unwrap().unwrap();
        assert_eq!(frame.command(), Some(Command::Data));
    }

    #[test]
    fn test_decoder_command_too_long() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"i25ei1ei2ei1e10:allocatedx0:");
        assert_eq!(
            decoder.extract(),
            Err(DecodeError::CommandTooLong {
                len: 10,
                max: COMMAND_MAX_LEN
            })
        );
    }

    #[test]
    fn test_decoder_oversized_message() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"i10000001e");
        assert_eq!(
            decoder.extract(),
            Err(DecodeError::SizeExceeded {
                declared: 10_000_001,
                limit: MAX_MESSAGE_LEN
            })
        );

        decoder.clear();
        decoder.feed(b"i-5e");
        assert_eq!(decoder.extract(), Err(DecodeError::NegativeSize(-5)));
    }

    #[test]
    fn test_unknown_command_is_passed_through() {
        let frame = Frame {
            major: 3,
            minor: 0,
            mark: -7,
            command: Bytes::from_static(b"ping"),
            payload: Bytes::from_static(b"\x00\xff"),
        };
        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame.encode());
        let decoded = decoder.extract().unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.command(), None);
    }
}
