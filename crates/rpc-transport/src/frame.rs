//! The fixed 16-byte header + body wire frame (§6).

/// Marks the start of every frame; the first thing the codec checks.
pub const MAGIC: u16 = 0xDABB;

pub const HEADER_LEN: usize = 16;

/// Byte 2: bit7 req/resp, bit6 two-way, bit5 event, bits4-0 serialization id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags(u8);

const REQUEST_BIT: u8 = 0b1000_0000;
const TWO_WAY_BIT: u8 = 0b0100_0000;
const EVENT_BIT: u8 = 0b0010_0000;
const SERIALIZATION_MASK: u8 = 0b0001_1111;

impl FrameFlags {
    pub fn new(is_request: bool, two_way: bool, event: bool, serialization_id: u8) -> Self {
        let mut byte = serialization_id & SERIALIZATION_MASK;
        if is_request {
            byte |= REQUEST_BIT;
        }
        if two_way {
            byte |= TWO_WAY_BIT;
        }
        if event {
            byte |= EVENT_BIT;
        }
        Self(byte)
    }

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn as_byte(&self) -> u8 {
        self.0
    }

    pub fn is_request(&self) -> bool {
        self.0 & REQUEST_BIT != 0
    }

    pub fn two_way(&self) -> bool {
        self.0 & TWO_WAY_BIT != 0
    }

    pub fn event(&self) -> bool {
        self.0 & EVENT_BIT != 0
    }

    pub fn serialization_id(&self) -> u8 {
        self.0 & SERIALIZATION_MASK
    }
}

/// Byte 3, response-only; requests carry `0` in this slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 20,
    ClientTimeout = 30,
    ServerTimeout = 31,
    BadRequest = 40,
    BadResponse = 50,
    ServiceNotFound = 60,
    ServiceError = 70,
    ServerError = 80,
    ClientError = 90,
    ServerThreadpoolExhausted = 100,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            20 => Self::Ok,
            30 => Self::ClientTimeout,
            31 => Self::ServerTimeout,
            40 => Self::BadRequest,
            50 => Self::BadResponse,
            60 => Self::ServiceNotFound,
            70 => Self::ServiceError,
            80 => Self::ServerError,
            90 => Self::ClientError,
            100 => Self::ServerThreadpoolExhausted,
            _ => return None,
        })
    }
}

/// One frame: header fields plus the serialized body. `status` is
/// meaningless on request frames (always `0`, i.e. no [`Status`] parses);
/// callers use [`Frame::request`]/[`Frame::response`] rather than building
/// one field-by-field.
#[derive(Debug, Clone)]
pub struct Frame {
    pub flags: FrameFlags,
    pub status: u8,
    pub id: u64,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn request(id: u64, two_way: bool, event: bool, serialization_id: u8, body: Vec<u8>) -> Self {
        Self {
            flags: FrameFlags::new(true, two_way, event, serialization_id),
            status: 0,
            id,
            body,
        }
    }

    pub fn response(id: u64, event: bool, serialization_id: u8, status: Status, body: Vec<u8>) -> Self {
        Self {
            flags: FrameFlags::new(false, false, event, serialization_id),
            status: status as u8,
            id,
            body,
        }
    }

    pub fn heartbeat_request(id: u64, serialization_id: u8) -> Self {
        Self::request(id, true, true, serialization_id, Vec::new())
    }

    pub fn heartbeat_response(id: u64, serialization_id: u8) -> Self {
        Self::response(id, true, serialization_id, Status::Ok, Vec::new())
    }

    pub fn status(&self) -> Option<Status> {
        Status::from_byte(self.status)
    }
}
