use std::borrow::BorrowMut;
use std::cmp::Ordering;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::watermark::Watermark;

const SER_DE_RECORD: u8 = 1;
const SER_DE_WATERMARK: u8 = 2;
const SER_DE_IDLE_MESSAGE: u8 = 3;

/// Byte-level wire contract of stream elements.
pub trait Serde {
    fn capacity(&self) -> usize;
    fn to_bytes(&self) -> BytesMut {
        let mut data = BytesMut::with_capacity(self.capacity());
        self.serialize(data.borrow_mut());
        data
    }
    fn serialize(&self, bytes: &mut BytesMut);
    fn deserialize(bytes: &mut BytesMut) -> Self;
}

#[derive(Clone, Debug, Hash)]
pub struct Record {
    pub partition_num: u16,
    pub(crate) timestamp: i64,
    pub(crate) values: Bytes,
}

impl Record {
    pub fn new() -> Self {
        Record {
            partition_num: 0,
            timestamp: 0,
            values: Bytes::new(),
        }
    }

    pub fn with_values(values: Bytes) -> Self {
        Record {
            partition_num: 0,
            timestamp: 0,
            values,
        }
    }

    pub fn from_slice(values: &[u8]) -> Self {
        Record::with_values(Bytes::copy_from_slice(values))
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn values(&self) -> &Bytes {
        &self.values
    }

    pub fn as_slice(&self) -> &[u8] {
        self.values.as_ref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Appends the other record's values, keeping this record's metadata.
    pub fn extend(&mut self, other: &Record) {
        let mut values = BytesMut::with_capacity(self.values.len() + other.values.len());
        values.put_slice(self.values.as_ref());
        values.put_slice(other.values.as_ref());
        self.values = values.freeze();
    }
}

impl Default for Record {
    fn default() -> Self {
        Record::new()
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.values.as_ref().cmp(other.values.as_ref())
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Record {}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.values.as_ref().eq(other.values.as_ref())
    }
}

impl Serde for Record {
    fn capacity(&self) -> usize {
        15 + self.values.len()
    }

    fn serialize(&self, bytes: &mut BytesMut) {
        bytes.put_u8(SER_DE_RECORD);
        bytes.put_u16(self.partition_num);
        bytes.put_i64(self.timestamp);

        bytes.put_u32(self.values.len() as u32);
        bytes.put_slice(self.values.as_ref());
    }

    fn deserialize(bytes: &mut BytesMut) -> Self {
        let flag = bytes.get_u8();
        assert_eq!(flag, SER_DE_RECORD, "Invalid `Record` flag");

        let partition_num = bytes.get_u16();
        let timestamp = bytes.get_i64();

        let value_len = bytes.get_u32() as usize;
        assert!(bytes.remaining() >= value_len);
        let values = bytes.split_to(value_len).freeze();

        Record {
            partition_num,
            timestamp,
            values,
        }
    }
}

impl Serde for Watermark {
    fn capacity(&self) -> usize {
        9
    }

    fn serialize(&self, bytes: &mut BytesMut) {
        bytes.put_u8(SER_DE_WATERMARK);
        bytes.put_i64(self.timestamp);
    }

    fn deserialize(bytes: &mut BytesMut) -> Self {
        let flag = bytes.get_u8();
        assert_eq!(flag, SER_DE_WATERMARK, "Invalid `Watermark` flag");

        let timestamp = bytes.get_i64();
        Watermark::new(timestamp)
    }
}

/// Sentinel: the emitter has no information about time progress. Downstream
/// coalescers exclude the emitting ordinal from the watermark minimum until a
/// non-idle watermark supersedes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdleMessage;

impl Serde for IdleMessage {
    fn capacity(&self) -> usize {
        1
    }

    fn serialize(&self, bytes: &mut BytesMut) {
        bytes.put_u8(SER_DE_IDLE_MESSAGE);
    }

    fn deserialize(bytes: &mut BytesMut) -> Self {
        let flag = bytes.get_u8();
        assert_eq!(flag, SER_DE_IDLE_MESSAGE, "Invalid `IdleMessage` flag");
        IdleMessage
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Record(Record),
    Watermark(Watermark),
    IdleMessage(IdleMessage),
}

impl Element {
    /// Checks whether this element is a record.
    /// return `True`, if this element is a record, false otherwise.
    pub fn is_record(&self) -> bool {
        match self {
            Element::Record(_) => true,
            _ => false,
        }
    }

    pub fn as_record(&self) -> &Record {
        match self {
            Element::Record(record) => record,
            _ => panic!("Element is not Record"),
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Element::Record(record) => record,
            _ => panic!("Element is not Record"),
        }
    }

    /// Checks whether this element is a watermark.
    /// return `True`, if this element is a watermark, false otherwise.
    pub fn is_watermark(&self) -> bool {
        match self {
            Element::Watermark(_) => true,
            _ => false,
        }
    }

    pub fn as_watermark(&self) -> &Watermark {
        match self {
            Element::Watermark(watermark) => watermark,
            _ => panic!("Element is not Watermark"),
        }
    }

    pub fn is_idle_message(&self) -> bool {
        match self {
            Element::IdleMessage(_) => true,
            _ => false,
        }
    }
}

impl Serde for Element {
    fn capacity(&self) -> usize {
        match self {
            Element::Record(record) => record.capacity(),
            Element::Watermark(watermark) => watermark.capacity(),
            Element::IdleMessage(idle_message) => idle_message.capacity(),
        }
    }

    fn serialize(&self, bytes: &mut BytesMut) {
        match self {
            Element::Record(record) => record.serialize(bytes),
            Element::Watermark(watermark) => watermark.serialize(bytes),
            Element::IdleMessage(idle_message) => idle_message.serialize(bytes),
        }
    }

    fn deserialize(bytes: &mut BytesMut) -> Self {
        let tag = bytes.as_ref()[0];
        match tag {
            SER_DE_RECORD => Element::Record(Record::deserialize(bytes)),
            SER_DE_WATERMARK => Element::Watermark(Watermark::deserialize(bytes)),
            SER_DE_IDLE_MESSAGE => Element::IdleMessage(IdleMessage::deserialize(bytes)),
            _ => panic!("Unknown tag"),
        }
    }
}

impl From<Record> for Element {
    fn from(record: Record) -> Self {
        Element::Record(record)
    }
}

impl From<Watermark> for Element {
    fn from(watermark: Watermark) -> Self {
        Element::Watermark(watermark)
    }
}

impl From<IdleMessage> for Element {
    fn from(idle_message: IdleMessage) -> Self {
        Element::IdleMessage(idle_message)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::BorrowMut;

    use crate::core::element::{Element, IdleMessage, Record, Serde};
    use crate::core::watermark::Watermark;

    #[test]
    pub fn serde_element_record_test() {
        let mut record = Record::from_slice("abc".as_bytes());
        record.partition_num = 2;
        record.timestamp = 3;

        let element_record = Element::Record(record.clone());
        let mut data = element_record.to_bytes();
        let element_record_de = Element::deserialize(data.borrow_mut());

        let record_de = element_record_de.as_record();
        assert_eq!(record.as_slice(), record_de.as_slice());
        assert_eq!(record.partition_num, record_de.partition_num);
        assert_eq!(record.timestamp, record_de.timestamp);
    }

    #[test]
    pub fn serde_element_watermark_test() {
        let watermark = Watermark::new(-3);

        let element_watermark = Element::Watermark(watermark.clone());
        let mut data = element_watermark.to_bytes();
        let element_watermark_de = Element::deserialize(data.borrow_mut());

        let watermark_de = element_watermark_de.as_watermark();
        assert_eq!(watermark.timestamp(), watermark_de.timestamp());
    }

    #[test]
    pub fn serde_element_idle_message_test() {
        let element_idle = Element::IdleMessage(IdleMessage);
        let mut data = element_idle.to_bytes();
        let element_idle_de = Element::deserialize(data.borrow_mut());

        assert!(element_idle_de.is_idle_message());
    }

    #[test]
    pub fn record_key_equality_test() {
        let a = Record::from_slice(&[1, 2, 3]);
        let mut b = Record::from_slice(&[1, 2, 3]);
        b.partition_num = 7;
        b.timestamp = 42;

        // identity is the value payload, not the routing metadata
        assert_eq!(a, b);
        assert!(a <= b);
    }
}
