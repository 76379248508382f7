//! RFC 1035 binary encoding of [`Message`].
//!
//! Names are written uncompressed. On decode, compression pointers are
//! followed (strictly backwards only) and the RDATA of record types that
//! embed domain names is rewritten in uncompressed form, so every decoded
//! record can be re-encoded on its own.

use crate::error::{WireError, WireResult};
use crate::types::{DnsClass, Header, Message, Query, RecordType, ResourceRecord};

pub const HEADER_LEN: usize = 12;
const MAX_WIRE_NAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;
/// qname (root) + qtype + qclass
const MIN_QUESTION_LEN: usize = 5;
/// name (root) + type + class + ttl + rdlength
const MIN_RECORD_LEN: usize = 11;

fn malformed(reason: impl Into<String>) -> WireError {
    WireError::MalformedMessage(reason.into())
}

pub fn encode(msg: &Message) -> WireResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(512);
    buf.extend_from_slice(&msg.header().id.to_be_bytes());
    buf.extend_from_slice(&msg.header().flags().to_be_bytes());
    for count in [msg.queries().len(), msg.answers().len(), msg.authority().len(), msg.additional().len()] {
        let count = u16::try_from(count).map_err(|_| malformed(format!("{} entries do not fit a section count", count)))?;
        buf.extend_from_slice(&count.to_be_bytes());
    }

    for query in msg.queries() {
        emit_name(&mut buf, &query.qname)?;
        buf.extend_from_slice(&u16::from(query.qtype).to_be_bytes());
        buf.extend_from_slice(&u16::from(query.qclass).to_be_bytes());
    }

    for record in msg.answers().iter().chain(msg.authority()).chain(msg.additional()) {
        emit_record(&mut buf, record)?;
    }
    Ok(buf)
}

fn emit_record(buf: &mut Vec<u8>, record: &ResourceRecord) -> WireResult<()> {
    emit_name(buf, &record.name)?;
    buf.extend_from_slice(&u16::from(record.rtype).to_be_bytes());
    buf.extend_from_slice(&u16::from(record.class).to_be_bytes());
    buf.extend_from_slice(&record.ttl.to_be_bytes());
    let rdlength = u16::try_from(record.data.len()).map_err(|_| WireError::DataTooLong(record.data.len()))?;
    buf.extend_from_slice(&rdlength.to_be_bytes());
    buf.extend_from_slice(&record.data);
    Ok(())
}

/// Writes `name` as length-prefixed labels terminated by the root label.
///
/// `name` is in presentation format: `\.` and `\\` stand for a literal dot
/// and backslash inside a label, `\DDD` for an arbitrary octet.
pub fn emit_name(buf: &mut Vec<u8>, name: &str) -> WireResult<()> {
    let labels = parse_labels(name)?;
    let wire_len = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    if wire_len > MAX_WIRE_NAME_LEN {
        return Err(WireError::InvalidName { name: name.to_string(), reason: "longer than 255 bytes on the wire" });
    }
    for label in labels {
        buf.push(label.len() as u8);
        buf.extend_from_slice(&label);
    }
    buf.push(0);
    Ok(())
}

fn parse_labels(name: &str) -> WireResult<Vec<Vec<u8>>> {
    let invalid = |reason: &'static str| WireError::InvalidName { name: name.to_string(), reason };
    if name.is_empty() || name == "." {
        return Ok(Vec::new());
    }

    let bytes = name.as_bytes();
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                if label.is_empty() {
                    return Err(invalid("empty label"));
                }
                labels.push(std::mem::take(&mut label));
                i += 1;
            }
            b'\\' => match bytes.get(i + 1..i + 4).filter(|d| d.iter().all(u8::is_ascii_digit)) {
                Some(digits) => {
                    let value = digits.iter().fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
                    let octet = u8::try_from(value).map_err(|_| invalid("escaped octet above 255"))?;
                    label.push(octet);
                    i += 4;
                }
                None => {
                    let escaped = *bytes.get(i + 1).ok_or_else(|| invalid("dangling escape"))?;
                    label.push(escaped);
                    i += 2;
                }
            },
            c => {
                label.push(c);
                i += 1;
            }
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label longer than 63 bytes"));
        }
    }
    if !label.is_empty() {
        labels.push(label);
    }
    Ok(labels)
}

/// Appends `label` in presentation format. Octets outside printable ASCII
/// become `\DDD`.
fn escape_label(label: &[u8], out: &mut String) {
    for &b in label {
        match b {
            b'.' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x21..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
}

pub fn decode(bytes: &[u8]) -> WireResult<Message> {
    if bytes.len() < HEADER_LEN {
        return Err(malformed(format!("{} bytes is shorter than the header", bytes.len())));
    }
    let mut decoder = Decoder::new(bytes);
    let id = decoder.read_u16()?;
    let flags = decoder.read_u16()?;
    let header = Header::from_flags(id, flags);
    let qd_count = decoder.read_u16()? as usize;
    let an_count = decoder.read_u16()? as usize;
    let ns_count = decoder.read_u16()? as usize;
    let ar_count = decoder.read_u16()? as usize;

    if qd_count * MIN_QUESTION_LEN > decoder.remaining() {
        return Err(malformed(format!("question count {} exceeds remaining {} bytes", qd_count, decoder.remaining())));
    }
    let mut queries = Vec::with_capacity(qd_count);
    for _ in 0..qd_count {
        let qname = decoder.read_name()?;
        let qtype = RecordType::from(decoder.read_u16()?);
        let qclass = DnsClass::from(decoder.read_u16()?);
        queries.push(Query { qname, qtype, qclass });
    }

    let record_count = an_count + ns_count + ar_count;
    if record_count * MIN_RECORD_LEN > decoder.remaining() {
        return Err(malformed(format!("record count {} exceeds remaining {} bytes", record_count, decoder.remaining())));
    }
    let answers = decoder.read_records(an_count)?;
    let authority = decoder.read_records(ns_count)?;
    let additional = decoder.read_records(ar_count)?;

    Ok(Message::new(header, queries, answers, authority, additional))
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn read_slice(&mut self, len: usize) -> WireResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| malformed("length overflow"))?;
        let slice = self.buf.get(self.pos..end)
            .ok_or_else(|| malformed(format!("need {} bytes at offset {}, message is {} bytes", len, self.pos, self.buf.len())))?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> WireResult<u16> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> WireResult<u32> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a possibly compressed name as raw labels.
    fn read_labels(&mut self) -> WireResult<Vec<&'a [u8]>> {
        let mut labels = Vec::new();
        let mut pos = self.pos;
        let mut jumped = false;
        let mut wire_len = 1;

        loop {
            let len = *self.buf.get(pos).ok_or_else(|| malformed("name runs past the end of the message"))?;
            match len & 0xC0 {
                0xC0 => {
                    let low = *self.buf.get(pos + 1).ok_or_else(|| malformed("truncated compression pointer"))?;
                    let target = (((len & 0x3F) as usize) << 8) | low as usize;
                    // pointers must go strictly backwards, which also rules out loops
                    if target >= pos {
                        return Err(malformed(format!("compression pointer at {} points to {}", pos, target)));
                    }
                    if !jumped {
                        self.pos = pos + 2;
                        jumped = true;
                    }
                    pos = target;
                }
                0x00 => {
                    let len = len as usize;
                    if len == 0 {
                        if !jumped { self.pos = pos + 1; }
                        return Ok(labels);
                    }
                    let label = self.buf.get(pos + 1..pos + 1 + len).ok_or_else(|| malformed("label runs past the end of the message"))?;
                    wire_len += len + 1;
                    if wire_len > MAX_WIRE_NAME_LEN {
                        return Err(malformed("name longer than 255 bytes"));
                    }
                    labels.push(label);
                    pos += len + 1;
                }
                _ => return Err(malformed(format!("label length {:#04x} exceeds 63", len))),
            }
        }
    }

    fn read_name(&mut self) -> WireResult<String> {
        let labels = self.read_labels()?;
        if labels.is_empty() {
            return Ok(".".to_string());
        }
        let mut name = String::new();
        for (i, label) in labels.iter().enumerate() {
            if i > 0 {
                name.push('.');
            }
            escape_label(label, &mut name);
        }
        Ok(name)
    }

    /// Copies a name into `out` without compression.
    fn expand_name(&mut self, out: &mut Vec<u8>) -> WireResult<()> {
        for label in self.read_labels()? {
            out.push(label.len() as u8);
            out.extend_from_slice(label);
        }
        out.push(0);
        Ok(())
    }

    fn read_records(&mut self, count: usize) -> WireResult<Vec<ResourceRecord>> {
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.read_name()?;
            let rtype = RecordType::from(self.read_u16()?);
            let class = DnsClass::from(self.read_u16()?);
            let ttl = self.read_u32()?;
            let rdlength = self.read_u16()? as usize;
            let start = self.pos;
            let data = self.read_rdata(rtype, rdlength)?;
            if self.pos != start + rdlength {
                return Err(malformed(format!("{} record data does not match its length {}", rtype, rdlength)));
            }
            records.push(ResourceRecord { name, rtype, class, ttl, data });
        }
        Ok(records)
    }

    fn read_rdata(&mut self, rtype: RecordType, rdlength: usize) -> WireResult<Vec<u8>> {
        let mut out = Vec::with_capacity(rdlength);
        match rtype {
            RecordType::NS | RecordType::CNAME | RecordType::PTR | RecordType::DNAME => {
                self.expand_name(&mut out)?;
            }
            RecordType::MX => {
                out.extend_from_slice(self.read_slice(2)?);
                self.expand_name(&mut out)?;
            }
            RecordType::SRV => {
                out.extend_from_slice(self.read_slice(6)?);
                self.expand_name(&mut out)?;
            }
            RecordType::SOA => {
                self.expand_name(&mut out)?;
                self.expand_name(&mut out)?;
                out.extend_from_slice(self.read_slice(20)?);
            }
            _ => out.extend_from_slice(self.read_slice(rdlength)?),
        }
        Ok(out)
    }
}
