//! Basic types for DNS messages

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType { A, NS, CNAME, SOA, PTR, MX, TXT, AAAA, SRV, DNAME, OPT, ANY, Unknown(u16) }

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::A, 2 => Self::NS, 5 => Self::CNAME, 6 => Self::SOA, 12 => Self::PTR,
            15 => Self::MX, 16 => Self::TXT, 28 => Self::AAAA, 33 => Self::SRV, 39 => Self::DNAME,
            41 => Self::OPT, 255 => Self::ANY, other => Self::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1, RecordType::NS => 2, RecordType::CNAME => 5, RecordType::SOA => 6,
            RecordType::PTR => 12, RecordType::MX => 15, RecordType::TXT => 16, RecordType::AAAA => 28,
            RecordType::SRV => 33, RecordType::DNAME => 39, RecordType::OPT => 41, RecordType::ANY => 255,
            RecordType::Unknown(other) => other,
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    /// Accepts a mnemonic (`AAAA`), an RFC 3597 name (`TYPE65`) or a bare number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let parsed = match upper.as_str() {
            "A" => Self::A, "NS" => Self::NS, "CNAME" => Self::CNAME, "SOA" => Self::SOA,
            "PTR" => Self::PTR, "MX" => Self::MX, "TXT" => Self::TXT, "AAAA" => Self::AAAA,
            "SRV" => Self::SRV, "DNAME" => Self::DNAME, "OPT" => Self::OPT, "ANY" => Self::ANY,
            other => {
                let digits = other.strip_prefix("TYPE").unwrap_or(other);
                let code = digits.parse::<u16>().map_err(|_| format!("unknown record type '{}'", s))?;
                Self::from(code)
            }
        };
        Ok(parsed)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "TYPE{}", code),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsClass { IN, CH, HS, ANY, Unknown(u16) }

impl From<u16> for DnsClass {
    fn from(value: u16) -> Self {
        match value { 1 => Self::IN, 3 => Self::CH, 4 => Self::HS, 255 => Self::ANY, other => Self::Unknown(other) }
    }
}

impl From<DnsClass> for u16 {
    fn from(value: DnsClass) -> Self {
        match value { DnsClass::IN => 1, DnsClass::CH => 3, DnsClass::HS => 4, DnsClass::ANY => 255, DnsClass::Unknown(other) => other }
    }
}

/// 4-bit response code carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rcode {
    #[default]
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Unknown(u8),
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0 => Self::NoError, 1 => Self::FormErr, 2 => Self::ServFail,
            3 => Self::NxDomain, 4 => Self::NotImp, 5 => Self::Refused, other => Self::Unknown(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0, Rcode::FormErr => 1, Rcode::ServFail => 2,
            Rcode::NxDomain => 3, Rcode::NotImp => 4, Rcode::Refused => 5, Rcode::Unknown(other) => other & 0x0F,
        }
    }
}

impl Rcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoError => "NOERROR", Self::FormErr => "FORMERR", Self::ServFail => "SERVFAIL",
            Self::NxDomain => "NXDOMAIN", Self::NotImp => "NOTIMP", Self::Refused => "REFUSED", Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Message header. Section counts are not stored here, see [`Message::qd_count`] and friends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16, pub qr: bool, pub opcode: u8, pub aa: bool, pub tc: bool,
    pub rd: bool, pub ra: bool, pub z: u8, pub rcode: Rcode,
}

impl Header {
    /// Packs the flag bits into the second 16-bit word of the wire header.
    pub fn flags(&self) -> u16 {
        let mut flags = 0u16;
        if self.qr { flags |= 0x8000; }
        flags |= ((self.opcode & 0x0F) as u16) << 11;
        if self.aa { flags |= 0x0400; }
        if self.tc { flags |= 0x0200; }
        if self.rd { flags |= 0x0100; }
        if self.ra { flags |= 0x0080; }
        flags |= ((self.z & 0x07) as u16) << 4;
        flags | u8::from(self.rcode) as u16
    }

    pub fn from_flags(id: u16, flags: u16) -> Self {
        Self {
            id,
            qr: flags & 0x8000 != 0,
            opcode: ((flags >> 11) & 0x0F) as u8,
            aa: flags & 0x0400 != 0,
            tc: flags & 0x0200 != 0,
            rd: flags & 0x0100 != 0,
            ra: flags & 0x0080 != 0,
            z: ((flags >> 4) & 0x07) as u8,
            rcode: Rcode::from((flags & 0x0F) as u8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query { pub qname: String, pub qtype: RecordType, pub qclass: DnsClass }

impl Query {
    pub fn new(qname: &str, qtype: RecordType, qclass: DnsClass) -> Self {
        Self { qname: normalize_name(qname), qtype, qclass }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: RecordType,
    pub class: DnsClass,
    pub ttl: u32,
    /// Uncompressed RDATA as it appears on the wire.
    pub data: Vec<u8>,
}

impl ResourceRecord {
    pub fn new(name: &str, rtype: RecordType, class: DnsClass, ttl: u32, data: Vec<u8>) -> Self {
        Self { name: normalize_name(name), rtype, class, ttl, data }
    }

    pub fn a(name: &str, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(name, RecordType::A, DnsClass::IN, ttl, addr.octets().to_vec())
    }

    /// Builds a TXT record, splitting `text` into character-strings of at most 255 bytes.
    pub fn txt(name: &str, ttl: u32, text: &[u8]) -> Self {
        let mut data = Vec::with_capacity(text.len() + text.len() / 255 + 1);
        for chunk in text.chunks(255) {
            data.push(chunk.len() as u8);
            data.extend_from_slice(chunk);
        }
        if text.is_empty() { data.push(0); }
        Self::new(name, RecordType::TXT, DnsClass::IN, ttl, data)
    }

    pub fn ip_addr(&self) -> Option<IpAddr> {
        match (self.rtype, self.data.len()) {
            (RecordType::A, 4) => {
                let octets: [u8; 4] = self.data.as_slice().try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            (RecordType::AAAA, 16) => {
                let octets: [u8; 16] = self.data.as_slice().try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => None,
        }
    }

    /// Splits TXT RDATA into its character-strings; `None` if the lengths overrun the data.
    pub fn txt_strings(&self) -> Option<Vec<&[u8]>> {
        if self.rtype != RecordType::TXT { return None; }
        let mut strings = Vec::new();
        let mut offset = 0;
        while offset < self.data.len() {
            let len = self.data[offset] as usize;
            offset += 1;
            strings.push(self.data.get(offset..offset + len)?);
            offset += len;
        }
        Some(strings)
    }

    /// All TXT character-strings concatenated.
    pub fn txt_data(&self) -> Option<Vec<u8>> {
        self.txt_strings().map(|strings| strings.concat())
    }
}

/// An immutable DNS message. Every `with_*` method returns a new message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: Header,
    queries: Vec<Query>,
    answers: Vec<ResourceRecord>,
    authority: Vec<ResourceRecord>,
    additional: Vec<ResourceRecord>,
}

impl Message {
    pub fn new(
        header: Header,
        queries: Vec<Query>,
        answers: Vec<ResourceRecord>,
        authority: Vec<ResourceRecord>,
        additional: Vec<ResourceRecord>,
    ) -> Self {
        Self { header, queries, answers, authority, additional }
    }

    /// A single-question query with recursion desired and id 0.
    pub fn query(qname: &str, qtype: RecordType, qclass: DnsClass) -> Self {
        let header = Header { rd: true, ..Header::default() };
        Self::new(header, vec![Query::new(qname, qtype, qclass)], Vec::new(), Vec::new(), Vec::new())
    }

    pub fn header(&self) -> &Header { &self.header }
    pub fn id(&self) -> u16 { self.header.id }
    pub fn rcode(&self) -> Rcode { self.header.rcode }
    pub fn is_truncated(&self) -> bool { self.header.tc }
    pub fn queries(&self) -> &[Query] { &self.queries }
    pub fn answers(&self) -> &[ResourceRecord] { &self.answers }
    pub fn authority(&self) -> &[ResourceRecord] { &self.authority }
    pub fn additional(&self) -> &[ResourceRecord] { &self.additional }

    pub fn qd_count(&self) -> u16 { self.queries.len() as u16 }
    pub fn an_count(&self) -> u16 { self.answers.len() as u16 }
    pub fn ns_count(&self) -> u16 { self.authority.len() as u16 }
    pub fn ar_count(&self) -> u16 { self.additional.len() as u16 }

    pub fn with_header(&self, header: Header) -> Self {
        Self { header, ..self.clone() }
    }

    pub fn with_id(&self, id: u16) -> Self {
        self.with_header(Header { id, ..self.header })
    }

    pub fn with_rd(&self, rd: bool) -> Self {
        self.with_header(Header { rd, ..self.header })
    }

    pub fn with_queries(&self, queries: Vec<Query>) -> Self {
        Self { queries, ..self.clone() }
    }

    pub fn with_answers(&self, answers: Vec<ResourceRecord>) -> Self {
        Self { answers, ..self.clone() }
    }

    pub fn with_authority(&self, authority: Vec<ResourceRecord>) -> Self {
        Self { authority, ..self.clone() }
    }

    pub fn with_additional(&self, additional: Vec<ResourceRecord>) -> Self {
        Self { additional, ..self.clone() }
    }

    /// Turns a query into a response skeleton: same id and questions, `qr` set, no records.
    pub fn to_response(&self, rcode: Rcode) -> Self {
        let header = Header { qr: true, ra: true, rcode, ..self.header };
        Self::new(header, self.queries.clone(), Vec::new(), Vec::new(), Vec::new())
    }

    /// First question name, `.` when there is none.
    pub fn qname(&self) -> &str {
        self.queries.first().map(|q| q.qname.as_str()).unwrap_or(".")
    }
}

/// Drops the trailing dot of a fully-qualified name; the root stays `.`.
/// An escaped trailing dot (`\.`) belongs to the last label and is kept.
pub fn normalize_name(name: &str) -> String {
    let Some(body) = name.strip_suffix('.') else {
        return if name.is_empty() { ".".to_string() } else { name.to_string() };
    };
    let escapes = body.bytes().rev().take_while(|b| *b == b'\\').count();
    if escapes % 2 == 1 {
        name.to_string()
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body.to_string()
    }
}
