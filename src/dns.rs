//! DNS message parsing and construction.
//!
//! Only what the proxy needs: the question (and EDNS0 payload size) of an
//! incoming query, the answer and authority sections of an upstream reply,
//! and encoding of answers we synthesize. Additional records are dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{ConfigError, WireError};

pub const HEADER_LEN: usize = 12;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;
const RCODE_MASK: u16 = 0x000F;

const CLASS_IN: u16 = 1;
const TYPE_OPT: u16 = 41;
const MAX_POINTER_JUMPS: usize = 64;
const MAX_LABEL_LEN: usize = 63;

/// Response codes the proxy produces or inspects.
pub mod rcode {
    pub const NOERROR: u8 = 0;
    pub const SERVFAIL: u8 = 2;
    pub const NXDOMAIN: u8 = 3;
    pub const REFUSED: u8 = 5;
}

/// Resource record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    Other(u16),
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::Other(code) => code,
        }
    }
}

impl From<u16> for RecordType {
    fn from(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            other => RecordType::Other(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::NS => f.write_str("NS"),
            RecordType::CNAME => f.write_str("CNAME"),
            RecordType::SOA => f.write_str("SOA"),
            RecordType::PTR => f.write_str("PTR"),
            RecordType::MX => f.write_str("MX"),
            RecordType::TXT => f.write_str("TXT"),
            RecordType::AAAA => f.write_str("AAAA"),
            RecordType::Other(code) => write!(f, "TYPE{}", code),
        }
    }
}

impl FromStr for RecordType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let rtype = match upper.as_str() {
            "A" => RecordType::A,
            "NS" => RecordType::NS,
            "CNAME" => RecordType::CNAME,
            "SOA" => RecordType::SOA,
            "PTR" => RecordType::PTR,
            "MX" => RecordType::MX,
            "TXT" => RecordType::TXT,
            "AAAA" => RecordType::AAAA,
            other => other
                .strip_prefix("TYPE")
                .and_then(|code| code.parse::<u16>().ok())
                .map(RecordType::from)
                .ok_or_else(|| ConfigError::InvalidRecordType(s.to_string()))?,
        };
        Ok(rtype)
    }
}

impl TryFrom<String> for RecordType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(rtype: RecordType) -> Self {
        rtype.to_string()
    }
}

/// The name and type being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
}

impl Question {
    pub fn new(name: impl Into<String>, qtype: RecordType) -> Self {
        Self {
            name: name.into(),
            qtype,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.qtype)
    }
}

/// A parsed DNS query.
#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub id: u16,
    pub flags: u16,
    pub domain: String,
    pub qtype: u16,
    pub qclass: u16,
    /// UDP payload size advertised in an EDNS0 OPT record.
    pub udp_payload: Option<u16>,
}

impl DnsQuery {
    /// Build a recursive query for `question`.
    pub fn new(id: u16, question: &Question) -> Self {
        Self {
            id,
            flags: FLAG_RD,
            domain: question.name.clone(),
            qtype: question.qtype.to_u16(),
            qclass: CLASS_IN,
            udp_payload: None,
        }
    }

    /// Parse a DNS query from raw bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN + 1 {
            return None;
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let flags = u16::from_be_bytes([data[2], data[3]]);

        // Parse domain name
        let mut pos = HEADER_LEN;
        let mut domain_parts = Vec::new();

        while pos < data.len() {
            let label_len = data[pos] as usize;
            if label_len == 0 {
                pos += 1;
                break;
            }
            pos += 1;
            if label_len > MAX_LABEL_LEN || pos + label_len > data.len() {
                return None;
            }
            let label = std::str::from_utf8(&data[pos..pos + label_len]).ok()?;
            domain_parts.push(label.to_string());
            pos += label_len;
        }

        if domain_parts.is_empty() {
            return None;
        }

        // Parse QTYPE and QCLASS
        if pos + 4 > data.len() {
            return None;
        }
        let qtype = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let qclass = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);

        Some(Self {
            id,
            flags,
            domain: domain_parts.join(".").to_lowercase(),
            qtype,
            qclass,
            udp_payload: edns_payload(data, pos + 4),
        })
    }

    pub fn question(&self) -> Question {
        Question::new(self.domain.clone(), RecordType::from(self.qtype))
    }

    /// Encode the query to wire format bytes, with an OPT record when
    /// `udp_payload` is set.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.domain.len() + 17);
        let arcount: u16 = if self.udp_payload.is_some() { 1 } else { 0 };

        data.extend_from_slice(&self.id.to_be_bytes());
        data.extend_from_slice(&self.flags.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // ANCOUNT, NSCOUNT
        data.extend_from_slice(&arcount.to_be_bytes());

        encode_domain(&mut data, &self.domain);
        data.extend_from_slice(&self.qtype.to_be_bytes());
        data.extend_from_slice(&self.qclass.to_be_bytes());

        if let Some(payload) = self.udp_payload {
            data.push(0); // root owner
            data.extend_from_slice(&TYPE_OPT.to_be_bytes());
            data.extend_from_slice(&payload.to_be_bytes());
            data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]); // TTL, RDLENGTH
        }

        data
    }

    fn echo_question(&self) -> DnsQuestion {
        DnsQuestion {
            domain: self.domain.clone(),
            qtype: self.qtype,
            qclass: self.qclass,
        }
    }
}

/// A DNS response.
#[derive(Debug, Clone)]
pub struct DnsResponse {
    pub id: u16,
    pub flags: u16,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    /// Authority section, e.g. the SOA of a negative answer.
    pub authorities: Vec<DnsRecord>,
}

/// A DNS question section entry.
#[derive(Debug, Clone)]
pub struct DnsQuestion {
    pub domain: String,
    pub qtype: u16,
    pub qclass: u16,
}

/// A DNS resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub rtype: RecordType,
    pub class: u16,
    pub ttl: u32,
    pub data: RData,
}

impl DnsRecord {
    pub fn new(name: impl Into<String>, rtype: RecordType, ttl: u32, data: RData) -> Self {
        Self {
            name: name.into(),
            rtype,
            class: CLASS_IN,
            ttl,
            data,
        }
    }

    /// Canonical text form of the record data.
    pub fn value(&self) -> String {
        self.data.to_value()
    }
}

/// Decoded record data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(String),
    NS(String),
    PTR(String),
    MX {
        preference: u16,
        exchange: String,
    },
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    TXT(Vec<String>),
    Unknown(Vec<u8>),
}

impl RData {
    /// Decode record data located at `data[start..start + len]`.
    ///
    /// The whole message is needed to follow compression pointers.
    fn decode(rtype: RecordType, data: &[u8], start: usize, len: usize) -> Result<Self, WireError> {
        let end = start + len;
        let rdata = data.get(start..end).ok_or(WireError::Truncated(start))?;

        let decoded = match rtype {
            RecordType::A => {
                let octets: [u8; 4] = rdata.try_into().map_err(|_| WireError::Truncated(start))?;
                RData::A(Ipv4Addr::from(octets))
            }
            RecordType::AAAA => {
                let octets: [u8; 16] = rdata.try_into().map_err(|_| WireError::Truncated(start))?;
                RData::AAAA(Ipv6Addr::from(octets))
            }
            RecordType::CNAME => RData::CNAME(read_name(data, start)?.0),
            RecordType::NS => RData::NS(read_name(data, start)?.0),
            RecordType::PTR => RData::PTR(read_name(data, start)?.0),
            RecordType::MX => {
                let preference = read_u16(data, start)?;
                let (exchange, _) = read_name(data, start + 2)?;
                RData::MX {
                    preference,
                    exchange,
                }
            }
            RecordType::SOA => {
                let (mname, pos) = read_name(data, start)?;
                let (rname, pos) = read_name(data, pos)?;
                RData::SOA {
                    mname,
                    rname,
                    serial: read_u32(data, pos)?,
                    refresh: read_u32(data, pos + 4)?,
                    retry: read_u32(data, pos + 8)?,
                    expire: read_u32(data, pos + 12)?,
                    minimum: read_u32(data, pos + 16)?,
                }
            }
            RecordType::TXT => {
                let mut strings = Vec::new();
                let mut pos = 0;
                while pos < rdata.len() {
                    let n = rdata[pos] as usize;
                    let chunk = rdata
                        .get(pos + 1..pos + 1 + n)
                        .ok_or(WireError::Truncated(start + pos))?;
                    strings.push(String::from_utf8_lossy(chunk).into_owned());
                    pos += 1 + n;
                }
                RData::TXT(strings)
            }
            RecordType::Other(_) => RData::Unknown(rdata.to_vec()),
        };

        Ok(decoded)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            RData::A(ip) => buf.extend_from_slice(&ip.octets()),
            RData::AAAA(ip) => buf.extend_from_slice(&ip.octets()),
            RData::CNAME(name) | RData::NS(name) | RData::PTR(name) => encode_domain(buf, name),
            RData::MX {
                preference,
                exchange,
            } => {
                buf.extend_from_slice(&preference.to_be_bytes());
                encode_domain(buf, exchange);
            }
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                encode_domain(buf, mname);
                encode_domain(buf, rname);
                for field in [serial, refresh, retry, expire, minimum] {
                    buf.extend_from_slice(&field.to_be_bytes());
                }
            }
            RData::TXT(strings) => {
                for s in strings {
                    let bytes = s.as_bytes();
                    if bytes.is_empty() {
                        buf.push(0);
                    }
                    for chunk in bytes.chunks(255) {
                        buf.push(chunk.len() as u8);
                        buf.extend_from_slice(chunk);
                    }
                }
            }
            RData::Unknown(bytes) => buf.extend_from_slice(bytes),
        }
    }

    /// Canonical text value, the form stored in the cache and record files.
    pub fn to_value(&self) -> String {
        match self {
            RData::A(ip) => ip.to_string(),
            RData::AAAA(ip) => ip.to_string(),
            RData::CNAME(name) | RData::NS(name) | RData::PTR(name) => name.clone(),
            RData::MX {
                preference,
                exchange,
            } => format!("{} {}", preference, exchange),
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => format!(
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            RData::TXT(strings) => strings.join(" "),
            RData::Unknown(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                format!("\\# {} {}", bytes.len(), hex)
            }
        }
    }

    /// Parse a canonical text value back into record data.
    pub fn from_value(rtype: RecordType, value: &str) -> Result<Self, WireError> {
        let bad = || WireError::BadValue {
            rtype: rtype.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();

        let data = match rtype {
            RecordType::A => RData::A(value.parse().map_err(|_| bad())?),
            RecordType::AAAA => RData::AAAA(value.parse().map_err(|_| bad())?),
            RecordType::CNAME => RData::CNAME(parse_name(value).ok_or_else(bad)?),
            RecordType::NS => RData::NS(parse_name(value).ok_or_else(bad)?),
            RecordType::PTR => RData::PTR(parse_name(value).ok_or_else(bad)?),
            RecordType::MX => {
                let mut fields = value.split_whitespace();
                let preference = fields.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
                let exchange = fields.next().and_then(parse_name).ok_or_else(bad)?;
                if fields.next().is_some() {
                    return Err(bad());
                }
                RData::MX {
                    preference,
                    exchange,
                }
            }
            RecordType::SOA => {
                let fields: Vec<&str> = value.split_whitespace().collect();
                let [mname, rname, serial, refresh, retry, expire, minimum] = fields[..] else {
                    return Err(bad());
                };
                let num = |s: &str| s.parse::<u32>().map_err(|_| bad());
                RData::SOA {
                    mname: parse_name(mname).ok_or_else(bad)?,
                    rname: parse_name(rname).ok_or_else(bad)?,
                    serial: num(serial)?,
                    refresh: num(refresh)?,
                    retry: num(retry)?,
                    expire: num(expire)?,
                    minimum: num(minimum)?,
                }
            }
            RecordType::TXT => RData::TXT(vec![value.to_string()]),
            RecordType::Other(_) => {
                let mut fields = value.split_whitespace();
                if fields.next() != Some("\\#") {
                    return Err(bad());
                }
                let len: usize = fields.next().and_then(|l| l.parse().ok()).ok_or_else(bad)?;
                let hex: String = fields.collect();
                let bytes = decode_hex(&hex).ok_or_else(bad)?;
                if bytes.len() != len {
                    return Err(bad());
                }
                RData::Unknown(bytes)
            }
        };

        Ok(data)
    }
}

impl DnsResponse {
    /// Build a response to `query` carrying `answers`.
    pub fn answer(query: &DnsQuery, answers: Vec<DnsRecord>, authoritative: bool) -> Self {
        let mut flags = FLAG_QR | FLAG_RA | (query.flags & FLAG_RD);
        if authoritative {
            flags |= FLAG_AA;
        }
        Self {
            id: query.id,
            flags,
            questions: vec![query.echo_question()],
            answers,
            authorities: Vec::new(),
        }
    }

    /// Build an empty response with the given response code.
    pub fn failure(query: &DnsQuery, code: u8) -> Self {
        let mut response = Self::answer(query, Vec::new(), false);
        response.flags |= code as u16 & RCODE_MASK;
        response
    }

    /// Re-address an upstream reply to the client's query.
    pub fn relay(query: &DnsQuery, upstream: DnsResponse) -> Self {
        Self {
            id: query.id,
            flags: (upstream.flags & !FLAG_TC) | FLAG_QR,
            questions: vec![query.echo_question()],
            answers: upstream.answers,
            authorities: upstream.authorities,
        }
    }

    /// Drop every record and set TC, leaving header and question.
    pub fn truncate(&mut self) {
        self.answers.clear();
        self.authorities.clear();
        self.flags |= FLAG_TC;
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & RCODE_MASK) as u8
    }

    pub fn is_authoritative(&self) -> bool {
        self.flags & FLAG_AA != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    /// Parse the header, question, answer and authority sections of a response.
    ///
    /// The additional section is not decoded.
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_LEN {
            return Err(WireError::Truncated(data.len()));
        }

        let id = read_u16(data, 0)?;
        let flags = read_u16(data, 2)?;
        let qdcount = read_u16(data, 4)? as usize;
        let ancount = read_u16(data, 6)? as usize;
        let nscount = read_u16(data, 8)? as usize;

        let mut pos = HEADER_LEN;

        let mut questions = Vec::with_capacity(qdcount);
        for _ in 0..qdcount {
            let (domain, next) = read_name(data, pos)?;
            questions.push(DnsQuestion {
                domain,
                qtype: read_u16(data, next)?,
                qclass: read_u16(data, next + 2)?,
            });
            pos = next + 4;
        }

        let mut answers = Vec::with_capacity(ancount);
        for _ in 0..ancount {
            let (record, next) = read_record(data, pos)?;
            answers.push(record);
            pos = next;
        }

        let mut authorities = Vec::with_capacity(nscount);
        for _ in 0..nscount {
            let (record, next) = read_record(data, pos)?;
            authorities.push(record);
            pos = next;
        }

        Ok(Self {
            id,
            flags,
            questions,
            answers,
            authorities,
        })
    }

    /// Encode the response to wire format bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(512);

        // Header
        data.extend_from_slice(&self.id.to_be_bytes());
        data.extend_from_slice(&self.flags.to_be_bytes());
        data.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.authorities.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

        // Questions
        for q in &self.questions {
            encode_domain(&mut data, &q.domain);
            data.extend_from_slice(&q.qtype.to_be_bytes());
            data.extend_from_slice(&q.qclass.to_be_bytes());
        }

        let qname = self.questions.first().map(|q| q.domain.as_str());
        for record in self.answers.iter().chain(&self.authorities) {
            encode_record(&mut data, record, qname);
        }

        data
    }
}

fn encode_record(data: &mut Vec<u8>, record: &DnsRecord, qname: Option<&str>) {
    // Use compression pointer if this is the first question's domain
    if qname.is_some_and(|q| record.name.eq_ignore_ascii_case(q)) {
        data.extend_from_slice(&[0xC0, 0x0C]); // Pointer to offset 12
    } else {
        encode_domain(data, &record.name);
    }
    data.extend_from_slice(&record.rtype.to_u16().to_be_bytes());
    data.extend_from_slice(&record.class.to_be_bytes());
    data.extend_from_slice(&record.ttl.to_be_bytes());

    let len_pos = data.len();
    data.extend_from_slice(&[0x00, 0x00]);
    record.data.encode(data);
    let rdlength = (data.len() - len_pos - 2) as u16;
    data[len_pos..len_pos + 2].copy_from_slice(&rdlength.to_be_bytes());
}

/// Read one resource record at `pos`, returning it and the offset past it.
fn read_record(data: &[u8], pos: usize) -> Result<(DnsRecord, usize), WireError> {
    let (name, next) = read_name(data, pos)?;
    let rtype = RecordType::from(read_u16(data, next)?);
    let class = read_u16(data, next + 2)?;
    let ttl = read_u32(data, next + 4)?;
    let rdlength = read_u16(data, next + 8)? as usize;
    let start = next + 10;

    let rdata = RData::decode(rtype, data, start, rdlength)?;
    let record = DnsRecord {
        name,
        rtype,
        class,
        ttl,
        data: rdata,
    };
    Ok((record, start + rdlength))
}

/// UDP payload size from an EDNS0 OPT record following the question at `pos`.
///
/// Anything unreadable past the question is treated as "no EDNS".
fn edns_payload(data: &[u8], mut pos: usize) -> Option<u16> {
    let mut remaining = 0;
    for count_at in [6, 8, 10] {
        remaining += read_u16(data, count_at).ok()? as usize;
    }

    for _ in 0..remaining {
        let (_, next) = read_name(data, pos).ok()?;
        if read_u16(data, next).ok()? == TYPE_OPT {
            // OPT carries the payload size in its CLASS field.
            return read_u16(data, next + 2).ok();
        }
        pos = next + 10 + read_u16(data, next + 8).ok()? as usize;
    }
    None
}

fn encode_domain(buf: &mut Vec<u8>, domain: &str) {
    for label in domain.split('.').filter(|l| !l.is_empty()) {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

/// Read a possibly compressed name starting at `pos`.
///
/// Returns the dotted name and the offset just past it in the original
/// (uncompressed) position.
fn read_name(data: &[u8], mut pos: usize) -> Result<(String, usize), WireError> {
    let mut labels: Vec<&str> = Vec::new();
    let mut resume = None;
    let mut jumps = 0;

    loop {
        let len = *data.get(pos).ok_or(WireError::Truncated(pos))? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        if len & 0xC0 == 0xC0 {
            let low = *data.get(pos + 1).ok_or(WireError::Truncated(pos + 1))? as usize;
            resume.get_or_insert(pos + 2);
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(WireError::BadPointer(pos));
            }
            pos = ((len & 0x3F) << 8) | low;
            continue;
        }
        if len > MAX_LABEL_LEN {
            return Err(WireError::BadPointer(pos));
        }
        let start = pos + 1;
        let label = data
            .get(start..start + len)
            .ok_or(WireError::Truncated(start))?;
        labels.push(std::str::from_utf8(label).map_err(|_| WireError::BadLabel)?);
        pos = start + len;
    }

    Ok((labels.join("."), resume.unwrap_or(pos)))
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16, WireError> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(WireError::Truncated(pos))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32, WireError> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(WireError::Truncated(pos))
}

/// Validate a presentation-format name, dropping one trailing dot.
fn parse_name(value: &str) -> Option<String> {
    let name = value.strip_suffix('.').unwrap_or(value);
    if name.is_empty() {
        return None;
    }
    let valid = name
        .split('.')
        .all(|label| !label.is_empty() && label.len() <= MAX_LABEL_LEN);
    valid.then(|| name.to_string())
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
