//! DNS message codec (RFC 1035 4.1) with EDNS0 (RFC 6891).
//!
//! Only what a DNSSEC-aware stub needs: build a query with the DO and CD bits,
//! and parse a response into owned records with names decompressed, including
//! the names embedded in NS/CNAME/PTR/MX/SOA rdata.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tracing::trace;

use super::enums::{RecordClass, RecordType};
use super::name::{DomainName, MAX_LABEL_LEN, NameError};
use super::record::Record;

/// UDP payload size advertised in the OPT record
pub const EDNS_PAYLOAD_SIZE: u16 = 4096;

/// DNSSEC OK bit in the OPT TTL field
pub const DO_FLAG: u32 = 0x8000;

const HEADER_LEN: usize = 12;
const MAX_POINTER_HOPS: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Message truncated at offset {0}")]
    Truncated(usize),

    #[error("Invalid name: {0}")]
    Name(#[from] NameError),

    #[error("Bad compression pointer at offset {0}")]
    BadPointer(usize),

    #[error("Invalid DNS header")]
    InvalidHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub ad: bool,
    pub cd: bool,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    fn flags(&self) -> u16 {
        let mut flags = 0u16;
        flags |= (self.qr as u16) << 15;
        flags |= ((self.opcode & 0x0f) as u16) << 11;
        flags |= (self.aa as u16) << 10;
        flags |= (self.tc as u16) << 9;
        flags |= (self.rd as u16) << 8;
        flags |= (self.ra as u16) << 7;
        flags |= (self.ad as u16) << 5;
        flags |= (self.cd as u16) << 4;
        flags |= (self.rcode & 0x0f) as u16;
        flags
    }

    fn set_flags(&mut self, flags: u16) {
        self.qr = flags & 0x8000 != 0;
        self.opcode = ((flags >> 11) & 0x0f) as u8;
        self.aa = flags & 0x0400 != 0;
        self.tc = flags & 0x0200 != 0;
        self.rd = flags & 0x0100 != 0;
        self.ra = flags & 0x0080 != 0;
        self.ad = flags & 0x0020 != 0;
        self.cd = flags & 0x0010 != 0;
        self.rcode = (flags & 0x000f) as u8;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub name: DomainName,
    pub rtype: RecordType,
    pub class: RecordClass,
}

/// EDNS0 parameters taken from the OPT pseudo-record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edns {
    pub payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub dnssec_ok: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
    pub edns: Option<Edns>,
}

impl Message {
    /// A query for `name`/`rtype` with RD and CD set and EDNS0 DO requested.
    pub fn query(id: u16, name: &DomainName, rtype: RecordType) -> Self {
        Self {
            header: Header {
                id,
                rd: true,
                cd: true,
                qdcount: 1,
                ..Default::default()
            },
            questions: vec![Question {
                name: name.clone(),
                rtype,
                class: RecordClass::IN,
            }],
            edns: Some(Edns {
                payload_size: EDNS_PAYLOAD_SIZE,
                extended_rcode: 0,
                version: 0,
                dnssec_ok: true,
            }),
            ..Default::default()
        }
    }

    /// Serialize without name compression.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(512);
        let arcount = self.additionals.len() + self.edns.is_some() as usize;

        buf.put_u16(self.header.id);
        buf.put_u16(self.header.flags());
        buf.put_u16(self.questions.len() as u16);
        buf.put_u16(self.answers.len() as u16);
        buf.put_u16(self.authorities.len() as u16);
        buf.put_u16(arcount as u16);

        for q in &self.questions {
            buf.put_slice(&q.name.to_wire());
            buf.put_u16(q.rtype.into());
            buf.put_u16(q.class.into());
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            put_record(&mut buf, record);
        }
        if let Some(edns) = &self.edns {
            buf.put_u8(0);
            buf.put_u16(RecordType::OPT.into());
            buf.put_u16(edns.payload_size);
            let mut ttl = ((edns.extended_rcode as u32) << 24) | ((edns.version as u32) << 16);
            if edns.dnssec_ok {
                ttl |= DO_FLAG;
            }
            buf.put_u32(ttl);
            buf.put_u16(0);
        }
        buf.to_vec()
    }

    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_LEN {
            return Err(WireError::InvalidHeader);
        }
        let mut reader = Reader { data, pos: 0 };
        let mut header = Header {
            id: reader.u16()?,
            ..Default::default()
        };
        header.set_flags(reader.u16()?);
        header.qdcount = reader.u16()?;
        header.ancount = reader.u16()?;
        header.nscount = reader.u16()?;
        header.arcount = reader.u16()?;
        trace!(
            "Parsing DNS message id={} rcode={} an={} ns={} ar={}",
            header.id, header.rcode, header.ancount, header.nscount, header.arcount
        );

        let mut message = Message {
            header,
            ..Default::default()
        };

        for _ in 0..message.header.qdcount {
            let name = reader.name()?;
            let rtype = RecordType::from(reader.u16()?);
            let class = RecordClass::from(reader.u16()?);
            message.questions.push(Question { name, rtype, class });
        }
        for _ in 0..message.header.ancount {
            let record = reader.record()?;
            message.answers.push(record);
        }
        for _ in 0..message.header.nscount {
            let record = reader.record()?;
            message.authorities.push(record);
        }
        for _ in 0..message.header.arcount {
            let record = reader.record()?;
            if record.rtype == RecordType::OPT && record.name.is_root() {
                message.edns = Some(Edns {
                    payload_size: record.class.into(),
                    extended_rcode: (record.ttl >> 24) as u8,
                    version: (record.ttl >> 16) as u8,
                    dnssec_ok: record.ttl & DO_FLAG != 0,
                });
                continue;
            }
            message.additionals.push(record);
        }
        Ok(message)
    }

    /// Full response code including the EDNS extended bits.
    pub fn rcode(&self) -> u16 {
        let extended = self.edns.as_ref().map_or(0, |e| e.extended_rcode as u16);
        (extended << 4) | self.header.rcode as u16
    }
}

fn put_record(buf: &mut BytesMut, record: &Record) {
    buf.put_slice(&record.name.to_wire());
    buf.put_u16(record.rtype.into());
    buf.put_u16(record.class.into());
    buf.put_u32(record.ttl);
    buf.put_u16(record.rdata.len() as u16);
    buf.put_slice(&record.rdata);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn need(&self, n: usize) -> Result<(), WireError> {
        if self.data.len() < self.pos + n {
            return Err(WireError::Truncated(self.pos));
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        self.need(2)?;
        let value = (&self.data[self.pos..]).get_u16();
        self.pos += 2;
        Ok(value)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        self.need(4)?;
        let value = (&self.data[self.pos..]).get_u32();
        self.pos += 4;
        Ok(value)
    }

    fn name(&mut self) -> Result<DomainName, WireError> {
        let (name, next) = read_name(self.data, self.pos)?;
        self.pos = next;
        Ok(name)
    }

    fn record(&mut self) -> Result<Record, WireError> {
        let name = self.name()?;
        let rtype = RecordType::from(self.u16()?);
        let class = RecordClass::from(self.u16()?);
        let ttl = self.u32()?;
        let rdlength = self.u16()? as usize;
        self.need(rdlength)?;
        let start = self.pos;
        let end = start + rdlength;
        let rdata = if rtype.has_embedded_names() {
            expand_rdata(self.data, start, end, rtype)?
        } else {
            self.data[start..end].to_vec()
        };
        self.pos = end;
        Ok(Record {
            name,
            rtype,
            class,
            ttl,
            rdata,
        })
    }
}

/// Read a possibly compressed name at `pos`. Returns the name and the offset
/// just past it in the original byte stream.
fn read_name(data: &[u8], mut pos: usize) -> Result<(DomainName, usize), WireError> {
    let mut labels: Vec<&[u8]> = Vec::new();
    let mut end = None;
    let mut hops = 0;
    loop {
        let len = *data.get(pos).ok_or(WireError::Truncated(pos))? as usize;
        match len & 0xc0 {
            0xc0 => {
                let low = *data.get(pos + 1).ok_or(WireError::Truncated(pos))? as usize;
                let target = ((len & 0x3f) << 8) | low;
                if end.is_none() {
                    end = Some(pos + 2);
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS || target >= data.len() {
                    return Err(WireError::BadPointer(pos));
                }
                pos = target;
            }
            0x00 => {
                if len == 0 {
                    let name = DomainName::from_labels(labels)?;
                    return Ok((name, end.unwrap_or(pos + 1)));
                }
                if len > MAX_LABEL_LEN {
                    return Err(NameError::InvalidLabelLength(len).into());
                }
                let label = data
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(WireError::Truncated(pos))?;
                labels.push(label);
                pos += 1 + len;
            }
            _ => return Err(WireError::BadPointer(pos)),
        }
    }
}

/// Rewrite rdata with every embedded name in uncompressed form.
fn expand_rdata(
    data: &[u8],
    start: usize,
    end: usize,
    rtype: RecordType,
) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(end - start);
    let mut pos = start;
    let names = match rtype {
        RecordType::MX => {
            out.extend_from_slice(data.get(pos..pos + 2).ok_or(WireError::Truncated(pos))?);
            pos += 2;
            1
        }
        RecordType::SOA => 2,
        _ => 1,
    };
    for _ in 0..names {
        let (name, next) = read_name(data, pos)?;
        out.extend(name.to_wire());
        pos = next;
    }
    if pos > end {
        return Err(WireError::Truncated(pos));
    }
    out.extend_from_slice(&data[pos..end]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_layout() {
        let name: DomainName = "example.com".parse().unwrap();
        let bytes = Message::query(0x1234, &name, RecordType::DNSKEY).to_bytes();

        assert_eq!(&bytes[..2], &[0x12, 0x34]);
        // RD and CD
        assert_eq!(&bytes[2..4], &[0x01, 0x10]);
        assert_eq!(&bytes[10..12], &[0x00, 0x01]);

        let parsed = Message::parse(&bytes).unwrap();
        assert_eq!(parsed.questions[0].name, name);
        assert_eq!(parsed.questions[0].rtype, RecordType::DNSKEY);
        let edns = parsed.edns.unwrap();
        assert!(edns.dnssec_ok);
        assert_eq!(edns.payload_size, EDNS_PAYLOAD_SIZE);
        assert!(parsed.header.rd && parsed.header.cd);
    }

    #[test]
    fn test_compressed_response() {
        // Response for example.com NS with the answer owner and the target
        // both compressed against the question name at offset 12.
        let mut msg = vec![
            0xab, 0xcd, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        msg.extend_from_slice(b"\x07example\x03com\x00");
        msg.extend_from_slice(&[0x00, 0x02, 0x00, 0x01]);
        msg.extend_from_slice(&[0xc0, 0x0c, 0x00, 0x02, 0x00, 0x01]);
        msg.extend_from_slice(&[0x00, 0x00, 0x0e, 0x10]);
        msg.extend_from_slice(&[0x00, 0x06]);
        msg.extend_from_slice(b"\x03ns1\xc0\x0c");

        let parsed = Message::parse(&msg).unwrap();
        assert!(parsed.header.qr);
        assert_eq!(parsed.answers.len(), 1);
        let answer = &parsed.answers[0];
        assert_eq!(answer.name, "example.com".parse().unwrap());
        assert_eq!(answer.ttl, 3600);
        let (target, _) = DomainName::from_wire(&answer.rdata).unwrap();
        assert_eq!(target, "ns1.example.com".parse().unwrap());
    }

    #[test]
    fn test_pointer_loop_rejected() {
        let mut msg = vec![0, 0, 0x81, 0x80, 0, 1, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(&[0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01]);
        assert!(matches!(
            Message::parse(&msg),
            Err(WireError::BadPointer(_))
        ));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(Message::parse(&[0; 4]), Err(WireError::InvalidHeader));
        let mut msg = vec![0, 0, 0x81, 0x80, 0, 1, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(b"\x07exam");
        assert!(Message::parse(&msg).is_err());
    }
}
