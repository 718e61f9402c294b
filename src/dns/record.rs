use std::fmt;

use super::enums::{RecordClass, RecordType};
use super::name::{DomainName, NameError};
use super::rdata::Rrsig;

/// A single resource record with opaque, uncompressed rdata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub name: DomainName,
    pub rtype: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

/// All records sharing owner, type and class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RrSet {
    pub name: DomainName,
    pub rtype: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    rdata: Vec<Vec<u8>>,
}

impl RrSet {
    pub fn new(name: DomainName, rtype: RecordType, class: RecordClass, ttl: u32) -> Self {
        Self {
            name,
            rtype,
            class,
            ttl,
            rdata: Vec::new(),
        }
    }

    /// Add one rdata; duplicates are dropped. Returns whether it was new.
    pub fn push(&mut self, rdata: Vec<u8>) -> bool {
        if self.rdata.contains(&rdata) {
            return false;
        }
        self.rdata.push(rdata);
        true
    }

    pub fn with_rdata<I>(mut self, rdata: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        for r in rdata {
            self.push(r);
        }
        self
    }

    pub fn rdata(&self) -> &[Vec<u8>] {
        &self.rdata
    }

    pub fn len(&self) -> usize {
        self.rdata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdata.is_empty()
    }

    /// Collect records matching `name`/`rtype`/`class` into a set.
    ///
    /// Returns `None` when nothing matches. The TTL is the lowest seen.
    pub fn from_records<'a, I>(
        records: I,
        name: &DomainName,
        rtype: RecordType,
        class: RecordClass,
    ) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut set: Option<RrSet> = None;
        for record in records {
            if record.rtype != rtype || record.class != class || &record.name != name {
                continue;
            }
            let set = set
                .get_or_insert_with(|| RrSet::new(record.name.clone(), rtype, class, record.ttl));
            set.ttl = set.ttl.min(record.ttl);
            set.push(record.rdata.clone());
        }
        set
    }

    /// Each rdata in canonical form, sorted and deduplicated (RFC 4034 6.3).
    pub fn canonical_rdata(&self) -> Result<Vec<Vec<u8>>, NameError> {
        let mut out = self
            .rdata
            .iter()
            .map(|r| canonical_rdata(self.rtype, r))
            .collect::<Result<Vec<_>, _>>()?;
        out.sort();
        out.dedup();
        Ok(out)
    }

    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rdata.iter().map(|r| Record {
            name: self.name.clone(),
            rtype: self.rtype,
            class: self.class,
            ttl: self.ttl,
            rdata: r.clone(),
        })
    }
}

impl fmt::Display for RrSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({} records)",
            self.name,
            self.ttl,
            self.class,
            self.rtype,
            self.rdata.len()
        )
    }
}

/// An RRset together with the RRSIGs that cover it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRrSet {
    pub rrset: RrSet,
    pub signatures: Vec<Rrsig>,
}

impl SignedRrSet {
    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty()
    }
}

/// Lower-case the domain names embedded in rdata of the types listed in
/// RFC 4034 6.2. Other types are returned unchanged.
pub fn canonical_rdata(rtype: RecordType, rdata: &[u8]) -> Result<Vec<u8>, NameError> {
    match rtype {
        RecordType::NS | RecordType::CNAME | RecordType::PTR => {
            let (name, used) = DomainName::from_wire(rdata)?;
            let mut out = name.to_canonical_wire();
            out.extend_from_slice(&rdata[used..]);
            Ok(out)
        }
        RecordType::MX => {
            let preference = rdata.get(..2).ok_or(NameError::Truncated)?;
            let (name, used) = DomainName::from_wire(&rdata[2..])?;
            let mut out = preference.to_vec();
            out.extend(name.to_canonical_wire());
            out.extend_from_slice(&rdata[2 + used..]);
            Ok(out)
        }
        RecordType::SOA => {
            let (mname, first) = DomainName::from_wire(rdata)?;
            let (rname, second) = DomainName::from_wire(&rdata[first..])?;
            let mut out = mname.to_canonical_wire();
            out.extend(rname.to_canonical_wire());
            out.extend_from_slice(&rdata[first + second..]);
            Ok(out)
        }
        _ => Ok(rdata.to_vec()),
    }
}
