use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown record type or class mnemonic: {0}")]
pub struct UnknownMnemonic(pub String);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    OPT,
    DS,
    RRSIG,
    NSEC,
    DNSKEY,
    NSEC3,
    NSEC3PARAM,
    Unknown(u16),
}

impl RecordType {
    /// Types whose rdata embeds domain names that are lower-cased in
    /// canonical form and may be compressed on the wire.
    pub fn has_embedded_names(self) -> bool {
        matches!(
            self,
            RecordType::NS | RecordType::CNAME | RecordType::PTR | RecordType::MX | RecordType::SOA
        )
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            41 => RecordType::OPT,
            43 => RecordType::DS,
            46 => RecordType::RRSIG,
            47 => RecordType::NSEC,
            48 => RecordType::DNSKEY,
            50 => RecordType::NSEC3,
            51 => RecordType::NSEC3PARAM,
            x => RecordType::Unknown(x),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::OPT => 41,
            RecordType::DS => 43,
            RecordType::RRSIG => 46,
            RecordType::NSEC => 47,
            RecordType::DNSKEY => 48,
            RecordType::NSEC3 => 50,
            RecordType::NSEC3PARAM => 51,
            RecordType::Unknown(x) => x,
        }
    }
}

impl FromStr for RecordType {
    type Err = UnknownMnemonic;

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
            "OPT" => RecordType::OPT,
            "DS" => RecordType::DS,
            "RRSIG" => RecordType::RRSIG,
            "NSEC" => RecordType::NSEC,
            "DNSKEY" => RecordType::DNSKEY,
            "NSEC3" => RecordType::NSEC3,
            "NSEC3PARAM" => RecordType::NSEC3PARAM,
            other => {
                let code = other
                    .strip_prefix("TYPE")
                    .and_then(|n| n.parse::<u16>().ok())
                    .ok_or_else(|| UnknownMnemonic(s.to_string()))?;
                RecordType::from(code)
            }
        };
        Ok(rtype)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::NS => "NS",
            RecordType::CNAME => "CNAME",
            RecordType::SOA => "SOA",
            RecordType::PTR => "PTR",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::AAAA => "AAAA",
            RecordType::OPT => "OPT",
            RecordType::DS => "DS",
            RecordType::RRSIG => "RRSIG",
            RecordType::NSEC => "NSEC",
            RecordType::DNSKEY => "DNSKEY",
            RecordType::NSEC3 => "NSEC3",
            RecordType::NSEC3PARAM => "NSEC3PARAM",
            RecordType::Unknown(x) => return write!(f, "TYPE{}", x),
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecordClass {
    #[default]
    IN,
    CH,
    HS,
    Unknown(u16),
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            3 => RecordClass::CH,
            4 => RecordClass::HS,
            x => RecordClass::Unknown(x),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::CH => 3,
            RecordClass::HS => 4,
            RecordClass::Unknown(x) => x,
        }
    }
}

impl FromStr for RecordClass {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(RecordClass::IN),
            "CH" => Ok(RecordClass::CH),
            "HS" => Ok(RecordClass::HS),
            other => other
                .strip_prefix("CLASS")
                .and_then(|n| n.parse::<u16>().ok())
                .map(RecordClass::from)
                .ok_or_else(|| UnknownMnemonic(s.to_string())),
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordClass::IN => f.write_str("IN"),
            RecordClass::CH => f.write_str("CH"),
            RecordClass::HS => f.write_str("HS"),
            RecordClass::Unknown(x) => write!(f, "CLASS{}", x),
        }
    }
}

/// DNS Response Code constants from RFC 1035
pub struct Rcode;

impl Rcode {
    pub const NOERROR: u8 = 0;
    pub const FORMERR: u8 = 1;
    pub const SERVFAIL: u8 = 2;
    pub const NXDOMAIN: u8 = 3;
    pub const NOTIMP: u8 = 4;
    pub const REFUSED: u8 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        for rtype in [
            RecordType::A,
            RecordType::DS,
            RecordType::DNSKEY,
            RecordType::NSEC3,
            RecordType::Unknown(65280),
        ] {
            let code: u16 = rtype.into();
            assert_eq!(RecordType::from(code), rtype);
        }
        assert_eq!(u16::from(RecordType::RRSIG), 46);
    }

    #[test]
    fn test_type_mnemonics() {
        assert_eq!("dnskey".parse::<RecordType>().unwrap(), RecordType::DNSKEY);
        assert_eq!("TYPE48".parse::<RecordType>().unwrap(), RecordType::DNSKEY);
        assert_eq!(
            "type65280".parse::<RecordType>().unwrap(),
            RecordType::Unknown(65280)
        );
        assert!("BOGUS".parse::<RecordType>().is_err());
        assert_eq!(RecordType::Unknown(99).to_string(), "TYPE99");
    }

    #[test]
    fn test_class() {
        assert_eq!("in".parse::<RecordClass>().unwrap(), RecordClass::IN);
        assert_eq!(RecordClass::from(254), RecordClass::Unknown(254));
        assert_eq!(RecordClass::Unknown(254).to_string(), "CLASS254");
    }
}
