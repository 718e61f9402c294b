use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

/// Maximum length of a single label in octets (RFC 1035 2.3.4)
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum length of a name in wire format, including the root label
pub const MAX_NAME_LEN: usize = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Empty label in domain name: {0}")]
    EmptyLabel(String),

    #[error("Invalid label length: {0}")]
    InvalidLabelLength(usize),

    #[error("DNS name too long")]
    NameTooLong,

    #[error("Compression pointer loop in domain name")]
    PointerLoop,

    #[error("Truncated domain name")]
    Truncated,

    #[error("Invalid escape in domain name: {0}")]
    InvalidEscape(String),
}

/// A domain name as a sequence of labels.
///
/// Labels are stored least-significant first, so `www.example.com` is
/// `["www", "example", "com"]` and the root is the empty sequence. Comparison
/// and hashing ignore ASCII case.
#[derive(Clone, Default)]
pub struct DomainName {
    labels: Vec<Vec<u8>>,
}

impl DomainName {
    /// The root name `.`
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Build a name from raw labels, least-significant first.
    pub fn from_labels<I, L>(labels: I) -> Result<Self, NameError>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        let mut out = Vec::new();
        let mut wire_len = 1;
        for label in labels {
            let label = label.as_ref();
            if label.is_empty() {
                return Err(NameError::EmptyLabel(String::from_utf8_lossy(label).into()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(NameError::InvalidLabelLength(label.len()));
            }
            wire_len += label.len() + 1;
            if wire_len > MAX_NAME_LEN {
                return Err(NameError::NameTooLong);
            }
            out.push(label.to_vec());
        }
        Ok(Self { labels: out })
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of labels, not counting the root
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        self.labels.iter().map(Vec::as_slice)
    }

    /// The name one label up, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            labels: self.labels[1..].to_vec(),
        })
    }

    /// Walk from this name up to the root.
    ///
    /// Yields `label_count() + 1` names: the name itself, each ancestor, and
    /// finally the root.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            name: self,
            skip: Some(0),
        }
    }

    /// True if `self` equals `other` or lies below it.
    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        if other.label_count() > self.label_count() {
            return false;
        }
        let offset = self.label_count() - other.label_count();
        self.labels[offset..]
            .iter()
            .zip(other.labels.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// True if `other` is a strict ancestor of `self`.
    pub fn is_proper_subdomain_of(&self, other: &DomainName) -> bool {
        self.label_count() > other.label_count() && self.is_subdomain_of(other)
    }

    /// Keep only the rightmost `count` labels.
    pub fn trim_to(&self, count: usize) -> Self {
        let count = count.min(self.label_count());
        Self {
            labels: self.labels[self.label_count() - count..].to_vec(),
        }
    }

    /// Prepend the wildcard label.
    pub fn to_wildcard(&self) -> Self {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(b"*".to_vec());
        labels.extend(self.labels.iter().cloned());
        Self { labels }
    }

    pub fn to_lowercase(&self) -> Self {
        Self {
            labels: self.labels.iter().map(|l| l.to_ascii_lowercase()).collect(),
        }
    }

    /// Uncompressed wire format, case preserved.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.write_wire(&mut out, false);
        out
    }

    /// Uncompressed wire format with every label lower-cased (RFC 4034 6.2).
    pub fn to_canonical_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.write_wire(&mut out, true);
        out
    }

    pub fn write_wire(&self, out: &mut Vec<u8>, lowercase: bool) {
        for label in &self.labels {
            out.push(label.len() as u8);
            if lowercase {
                out.extend(label.iter().map(u8::to_ascii_lowercase));
            } else {
                out.extend_from_slice(label);
            }
        }
        out.push(0);
    }

    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Read an uncompressed name from the start of `data`.
    ///
    /// Returns the name and the number of octets consumed.
    pub fn from_wire(data: &[u8]) -> Result<(Self, usize), NameError> {
        let mut labels = Vec::new();
        let mut pos = 0;
        loop {
            let len = *data.get(pos).ok_or(NameError::Truncated)? as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            if len > MAX_LABEL_LEN {
                return Err(NameError::InvalidLabelLength(len));
            }
            let label = data.get(pos..pos + len).ok_or(NameError::Truncated)?;
            labels.push(label.to_vec());
            pos += len;
        }
        Ok((Self::from_labels(labels)?, pos))
    }

    /// Canonical DNS name order (RFC 4034 6.1).
    pub fn canonical_cmp(&self, other: &DomainName) -> Ordering {
        let left = self.labels.iter().rev().map(|l| l.to_ascii_lowercase());
        let right = other.labels.iter().rev().map(|l| l.to_ascii_lowercase());
        left.cmp(right)
    }

    /// First (least-significant) label as lower-case text, if any.
    pub fn first_label(&self) -> Option<String> {
        self.labels
            .first()
            .map(|l| String::from_utf8_lossy(&l.to_ascii_lowercase()).into_owned())
    }
}

/// Lazy walk from a name up to the root. See [`DomainName::ancestors`].
pub struct Ancestors<'a> {
    name: &'a DomainName,
    skip: Option<usize>,
}

impl Iterator for Ancestors<'_> {
    type Item = DomainName;

    fn next(&mut self) -> Option<Self::Item> {
        let skip = self.skip?;
        let labels = self.name.labels[skip..].to_vec();
        // The root is the terminal element
        self.skip = if skip < self.name.labels.len() {
            Some(skip + 1)
        } else {
            None
        };
        Some(DomainName { labels })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .skip
            .map_or(0, |skip| self.name.labels.len() - skip + 1);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Ancestors<'_> {}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(other.labels.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for DomainName {}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.labels.len().hash(state);
        for label in &self.labels {
            for byte in label {
                state.write_u8(byte.to_ascii_lowercase());
            }
            state.write_u8(b'.');
        }
    }
}

impl FromStr for DomainName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "." {
            return Ok(Self::root());
        }
        Self::from_labels(parse_labels(s)?)
    }
}

/// Split presentation text into labels, undoing `\X` and `\DDD` escapes
/// (RFC 1035 5.1). A single trailing dot is allowed.
fn parse_labels(s: &str) -> Result<Vec<Vec<u8>>, NameError> {
    let bytes = s.as_bytes();
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let digits = bytes.get(i + 1..i + 4).filter(|d| d.iter().all(u8::is_ascii_digit));
                if let Some(digits) = digits {
                    let value = digits
                        .iter()
                        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
                    let byte = u8::try_from(value)
                        .map_err(|_| NameError::InvalidEscape(s.to_string()))?;
                    label.push(byte);
                    i += 4;
                } else {
                    let &next = bytes
                        .get(i + 1)
                        .ok_or_else(|| NameError::InvalidEscape(s.to_string()))?;
                    label.push(next);
                    i += 2;
                }
            }
            b'.' => {
                if label.is_empty() {
                    return Err(NameError::EmptyLabel(s.to_string()));
                }
                labels.push(std::mem::take(&mut label));
                i += 1;
            }
            byte => {
                label.push(byte);
                i += 1;
            }
        }
    }
    if !label.is_empty() {
        labels.push(label);
    }
    Ok(labels)
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }
        for label in &self.labels {
            for &byte in label {
                match byte {
                    b'.' | b'\\' => write!(f, "\\{}", byte as char)?,
                    0x21..=0x7e => write!(f, "{}", byte as char)?,
                    _ => write!(f, "\\{:03}", byte)?,
                }
            }
            write!(f, ".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainName({})", self)
    }
}
