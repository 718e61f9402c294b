use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::dns::enums::Rcode;
use crate::dns::rdata::Rrsig;
use crate::dns::{DomainName, Message, Record, RecordClass, RecordType, RrSet, SignedRrSet};

/// Records returned for a query, with the RRSIGs that cover them
pub type Answer = SignedRrSet;

/// Signed NSEC/NSEC3 records from the authority section of a negative answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenialProof {
    pub records: Vec<SignedRrSet>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No data{}", fmt_denial(.denial))]
    NoData { denial: Option<DenialProof> },

    #[error("Query timed out")]
    Timeout,

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Server failure (rcode {0})")]
    ServerFailure(u16),

    #[error("IO error: {0}")]
    Io(String),
}

fn fmt_denial(denial: &Option<DenialProof>) -> String {
    match denial {
        Some(proof) => format!(" ({} denial records)", proof.records.len()),
        None => String::new(),
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        ResolveError::Io(err.to_string())
    }
}

/// Source of DNS answers for the chain builder.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, name: &DomainName, rtype: RecordType) -> Result<Answer, ResolveError>;
}

/// Pick the RRset for `name`/`rtype` out of a response and the RRSIGs over it.
pub fn extract_answer(
    message: &Message,
    name: &DomainName,
    rtype: RecordType,
) -> Result<Answer, ResolveError> {
    match message.rcode() {
        r if r == Rcode::NOERROR as u16 || r == Rcode::NXDOMAIN as u16 => {}
        r => return Err(ResolveError::ServerFailure(r)),
    }

    // Answers are read in the class that was asked for
    let class = message
        .questions
        .first()
        .map(|q| q.class)
        .unwrap_or(RecordClass::IN);

    if let Some(rrset) = RrSet::from_records(&message.answers, name, rtype, class) {
        let signatures = covering_signatures(&message.answers, name, rtype, class);
        return Ok(SignedRrSet { rrset, signatures });
    }

    let records = denial_records(&message.authorities, class);
    debug!(
        "No {} {} in response, {} denial records",
        name,
        rtype,
        records.len()
    );
    let denial = (!records.is_empty()).then_some(DenialProof { records });
    Err(ResolveError::NoData { denial })
}

fn covering_signatures(
    records: &[Record],
    name: &DomainName,
    rtype: RecordType,
    class: RecordClass,
) -> Vec<Rrsig> {
    records
        .iter()
        .filter(|r| r.rtype == RecordType::RRSIG && r.class == class && &r.name == name)
        .filter_map(|r| match Rrsig::parse(&r.rdata) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("Ignoring unparsable RRSIG at {}: {}", r.name, e);
                None
            }
        })
        .filter(|sig| sig.type_covered == rtype)
        .collect()
}

fn denial_records(authority: &[Record], class: RecordClass) -> Vec<SignedRrSet> {
    let mut owners: Vec<(DomainName, RecordType)> = Vec::new();
    for record in authority {
        if matches!(record.rtype, RecordType::NSEC | RecordType::NSEC3) && record.class == class {
            let key = (record.name.clone(), record.rtype);
            if !owners.contains(&key) {
                owners.push(key);
            }
        }
    }
    owners
        .into_iter()
        .filter_map(|(owner, rtype)| {
            let rrset = RrSet::from_records(authority, &owner, rtype, class)?;
            let signatures = covering_signatures(authority, &owner, rtype, class);
            Some(SignedRrSet { rrset, signatures })
        })
        .collect()
}

/// Stub resolver that sends DO+CD queries to upstream servers over UDP,
/// retrying over TCP when the answer is truncated.
#[derive(Debug, Clone)]
pub struct UdpResolver {
    servers: Vec<SocketAddr>,
    timeout: Duration,
    retries: u32,
}

impl UdpResolver {
    pub fn new(servers: Vec<SocketAddr>, timeout: Duration, retries: u32) -> Self {
        Self {
            servers,
            timeout,
            retries,
        }
    }

    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    async fn query(&self, name: &DomainName, rtype: RecordType) -> Result<Message, ResolveError> {
        let mut last_error = ResolveError::Io("no upstream servers configured".to_string());
        for &server in &self.servers {
            match self.query_upstream(name, rtype, server).await {
                Ok(message) => return Ok(message),
                Err(e) => {
                    debug!("Upstream {} failed for {} {}: {}", server, name, rtype, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn query_upstream(
        &self,
        name: &DomainName,
        rtype: RecordType,
        server: SocketAddr,
    ) -> Result<Message, ResolveError> {
        for retry in 0..=self.retries {
            let id = rand::random::<u16>();
            let query = Message::query(id, name, rtype).to_bytes();
            trace!("Sending {} bytes to upstream {}", query.len(), server);

            match timeout(self.timeout, self.exchange(&query, id, server)).await {
                Ok(Ok(message)) => {
                    if retry > 0 {
                        debug!("Query succeeded on retry {}", retry);
                    }
                    return Ok(message);
                }
                Ok(Err(e @ ResolveError::Malformed(_))) => return Err(e),
                Ok(Err(e)) if retry == self.retries => return Err(e),
                Err(_) if retry == self.retries => return Err(ResolveError::Timeout),
                Ok(Err(e)) => debug!("Query attempt {} failed, retrying: {}", retry + 1, e),
                Err(_) => debug!("Query attempt {} timed out, retrying", retry + 1),
            }
            tokio::time::sleep(Duration::from_millis(100 * (retry as u64 + 1))).await;
        }
        Err(ResolveError::Timeout)
    }

    async fn exchange(&self, query: &[u8], id: u16, server: SocketAddr) -> Result<Message, ResolveError> {
        let response = send_udp(query, id, server).await?;
        if response.header.tc {
            debug!("UDP response truncated, retrying with TCP");
            return send_tcp(query, id, server).await;
        }
        Ok(response)
    }
}

fn check_response(buf: &[u8], id: u16) -> Result<Message, ResolveError> {
    let message = Message::parse(buf).map_err(|e| ResolveError::Malformed(e.to_string()))?;
    if message.header.id != id || !message.header.qr {
        return Err(ResolveError::Malformed(format!(
            "unexpected response id {} (expected {})",
            message.header.id, id
        )));
    }
    Ok(message)
}

async fn send_udp(query: &[u8], id: u16, server: SocketAddr) -> Result<Message, ResolveError> {
    let bind = if server.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(server).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; 65535];
    loop {
        let len = socket.recv(&mut buf).await?;
        trace!("Raw UDP response data ({} bytes)", len);
        match check_response(&buf[..len], id) {
            // Stray datagrams with another id are dropped
            Err(ResolveError::Malformed(e)) if e.starts_with("unexpected response id") => {
                debug!("Dropping datagram from {}: {}", server, e);
            }
            other => return other,
        }
    }
}

async fn send_tcp(query: &[u8], id: u16, server: SocketAddr) -> Result<Message, ResolveError> {
    let mut stream = TcpStream::connect(server).await?;
    stream.write_all(&(query.len() as u16).to_be_bytes()).await?;
    stream.write_all(query).await?;
    stream.flush().await?;

    let mut length_buf = [0u8; 2];
    stream.read_exact(&mut length_buf).await?;
    let mut buf = vec![0u8; u16::from_be_bytes(length_buf) as usize];
    stream.read_exact(&mut buf).await?;
    trace!("Raw TCP response data ({} bytes)", buf.len());
    check_response(&buf, id)
}

#[async_trait]
impl Resolver for UdpResolver {
    async fn resolve(&self, name: &DomainName, rtype: RecordType) -> Result<Answer, ResolveError> {
        let message = self.query(name, rtype).await?;
        extract_answer(&message, name, rtype)
    }
}

/// Resolver answering from a fixed table, used for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    answers: HashMap<(DomainName, RecordType), Result<Answer, ResolveError>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, answer: Answer) {
        let key = (answer.rrset.name.clone(), answer.rrset.rtype);
        self.answers.insert(key, Ok(answer));
    }

    pub fn insert_error(&mut self, name: DomainName, rtype: RecordType, error: ResolveError) {
        self.answers.insert((name, rtype), Err(error));
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, name: &DomainName, rtype: RecordType) -> Result<Answer, ResolveError> {
        self.answers
            .get(&(name.clone(), rtype))
            .cloned()
            .unwrap_or(Err(ResolveError::NoData { denial: None }))
    }
}

impl fmt::Display for DenialProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, signed) in self.records.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", signed.rrset)?;
        }
        Ok(())
    }
}
