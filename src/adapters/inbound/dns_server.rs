//! DNS Server Adapter
//!
//! Authoritative DNS for the fleet zone. Answers A, AAAA and CNAME
//! queries from the DNS Directory, following alias CNAMEs that point at
//! names inside the directory.

use crate::domain::entities::DnsRecordSet;
use crate::domain::ports::DnsDirectory;
use crate::domain::value_objects::{normalize_name, RecordType, ZoneName};
use crate::infrastructure::ShutdownController;
use hickory_proto::op::{Header, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME};
use hickory_proto::rr::{Name, RData, Record, RecordType as WireType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use hickory_server::ServerFuture;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};

/// Longest alias chain followed before giving up.
const MAX_CNAME_CHAIN: usize = 8;

/// Idle timeout for DNS over TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of resolving one question against the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Record sets to return, aliases first
    Answer(Vec<DnsRecordSet>),
    /// The name exists but holds nothing of the queried type
    NoData,
    NxDomain,
    /// The name is outside the zone we serve
    Refused,
}

/// DNS Request Handler.
pub struct DnsHandler {
    zone: ZoneName,
    directory: Arc<dyn DnsDirectory>,
}

impl DnsHandler {
    pub fn new(zone: ZoneName, directory: Arc<dyn DnsDirectory>) -> Self {
        Self { zone, directory }
    }

    /// Resolve a question, chasing CNAMEs inside the directory.
    pub async fn resolve(&self, name: &str, record_type: RecordType) -> Resolution {
        let mut current = normalize_name(name);
        if !self.zone.contains(&current) {
            return Resolution::Refused;
        }

        let mut chain = Vec::new();
        for _ in 0..MAX_CNAME_CHAIN {
            if let Some(found) = self.directory.lookup(&current, record_type).await {
                chain.push(found);
                return Resolution::Answer(chain);
            }
            if record_type == RecordType::Cname {
                break;
            }

            let Some(alias) = self.directory.lookup(&current, RecordType::Cname).await else {
                break;
            };
            let Some(target) = alias.values.iter().next().map(|t| normalize_name(t)) else {
                break;
            };
            chain.push(alias);

            if !self.zone.contains(&target) {
                // The resolver follows targets we are not authoritative for.
                return Resolution::Answer(chain);
            }
            current = target;
        }

        if !chain.is_empty() {
            return Resolution::Answer(chain);
        }
        if self.name_exists(&current).await {
            Resolution::NoData
        } else {
            Resolution::NxDomain
        }
    }

    async fn name_exists(&self, name: &str) -> bool {
        for record_type in [RecordType::A, RecordType::Aaaa, RecordType::Cname] {
            if self.directory.lookup(name, record_type).await.is_some() {
                return true;
            }
        }
        false
    }
}

/// Wire records for a resolved chain. Unparseable values are skipped.
pub fn to_records(chain: &[DnsRecordSet]) -> Vec<Record> {
    let mut records = Vec::new();

    for set in chain {
        let Ok(owner) = Name::from_str(&format!("{}.", set.name)) else {
            tracing::warn!("invalid owner name in directory: {}", set.name);
            continue;
        };

        for value in &set.values {
            let rdata = match set.record_type {
                RecordType::A => value.parse::<Ipv4Addr>().ok().map(|ip| RData::A(A(ip))),
                RecordType::Aaaa => value.parse::<Ipv6Addr>().ok().map(|ip| RData::AAAA(AAAA(ip))),
                RecordType::Cname => Name::from_str(&format!("{}.", normalize_name(value)))
                    .ok()
                    .map(|target| RData::CNAME(CNAME(target))),
            };

            match rdata {
                Some(rdata) => records.push(Record::from_rdata(owner.clone(), set.ttl, rdata)),
                None => tracing::warn!(
                    "skipping invalid {} value {} for {}",
                    set.record_type,
                    value,
                    set.name
                ),
            }
        }
    }

    records
}

fn record_type_for(query_type: WireType) -> Option<RecordType> {
    match query_type {
        WireType::A => Some(RecordType::A),
        WireType::AAAA => Some(RecordType::Aaaa),
        WireType::CNAME => Some(RecordType::Cname),
        _ => None,
    }
}

#[async_trait::async_trait]
impl RequestHandler for DnsHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let query = request.query();
        let name = query.name().to_string();
        let query_type = query.query_type();

        tracing::debug!("DNS query: {} {} from {}", name, query_type, request.src());

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);

        let resolution = match record_type_for(query_type) {
            Some(record_type) => self.resolve(&name, record_type).await,
            None => {
                header.set_response_code(ResponseCode::NotImp);
                let response = MessageResponseBuilder::from_message_request(request).build_no_records(header);
                return response_handle.send_response(response).await.unwrap_or_else(|e| {
                    tracing::error!("DNS response error: {:?}", e);
                    header.into()
                });
            }
        };

        let answers = match resolution {
            Resolution::Answer(chain) => {
                header.set_response_code(ResponseCode::NoError);
                to_records(&chain)
            }
            Resolution::NoData => {
                header.set_response_code(ResponseCode::NoError);
                Vec::new()
            }
            Resolution::NxDomain => {
                tracing::debug!("DNS NXDOMAIN: {}", name);
                header.set_response_code(ResponseCode::NXDomain);
                Vec::new()
            }
            Resolution::Refused => {
                header.set_authoritative(false);
                header.set_response_code(ResponseCode::Refused);
                Vec::new()
            }
        };

        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            answers.iter(),
            [],
            [],
            [],
        );

        response_handle.send_response(response).await.unwrap_or_else(|e| {
            tracing::error!("DNS response error: {:?}", e);
            header.into()
        })
    }
}

/// DNS server for the fleet zone over UDP and TCP.
pub struct DnsServer {
    listen_addr: String,
    handler: DnsHandler,
}

impl DnsServer {
    pub fn new(listen_addr: String, zone: ZoneName, directory: Arc<dyn DnsDirectory>) -> Self {
        Self {
            listen_addr,
            handler: DnsHandler::new(zone, directory),
        }
    }

    /// Serve until shutdown is signalled.
    pub async fn run(self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let addr: SocketAddr = self.listen_addr.parse()?;
        let zone = self.handler.zone.clone();

        let mut server = ServerFuture::new(self.handler);
        server.register_socket(UdpSocket::bind(addr).await?);
        server.register_listener(TcpListener::bind(addr).await?, TCP_TIMEOUT);

        tracing::info!("DNS server for {} listening on {}", zone, self.listen_addr);

        tokio::select! {
            result = server.block_until_done() => result?,
            _ = shutdown.wait() => {
                tracing::info!("DNS server stopping");
            }
        }
        Ok(())
    }
}
