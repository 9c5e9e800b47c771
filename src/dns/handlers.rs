use crate::dns::challenge::ChallengeTable;
use crate::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::error;
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::client::rr::rdata::TXT;
use trust_dns_server::client::rr::{LowerName, Name, RData, Record, RecordType};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

/// TTL of the static CNAME/NS/SOA answers.
const STATIC_TTL: u32 = 1200;
/// TTL of dynamic challenge TXT answers; they change per validation.
const TXT_TTL: u32 = 1;

#[derive(Clone)]
pub struct Handler {
    zone: LowerName,
    ns: Name,
    soa_rname: Name,
    table: Arc<ChallengeTable>,
}

impl Handler {
    pub(super) fn new(zone: LowerName, ns: Name, table: Arc<ChallengeTable>) -> Result<Self, Error> {
        let soa_rname = Name::from_str("hostmaster")?.append_domain(&Name::from(&zone))?;
        Ok(Handler {
            zone,
            ns,
            soa_rname,
            table,
        })
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response: R,
    ) -> Result<ResponseInfo, Error> {
        // If it isn't a query, return NOTIMPL.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return self.send_error(request, response, ResponseCode::NotImp).await;
        }

        // Names outside the delegated zone are not ours to answer.
        if !self.zone.zone_of(request.query().name()) {
            return self.send_error(request, response, ResponseCode::Refused).await;
        }

        match request.query().query_type() {
            // The ACME server resolves addresses of the delegated
            // nameserver; redirect it to the real A record of the NS host.
            RecordType::A | RecordType::AAAA => {
                self.send_auth_resp(request, response, vec![self.cname_rdata()], STATIC_TTL)
                    .await
            }
            RecordType::NS => {
                self.send_auth_resp(request, response, vec![self.ns_rdata()], STATIC_TTL)
                    .await
            }
            RecordType::SOA => {
                self.send_auth_resp(request, response, vec![self.soa_rdata()], STATIC_TTL)
                    .await
            }
            RecordType::TXT => self.handle_request_txt(request, response).await,
            _ => self.send_nxdomain(request, response).await,
        }
    }

    async fn handle_request_txt<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let rdata = match self.table.get(request.query().name()).await {
            Some(value) => vec![RData::TXT(TXT::new(vec![value]))],
            // no challenge published right now: empty authoritative NOERROR
            None => Vec::new(),
        };
        self.send_auth_resp(request, response_handle, rdata, TXT_TTL)
            .await
    }

    fn cname_rdata(&self) -> RData {
        RData::CNAME(self.ns.clone())
    }

    fn ns_rdata(&self) -> RData {
        RData::NS(self.ns.clone())
    }

    fn soa_rdata(&self) -> RData {
        let serial = u32::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or_default();
        RData::SOA(SOA::new(
            self.ns.clone(),
            self.soa_rname.clone(),
            serial,
            28_800, // refresh: 8 hrs.
            7_200,  // retry: 2 hrs.
            300,    // expire
            0,      // minimum: do not cache negative answers
        ))
    }

    async fn send_auth_resp<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        rdata: Vec<RData>,
        ttl: u32,
    ) -> Result<ResponseInfo, Error> {
        let records: Vec<Record> = rdata
            .iter()
            .map(|rd| Record::from_rdata(request.query().name().into(), ttl, rd.clone()))
            .collect();
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_recursion_available(false);
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(header, records.iter(), &[], &[], &[]);
        Ok(response_handle.send_response(response).await?)
    }

    async fn send_nxdomain<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let builder = MessageResponseBuilder::from_message_request(request);
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_recursion_available(false);
        header.set_response_code(ResponseCode::NXDomain);
        let response = builder.build_no_records(header);
        Ok(response_handle.send_response(response).await?)
    }

    async fn send_error<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        code: ResponseCode,
    ) -> Result<ResponseInfo, Error> {
        let response = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(response.error_msg(request.header(), code))
            .await?)
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(err) => {
                error!("error in RequestHandler: {:?}", err);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
