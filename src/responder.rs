//! DNS request handler answering from the health-gated record store.

use async_trait::async_trait;
use hickory_proto::op::{Header, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{DNSClass, LowerName, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

use crate::dnssec::ResponseExtension;
use crate::metrics::{self, QueryResult, Timer};
use crate::store::{Lookup, RecordStore};

/// What a query resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The query class is not IN.
    NotImplemented,
    /// Nothing is configured under the name.
    NxDomain,
    /// The name exists but has no records of the queried type. Cacheable,
    /// since it only depends on configuration.
    NoData,
    /// Records exist but none is healthy. Answered with SERVFAIL so that
    /// resolvers do not cache the outage.
    Unavailable,
    /// Healthy records, in configuration order.
    Answer(Vec<Record>),
}

impl Resolution {
    /// Response code sent for this resolution.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Resolution::NotImplemented => ResponseCode::NotImp,
            Resolution::NxDomain => ResponseCode::NXDomain,
            Resolution::NoData | Resolution::Answer(_) => ResponseCode::NoError,
            Resolution::Unavailable => ResponseCode::ServFail,
        }
    }

    fn query_result(&self) -> QueryResult {
        match self {
            Resolution::NotImplemented => QueryResult::NotImplemented,
            Resolution::NxDomain => QueryResult::NxDomain,
            Resolution::NoData => QueryResult::NoData,
            Resolution::Unavailable => QueryResult::Unavailable,
            Resolution::Answer(_) => QueryResult::Success,
        }
    }
}

/// Answers queries from a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct DynamicResponder {
    store: RecordStore,
    extensions: Arc<HashMap<LowerName, Arc<dyn ResponseExtension>>>,
}

impl DynamicResponder {
    /// Create a responder with no per-name extensions.
    pub fn new(store: RecordStore) -> Self {
        Self::with_extensions(store, HashMap::new())
    }

    /// Create a responder consulting the given per-name extensions.
    pub fn with_extensions(
        store: RecordStore,
        extensions: HashMap<LowerName, Arc<dyn ResponseExtension>>,
    ) -> Self {
        Self {
            store,
            extensions: Arc::new(extensions),
        }
    }

    /// The store answers are drawn from.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Decide how to answer a question. First matching rule wins.
    pub fn resolve(&self, name: &LowerName, rtype: RecordType, class: DNSClass) -> Resolution {
        if class != DNSClass::IN {
            return Resolution::NotImplemented;
        }

        match self.store.lookup(name, rtype) {
            Lookup::UnknownName => Resolution::NxDomain,
            Lookup::NoSuchType => Resolution::NoData,
            Lookup::AllDisabled => Resolution::Unavailable,
            Lookup::Enabled(records) => Resolution::Answer(records),
        }
    }

    fn extension(&self, name: &LowerName) -> Option<&Arc<dyn ResponseExtension>> {
        self.extensions.get(name)
    }
}

fn send_failed(e: std::io::Error) -> ResponseInfo {
    error!(error = %e, "Failed to send DNS response");
    let mut header = Header::new();
    header.set_response_code(ResponseCode::ServFail);
    header.into()
}

#[async_trait]
impl RequestHandler for DynamicResponder {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();
        let mut builder = MessageResponseBuilder::from_message_request(request);

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);

        if request.header().message_type() != MessageType::Query
            || request.header().op_code() != OpCode::Query
        {
            debug!(
                src = %request.src(),
                op_code = ?request.header().op_code(),
                "Unsupported DNS operation"
            );
            metrics::record_query("-", QueryResult::NotImplemented, timer.elapsed());
            header.set_response_code(ResponseCode::NotImp);
            let response = builder.build_no_records(header);
            return match response_handle.send_response(response).await {
                Ok(info) => info,
                Err(e) => send_failed(e),
            };
        }

        let request_info = match request.request_info() {
            Ok(info) => info,
            Err(e) => {
                debug!(src = %request.src(), error = %e, "Malformed DNS request");
                metrics::record_query("-", QueryResult::Malformed, timer.elapsed());
                let response = builder.error_msg(request.header(), ResponseCode::FormErr);
                return match response_handle.send_response(response).await {
                    Ok(info) => info,
                    Err(e) => send_failed(e),
                };
            }
        };

        let query = request_info.query;
        let name = query.name();
        let rtype = query.query_type();
        let dnssec_ok = request
            .edns()
            .map(|edns| edns.flags().dnssec_ok)
            .unwrap_or(false);

        info!(
            name = %name,
            rtype = %rtype,
            src = %request.src(),
            dnssec_ok,
            "DNS request received"
        );

        let resolution = self.resolve(name, rtype, query.query_class());
        header.set_response_code(resolution.response_code());

        // Only positive answers advertise DNSSEC awareness
        if let (Resolution::Answer(_), Some(extension)) = (&resolution, self.extension(name)) {
            if let Some(edns) = extension.response_edns(request.edns()) {
                builder.edns(edns);
            }
        }

        trace!(name = %name, rtype = %rtype, resolution = ?resolution, "resolved");
        metrics::record_query(&rtype.to_string(), resolution.query_result(), timer.elapsed());

        let result = match &resolution {
            Resolution::Answer(records) => {
                metrics::record_answer_size(records.len());
                let response = builder.build(header, records.iter(), &[], &[], &[]);
                response_handle.send_response(response).await
            }
            _ => {
                let response = builder.build_no_records(header);
                response_handle.send_response(response).await
            }
        };

        match result {
            Ok(info) => info,
            Err(e) => send_failed(e),
        }
    }
}
