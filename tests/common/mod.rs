//! Shared test infrastructure for dynag-dns integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;

use dynag_dns::record::{parse_name, parse_record};
use dynag_dns::{CheckResult, DynamicResponder, RecordId, RecordStore, StatusProcessor};

// --- Constants ---

pub const WWW: &str = "www.example.org.";
pub const MAIL: &str = "mail.example.org.";

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and
/// stored as raw wire-format bytes, which can then be parsed with
/// `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Store builder ---

/// Builds a record store and flips record health the way the server does,
/// through a `StatusProcessor`.
pub struct TestStoreBuilder {
    builder: dynag_dns::store::RecordStoreBuilder,
}

impl TestStoreBuilder {
    pub fn new() -> Self {
        Self {
            builder: RecordStore::builder(),
        }
    }

    /// Add a health-checked record in `rr` syntax. Returns its id.
    pub fn add(&mut self, name: &str, rr: &str) -> RecordId {
        self.builder.add_checked(record(name, rr))
    }

    /// Add an always-enabled record in `rr` syntax.
    pub fn add_static(&mut self, name: &str, rr: &str) {
        self.builder.add_static(record(name, rr));
    }

    /// Build the bare store, for tests that drive their own processor.
    pub fn build_store(self) -> RecordStore {
        self.builder.build()
    }

    pub fn build(self) -> TestStore {
        let store = self.builder.build();
        let (_tx, rx) = mpsc::channel(1);
        TestStore {
            processor: StatusProcessor::new(store.clone(), rx),
            store,
        }
    }
}

/// A built store plus the processor that mutates it.
pub struct TestStore {
    pub store: RecordStore,
    processor: StatusProcessor,
}

impl TestStore {
    pub fn up(&self, id: RecordId) {
        self.processor.process(CheckResult { id, success: true });
    }

    pub fn down(&self, id: RecordId) {
        self.processor.process(CheckResult { id, success: false });
    }

    pub fn responder(&self) -> DynamicResponder {
        DynamicResponder::new(self.store.clone())
    }
}

/// Parse a record in `rr` syntax under `name`.
pub fn record(name: &str, rr: &str) -> Record {
    parse_record(parse_name(name).unwrap(), rr).unwrap()
}

// --- Query/Request construction ---

/// Options for a crafted query.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub class: DNSClass,
    pub op_code: OpCode,
    pub dnssec_ok: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            class: DNSClass::IN,
            op_code: OpCode::Query,
            dnssec_ok: false,
        }
    }
}

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    build_query_bytes_with(name, record_type, id, QueryOptions::default())
}

/// Build wire-format bytes for a DNS query with non-default options.
pub fn build_query_bytes_with(
    name: &str,
    record_type: RecordType,
    id: u16,
    options: QueryOptions,
) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(options.op_code);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(options.class);
    msg.add_query(query);
    if options.dnssec_ok {
        let mut edns = Edns::new();
        edns.set_max_payload(4096);
        edns.flags_mut().dnssec_ok = true;
        msg.set_edns(edns);
    }
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Source address used for handler-level queries.
pub fn test_src() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 12345)
}

/// Build a full `Request` from wire bytes.
pub fn build_request(bytes: &[u8]) -> Request {
    Request::new(parse_message_request(bytes), test_src(), Protocol::Udp)
}

// --- Response helpers ---

/// Execute raw query bytes through the responder and return the parsed response.
pub async fn execute_bytes(responder: &DynamicResponder, bytes: &[u8]) -> Message {
    let request = build_request(bytes);
    let handler = TestResponseHandler::new();
    responder.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Execute a query through the responder and return the parsed response.
pub async fn execute_query(
    responder: &DynamicResponder,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    execute_bytes(responder, &build_query_bytes(name, record_type, id)).await
}

/// Send a query over UDP and return the parsed response.
pub async fn query_udp(server: SocketAddr, name: &str, record_type: RecordType, id: u16) -> Message {
    let sock = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind UDP socket");

    sock.send_to(&build_query_bytes(name, record_type, id), server)
        .await
        .expect("failed to send query");

    let mut buf = vec![0u8; 4096];
    let len = tokio::time::timeout(Duration::from_secs(5), sock.recv(&mut buf))
        .await
        .expect("query timed out")
        .expect("failed to recv response");

    Message::from_vec(&buf[..len]).expect("failed to parse DNS response")
}

/// Send a query over TCP (two-byte length framing) and return the parsed response.
pub async fn query_tcp(server: SocketAddr, name: &str, record_type: RecordType, id: u16) -> Message {
    let exchange = async {
        let mut stream = TcpStream::connect(server).await?;
        let bytes = build_query_bytes(name, record_type, id);
        stream.write_all(&(bytes.len() as u16).to_be_bytes()).await?;
        stream.write_all(&bytes).await?;

        let mut len = [0u8; 2];
        stream.read_exact(&mut len).await?;
        let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
        stream.read_exact(&mut buf).await?;
        io::Result::Ok(buf)
    };

    let buf = tokio::time::timeout(Duration::from_secs(5), exchange)
        .await
        .expect("TCP query timed out")
        .expect("TCP query failed");

    Message::from_vec(&buf).expect("failed to parse DNS response")
}

/// Query over UDP until `done` accepts the response or the deadline passes.
pub async fn poll_udp<F>(
    server: SocketAddr,
    name: &str,
    record_type: RecordType,
    deadline: Duration,
    done: F,
) -> Message
where
    F: Fn(&Message) -> bool,
{
    let start = tokio::time::Instant::now();
    let mut id = 1u16;
    loop {
        let msg = query_udp(server, name, record_type, id).await;
        if done(&msg) || start.elapsed() >= deadline {
            return msg;
        }
        id = id.wrapping_add(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Extract answer RDATA as text, in answer order.
pub fn answer_data(msg: &Message) -> Vec<String> {
    msg.answers().iter().map(|r| r.data().to_string()).collect()
}

/// Extract A addresses from a response, in answer order.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert a successful authoritative answer with exactly the expected addresses, in order.
pub fn assert_a_response(msg: &Message, expected: &[Ipv4Addr]) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.authoritative(), "expected AA flag");
    assert_eq!(
        extract_a_ips(msg),
        expected,
        "A records mismatch.\nactual:   {:?}\nexpected: {:?}",
        extract_a_ips(msg),
        expected
    );
}

/// Assert an authoritative response with no answers and the given code.
pub fn assert_empty_response(msg: &Message, expected: ResponseCode) {
    assert_response_code(msg, expected);
    assert!(msg.authoritative(), "expected AA flag");
    assert!(
        msg.answers().is_empty(),
        "expected no answers, got {:?}",
        answer_data(msg)
    );
}

/// Whether the response carries an OPT record with the DO bit.
pub fn response_dnssec_ok(msg: &Message) -> bool {
    msg.extensions()
        .as_ref()
        .map(|edns| edns.flags().dnssec_ok)
        .unwrap_or(false)
}
