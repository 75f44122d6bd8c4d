//! CoAP resource service over UDP
//!
//! Implements the RFC 7252 message layer needed to serve a subtree:
//! GET and PUT on Uri-Path, piggy-backed ACKs for confirmable requests,
//! and Reset replies to empty confirmable pings. No block-wise transfer,
//! observe, or retransmission.

use arbor_core::link_format::CT_JSON;
use arbor_core::NodeId;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::ServiceError;
use crate::net;
use crate::resource::{self, Representation, WriteError};
use crate::SharedTree;

/// Protocol version carried in every header
pub const VERSION: u8 = 1;

pub const OPTION_URI_PATH: u16 = 11;
pub const OPTION_CONTENT_FORMAT: u16 = 12;
pub const OPTION_SIZE1: u16 = 60;

/// Content-format id for `application/link-format`
pub const CT_LINK_FORMAT: u16 = 40;

/// Largest request accepted; longer datagrams get 4.13
pub const MAX_DATAGRAM: usize = 1152;
const PAYLOAD_MARKER: u8 = 0xFF;

/// Message codes as `class << 5 | detail`
pub mod code {
    pub const EMPTY: u8 = 0x00;
    pub const GET: u8 = 0x01;
    pub const POST: u8 = 0x02;
    pub const PUT: u8 = 0x03;
    pub const DELETE: u8 = 0x04;
    pub const CHANGED: u8 = 0x44;
    pub const CONTENT: u8 = 0x45;
    pub const BAD_REQUEST: u8 = 0x80;
    pub const NOT_FOUND: u8 = 0x84;
    pub const METHOD_NOT_ALLOWED: u8 = 0x85;
    pub const REQUEST_ENTITY_TOO_LARGE: u8 = 0x8D;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoapError {
    #[error("Message truncated at {0} bytes")]
    Truncated(usize),
    #[error("Unsupported CoAP version {0}")]
    Version(u8),
    #[error("Invalid token length {0}")]
    TokenLength(u8),
    #[error("Invalid option encoding")]
    BadOption,
    #[error("Payload marker without payload")]
    EmptyPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn bits(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// A single CoAP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub code: u8,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Options as (number, value), in ascending number order once encoded
    pub options: Vec<(u16, Vec<u8>)>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageType, code: u8, message_id: u16, token: Vec<u8>) -> Self {
        Self {
            kind,
            code,
            message_id,
            token,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Empty Reset for `message_id`
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, code::EMPTY, message_id, Vec::new())
    }

    pub fn add_option(&mut self, number: u16, value: Vec<u8>) {
        self.options.push((number, value));
    }

    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> {
        self.options
            .iter()
            .filter(move |(n, _)| *n == number)
            .map(|(_, v)| v.as_slice())
    }

    /// Uri-Path options joined into `/a/b`
    pub fn uri_path(&self) -> String {
        let segments: Vec<String> = self
            .option_values(OPTION_URI_PATH)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect();
        format!("/{}", segments.join("/"))
    }

    /// Content-Format option, if present
    pub fn content_format(&self) -> Option<u16> {
        self.option_values(OPTION_CONTENT_FORMAT)
            .next()
            .map(|v| v.iter().fold(0u16, |acc, b| (acc << 8) | *b as u16))
    }

    /// Decode a datagram
    pub fn decode(data: &[u8]) -> Result<Self, CoapError> {
        let (mut message, mut pos) = Self::decode_head(data)?;

        let mut number: u16 = 0;
        while pos < data.len() {
            let byte = data[pos];
            pos += 1;
            if byte == PAYLOAD_MARKER {
                if pos == data.len() {
                    return Err(CoapError::EmptyPayload);
                }
                message.payload = data[pos..].to_vec();
                break;
            }

            let delta = read_extended(byte >> 4, data, &mut pos)?;
            let length = read_extended(byte & 0x0f, data, &mut pos)? as usize;
            number = number.checked_add(delta).ok_or(CoapError::BadOption)?;

            let end = pos + length;
            if end > data.len() {
                return Err(CoapError::Truncated(data.len()));
            }
            message.options.push((number, data[pos..end].to_vec()));
            pos = end;
        }

        Ok(message)
    }

    /// Decode the fixed header and token; returns the offset of the options
    fn decode_head(data: &[u8]) -> Result<(Self, usize), CoapError> {
        if data.len() < 4 {
            return Err(CoapError::Truncated(data.len()));
        }
        // Byte 0: Ver(2) | Type(2) | TKL(4)
        let version = data[0] >> 6;
        if version != VERSION {
            return Err(CoapError::Version(version));
        }
        let kind = MessageType::from_bits(data[0] >> 4);
        let tkl = data[0] & 0x0f;
        if tkl > 8 {
            return Err(CoapError::TokenLength(tkl));
        }
        let code = data[1];
        let message_id = u16::from_be_bytes([data[2], data[3]]);

        let pos = 4;
        let token_end = pos + tkl as usize;
        if token_end > data.len() {
            return Err(CoapError::Truncated(data.len()));
        }
        let token = data[pos..token_end].to_vec();

        Ok((Self::new(kind, code, message_id, token), token_end))
    }

    /// Encode into a datagram
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        out.push((VERSION << 6) | (self.kind.bits() << 4) | (self.token.len() as u8 & 0x0f));
        out.push(self.code);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut options: Vec<&(u16, Vec<u8>)> = self.options.iter().collect();
        options.sort_by_key(|(n, _)| *n);

        let mut previous = 0;
        for (number, value) in options {
            let (delta, delta_ext) = split_extended(number - previous);
            let (length, length_ext) = split_extended(value.len() as u16);
            out.push((delta << 4) | length);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&length_ext);
            out.extend_from_slice(value);
            previous = *number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        out
    }
}

/// Read an option delta/length nibble plus its extended bytes
fn read_extended(nibble: u8, data: &[u8], pos: &mut usize) -> Result<u16, CoapError> {
    match nibble {
        0..=12 => Ok(nibble as u16),
        13 => {
            let byte = *data.get(*pos).ok_or(CoapError::Truncated(data.len()))?;
            *pos += 1;
            Ok(byte as u16 + 13)
        }
        14 => {
            if *pos + 2 > data.len() {
                return Err(CoapError::Truncated(data.len()));
            }
            let value = u16::from_be_bytes([data[*pos], data[*pos + 1]]);
            *pos += 2;
            value.checked_add(269).ok_or(CoapError::BadOption)
        }
        _ => Err(CoapError::BadOption),
    }
}

fn split_extended(value: u16) -> (u8, Vec<u8>) {
    if value < 13 {
        (value as u8, Vec::new())
    } else if value < 269 {
        (13, vec![(value - 13) as u8])
    } else {
        (14, (value - 269).to_be_bytes().to_vec())
    }
}

/// Minimal big-endian encoding of an unsigned option value
fn uint_option(value: u16) -> Vec<u8> {
    match value {
        0 => Vec::new(),
        1..=0xff => vec![value as u8],
        _ => value.to_be_bytes().to_vec(),
    }
}

/// Running CoAP service bound to a subtree
pub struct CoapService {
    base_address: String,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl CoapService {
    /// Bind `host:port` and start serving the subtree rooted at `root`
    pub async fn start(
        tree: SharedTree,
        root: NodeId,
        host: &str,
        port: u16,
    ) -> Result<Self, ServiceError> {
        let socket = UdpSocket::bind((host, port))
            .await
            .map_err(|source| ServiceError::Bind {
                scheme: "coap",
                addr: format!("{}:{}", host, port),
                source,
            })?;
        let local_addr = socket.local_addr()?;
        let task = tokio::spawn(serve(socket, tree, root));

        info!(address = %local_addr, protocol = "CoAP", "Started resource service");
        Ok(Self {
            base_address: net::base_address("coap", local_addr),
            local_addr,
            task,
        })
    }

    /// `coap://host:port/` as reachable by clients
    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn serve(socket: UdpSocket, tree: SharedTree, root: NodeId) {
    // One spare byte so oversized datagrams are detected rather than cut
    let mut buf = vec![0u8; MAX_DATAGRAM + 1];
    let mut next_id: u16 = 0x4000;

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "CoAP receive failed");
                continue;
            }
        };

        let Some(mut response) = respond(&tree, root, &buf[..len]).await else {
            continue;
        };
        if response.kind == MessageType::NonConfirmable {
            response.message_id = next_id;
            next_id = next_id.wrapping_add(1);
        }

        debug!(
            peer = %peer,
            code = format_args!("{}.{:02}", response.code >> 5, response.code & 0x1f),
            "CoAP request handled"
        );
        if let Err(e) = socket.send_to(&response.encode(), peer).await {
            warn!(peer = %peer, error = %e, "CoAP send failed");
        }
    }
}

/// Decode a received datagram and produce its response
///
/// Datagrams over [`MAX_DATAGRAM`] get 4.13 without being processed.
/// Malformed ones are dropped.
pub async fn respond(tree: &SharedTree, root: NodeId, datagram: &[u8]) -> Option<Message> {
    if datagram.len() > MAX_DATAGRAM {
        return entity_too_large(datagram);
    }
    match Message::decode(datagram) {
        Ok(request) => {
            trace!(path = %request.uri_path(), "CoAP request");
            handle(tree, root, &request).await
        }
        Err(e) => {
            trace!(error = %e, "Dropping malformed CoAP datagram");
            None
        }
    }
}

/// 4.13 reply, carrying Size1, for a request that was too large to process
fn entity_too_large(datagram: &[u8]) -> Option<Message> {
    let (request, _) = Message::decode_head(datagram).ok()?;
    let kind = match request.kind {
        MessageType::Confirmable => MessageType::Acknowledgement,
        MessageType::NonConfirmable => MessageType::NonConfirmable,
        _ => return None,
    };
    let mut response = Message::new(
        kind,
        code::REQUEST_ENTITY_TOO_LARGE,
        request.message_id,
        request.token,
    );
    response.add_option(OPTION_SIZE1, uint_option(MAX_DATAGRAM as u16));
    Some(response)
}

/// Produce the response for a request, or `None` when nothing is sent back
pub async fn handle(tree: &SharedTree, root: NodeId, request: &Message) -> Option<Message> {
    let reply_kind = match request.kind {
        MessageType::Confirmable => MessageType::Acknowledgement,
        MessageType::NonConfirmable => MessageType::NonConfirmable,
        _ => return None,
    };

    if request.code == code::EMPTY {
        // CoAP ping
        return (request.kind == MessageType::Confirmable)
            .then(|| Message::reset(request.message_id));
    }
    if request.code >> 5 != 0 {
        return None;
    }

    let path = request.uri_path();
    let mut response = Message::new(
        reply_kind,
        code::CONTENT,
        request.message_id,
        request.token.clone(),
    );

    match request.code {
        code::GET => {
            let tree = tree.read().await;
            let body = match resource::represent(&tree, root, &path) {
                Ok(Representation::Links(doc)) => Some((CT_LINK_FORMAT, doc.into_bytes())),
                Ok(Representation::Description(graph)) => {
                    serde_json::to_vec(&graph).ok().map(|b| (CT_JSON, b))
                }
                Ok(Representation::Node(view)) => {
                    serde_json::to_vec(&view.value).ok().map(|b| (CT_JSON, b))
                }
                Err(_) => None,
            };
            match body {
                Some((format, payload)) => {
                    response.add_option(OPTION_CONTENT_FORMAT, uint_option(format));
                    response.payload = payload;
                }
                None => response.code = code::NOT_FOUND,
            }
        }
        code::PUT => match serde_json::from_slice(&request.payload) {
            Ok(value) => {
                let mut tree = tree.write().await;
                response.code = match resource::update(&mut tree, root, &path, value) {
                    Ok(()) => code::CHANGED,
                    Err(WriteError::NotFound(_)) => code::NOT_FOUND,
                    Err(WriteError::ReadOnly(_)) => code::METHOD_NOT_ALLOWED,
                };
            }
            Err(_) => response.code = code::BAD_REQUEST,
        },
        _ => response.code = code::METHOD_NOT_ALLOWED,
    }

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{build_objects, ResourceClass, ResourceDescriptor, Specification};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    fn shared_tree() -> SharedTree {
        let mut spec = Specification::default();
        for (path, descriptor) in [
            ("/", ResourceDescriptor::new("/", ResourceClass::SmartObject)),
            ("/11101", ResourceDescriptor::new("11101", ResourceClass::SmartObject)),
            (
                "/11101/5001",
                ResourceDescriptor::new("5001", ResourceClass::ObservableProperty)
                    .with_field("dataType", json!("string")),
            ),
        ] {
            spec.objects.insert(path.to_string(), descriptor);
        }
        Arc::new(RwLock::new(build_objects(&spec).unwrap()))
    }

    fn request(kind: MessageType, code: u8, path: &str) -> Message {
        let mut message = Message::new(kind, code, 0x1234, vec![0xab, 0xcd]);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            message.add_option(OPTION_URI_PATH, segment.as_bytes().to_vec());
        }
        message
    }

    #[test]
    fn test_header_encoding() {
        let message = Message::new(MessageType::Confirmable, code::GET, 0x1234, vec![0xab]);
        let bytes = message.encode();
        // ver=1, type=CON, tkl=1: 0b01_00_0001
        assert_eq!(bytes, vec![0x41, 0x01, 0x12, 0x34, 0xab]);
    }

    #[test]
    fn test_option_delta_encoding() {
        let mut message = request(MessageType::NonConfirmable, code::GET, "/11101/5001");
        message.add_option(OPTION_CONTENT_FORMAT, uint_option(CT_JSON));
        let bytes = message.encode();

        // First Uri-Path: delta 11, length 5
        assert_eq!(bytes[6], 0xb5);
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.uri_path(), "/11101/5001");
        assert_eq!(decoded.content_format(), Some(CT_JSON));
        assert_eq!(decoded.token, vec![0xab, 0xcd]);
    }

    #[test]
    fn test_extended_option_length() {
        let mut message = Message::new(MessageType::Confirmable, code::PUT, 1, Vec::new());
        message.add_option(OPTION_URI_PATH, vec![b'x'; 300]);
        message.payload = b"\"value\"".to_vec();
        let decoded = Message::decode(&message.encode()).unwrap();
        assert_eq!(decoded.options[0].1.len(), 300);
        assert_eq!(decoded.payload, b"\"value\"".to_vec());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(Message::decode(&[0x40, 0x01]), Err(CoapError::Truncated(2)));
        assert_eq!(Message::decode(&[0x81, 0x01, 0, 0]), Err(CoapError::Version(2)));
        assert_eq!(Message::decode(&[0x49, 0x01, 0, 0]), Err(CoapError::TokenLength(9)));
        assert_eq!(Message::decode(&[0x40, 0x01, 0, 0, 0xff]), Err(CoapError::EmptyPayload));
        assert_eq!(Message::decode(&[0x40, 0x01, 0, 0, 0xf1, 0x00]), Err(CoapError::BadOption));
    }

    #[tokio::test]
    async fn test_handle_get() {
        let tree = shared_tree();
        let root = tree.read().await.root();
        let get = request(MessageType::Confirmable, code::GET, "/11101/5001");
        let response = handle(&tree, root, &get).await.unwrap();

        assert_eq!(response.kind, MessageType::Acknowledgement);
        assert_eq!(response.message_id, 0x1234);
        assert_eq!(response.token, vec![0xab, 0xcd]);
        assert_eq!(response.code, code::CONTENT);
        assert_eq!(response.content_format(), Some(CT_JSON));
        let value: Value = serde_json::from_slice(&response.payload).unwrap();
        assert_eq!(value, json!({"dataType": "string"}));
    }

    #[tokio::test]
    async fn test_handle_discovery_and_errors() {
        let tree = shared_tree();
        let root = tree.read().await.root();

        let discover = request(MessageType::NonConfirmable, code::GET, "/.well-known/core");
        let response = handle(&tree, root, &discover).await.unwrap();
        assert_eq!(response.kind, MessageType::NonConfirmable);
        assert_eq!(response.content_format(), Some(CT_LINK_FORMAT));
        assert!(String::from_utf8(response.payload).unwrap().contains("</11101/5001>"));

        let response = handle(&tree, root, &request(MessageType::Confirmable, code::GET, "/nope"))
            .await
            .unwrap();
        assert_eq!(response.code, code::NOT_FOUND);

        let delete = request(MessageType::Confirmable, code::DELETE, "/11101");
        let response = handle(&tree, root, &delete).await.unwrap();
        assert_eq!(response.code, code::METHOD_NOT_ALLOWED);

        let ping = Message::new(MessageType::Confirmable, code::EMPTY, 7, Vec::new());
        assert_eq!(handle(&tree, root, &ping).await, Some(Message::reset(7)));

        let ack = Message::new(MessageType::Acknowledgement, code::CONTENT, 7, Vec::new());
        assert_eq!(handle(&tree, root, &ack).await, None);
    }

    #[tokio::test]
    async fn test_handle_put() {
        let tree = shared_tree();
        let root = tree.read().await.root();

        let mut put = request(MessageType::Confirmable, code::PUT, "/11101/5001");
        put.payload = b"\"arpeggio\"".to_vec();
        assert_eq!(handle(&tree, root, &put).await.unwrap().code, code::CHANGED);

        put.payload = b"not json".to_vec();
        assert_eq!(handle(&tree, root, &put).await.unwrap().code, code::BAD_REQUEST);

        let guard = tree.read().await;
        let id = arbor_core::resolve(&guard, "/11101/5001", guard.root()).unwrap();
        assert_eq!(guard.node(id).value(), Some(&json!("arpeggio")));
    }

    #[tokio::test]
    async fn test_oversized_request_is_rejected() {
        let tree = shared_tree();
        let root = tree.read().await.root();

        let mut put = request(MessageType::Confirmable, code::PUT, "/11101/5001");
        put.payload = format!("\"{}\"", "x".repeat(MAX_DATAGRAM)).into_bytes();
        let datagram = put.encode();
        assert!(datagram.len() > MAX_DATAGRAM);

        let response = respond(&tree, root, &datagram).await.unwrap();
        assert_eq!(response.kind, MessageType::Acknowledgement);
        assert_eq!(response.code, code::REQUEST_ENTITY_TOO_LARGE);
        assert_eq!(response.message_id, 0x1234);
        assert_eq!(response.token, vec![0xab, 0xcd]);
        let size1: Vec<&[u8]> = response.option_values(OPTION_SIZE1).collect();
        assert_eq!(size1, vec![&[0x04u8, 0x80][..]]);

        // The value is left untouched
        let guard = tree.read().await;
        let id = arbor_core::resolve(&guard, "/11101/5001", guard.root()).unwrap();
        assert_eq!(guard.node(id).value(), Some(&json!({"dataType": "string"})));
    }

    #[tokio::test]
    async fn test_respond_decodes_and_drops_malformed() {
        let tree = shared_tree();
        let root = tree.read().await.root();

        let get = request(MessageType::Confirmable, code::GET, "/11101/5001");
        let response = respond(&tree, root, &get.encode()).await.unwrap();
        assert_eq!(response.code, code::CONTENT);

        assert_eq!(respond(&tree, root, &[0x40, 0x01]).await, None);
    }

    #[tokio::test]
    async fn test_oversized_request_over_udp() {
        let tree = shared_tree();
        let root = tree.read().await.root();
        let service = CoapService::start(tree, root, "127.0.0.1", 0).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut put = request(MessageType::Confirmable, code::PUT, "/11101/5001");
        put.payload = vec![b'1'; 2 * MAX_DATAGRAM];
        client.send_to(&put.encode(), service.local_addr()).await.unwrap();

        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let response = Message::decode(&buf[..len]).unwrap();
        assert_eq!(response.code, code::REQUEST_ENTITY_TOO_LARGE);

        service.shutdown();
    }

    #[tokio::test]
    async fn test_service_round_trip_over_udp() {
        let tree = shared_tree();
        let root = tree.read().await.root();
        let service = CoapService::start(tree, root, "127.0.0.1", 0).await.unwrap();
        assert_eq!(
            service.base_address(),
            format!("coap://127.0.0.1:{}/", service.local_addr().port())
        );

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let get = request(MessageType::Confirmable, code::GET, "/11101/5001");
        client.send_to(&get.encode(), service.local_addr()).await.unwrap();

        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let response = Message::decode(&buf[..len]).unwrap();
        assert_eq!(response.code, code::CONTENT);
        assert_eq!(response.message_id, 0x1234);

        service.shutdown();
    }
}
