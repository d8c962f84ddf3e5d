use super::error::DhtError;
use super::node::{encode_compact_nodes, parse_compact_nodes, parse_compact_peer, Node, NodeId};
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// A KRPC envelope: query, response, or error, tagged by transaction id.
#[derive(Debug, Clone)]
pub enum KrpcMessage {
    Query { tid: Bytes, query: KrpcQuery },
    Response { tid: Bytes, response: KrpcResponse },
    Error { tid: Bytes, code: i64, message: String },
}

#[derive(Debug, Clone)]
pub enum KrpcQuery {
    Ping { id: NodeId },
    FindNode { id: NodeId, target: NodeId },
    GetPeers { id: NodeId, info_hash: [u8; 20] },
}

/// The fields we consume from any response: the responder id, closer
/// nodes, peer values, and the get_peers token.
#[derive(Debug, Clone, Default)]
pub struct KrpcResponse {
    pub id: Option<NodeId>,
    pub nodes: Vec<Node>,
    pub values: Vec<SocketAddr>,
    pub token: Option<Bytes>,
}

impl KrpcMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut dict = BTreeMap::new();
        match self {
            KrpcMessage::Query { tid, query } => {
                let (name, args) = query.to_args();
                dict.insert(Bytes::from_static(b"a"), Value::Dict(args));
                dict.insert(Bytes::from_static(b"q"), Value::text(name));
                dict.insert(Bytes::from_static(b"t"), Value::Bytes(tid.clone()));
                dict.insert(Bytes::from_static(b"y"), Value::text("q"));
            }
            KrpcMessage::Response { tid, response } => {
                let mut body = BTreeMap::new();
                if let Some(id) = &response.id {
                    body.insert(Bytes::from_static(b"id"), Value::blob(id.as_bytes()));
                }
                if !response.nodes.is_empty() {
                    body.insert(
                        Bytes::from_static(b"nodes"),
                        Value::Bytes(Bytes::from(encode_compact_nodes(&response.nodes))),
                    );
                }
                if !response.values.is_empty() {
                    let values = response
                        .values
                        .iter()
                        .filter_map(|addr| match addr {
                            SocketAddr::V4(v4) => {
                                let mut blob = Vec::with_capacity(6);
                                blob.extend_from_slice(&v4.ip().octets());
                                blob.extend_from_slice(&v4.port().to_be_bytes());
                                Some(Value::Bytes(Bytes::from(blob)))
                            }
                            SocketAddr::V6(_) => None,
                        })
                        .collect();
                    body.insert(Bytes::from_static(b"values"), Value::List(values));
                }
                if let Some(token) = &response.token {
                    body.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                }
                dict.insert(Bytes::from_static(b"r"), Value::Dict(body));
                dict.insert(Bytes::from_static(b"t"), Value::Bytes(tid.clone()));
                dict.insert(Bytes::from_static(b"y"), Value::text("r"));
            }
            KrpcMessage::Error { tid, code, message } => {
                let body = vec![Value::Integer(*code), Value::text(message)];
                dict.insert(Bytes::from_static(b"e"), Value::List(body));
                dict.insert(Bytes::from_static(b"t"), Value::Bytes(tid.clone()));
                dict.insert(Bytes::from_static(b"y"), Value::text("e"));
            }
        }
        encode(&Value::Dict(dict))
    }

    pub fn decode(data: &[u8]) -> Result<Self, DhtError> {
        let value = decode(data)?;
        let tid = value
            .get_bytes(b"t")
            .map(Bytes::copy_from_slice)
            .ok_or(DhtError::Protocol("missing transaction id"))?;

        match value.get_str(b"y") {
            Some("q") => {
                let query = KrpcQuery::from_value(&value)?;
                Ok(KrpcMessage::Query { tid, query })
            }
            Some("r") => {
                let body = value
                    .get(b"r")
                    .ok_or(DhtError::Protocol("missing response body"))?;
                Ok(KrpcMessage::Response {
                    tid,
                    response: KrpcResponse::from_value(body),
                })
            }
            Some("e") => {
                let list = value.get_list(b"e").unwrap_or(&[]);
                let code = list.first().and_then(Value::as_integer).unwrap_or(0);
                let message = list
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(KrpcMessage::Error { tid, code, message })
            }
            _ => Err(DhtError::Protocol("unknown message type")),
        }
    }
}

impl KrpcQuery {
    fn to_args(&self) -> (&'static str, BTreeMap<Bytes, Value>) {
        let mut args = BTreeMap::new();
        match self {
            KrpcQuery::Ping { id } => {
                args.insert(Bytes::from_static(b"id"), Value::blob(id.as_bytes()));
                ("ping", args)
            }
            KrpcQuery::FindNode { id, target } => {
                args.insert(Bytes::from_static(b"id"), Value::blob(id.as_bytes()));
                args.insert(Bytes::from_static(b"target"), Value::blob(target.as_bytes()));
                ("find_node", args)
            }
            KrpcQuery::GetPeers { id, info_hash } => {
                args.insert(Bytes::from_static(b"id"), Value::blob(id.as_bytes()));
                args.insert(Bytes::from_static(b"info_hash"), Value::blob(info_hash));
                ("get_peers", args)
            }
        }
    }

    fn from_value(value: &Value) -> Result<Self, DhtError> {
        let args = value
            .get(b"a")
            .ok_or(DhtError::Protocol("missing query args"))?;
        let id = args
            .get_bytes(b"id")
            .and_then(NodeId::from_slice)
            .ok_or(DhtError::Protocol("missing node id"))?;

        match value.get_str(b"q") {
            Some("ping") => Ok(KrpcQuery::Ping { id }),
            Some("find_node") => {
                let target = args
                    .get_bytes(b"target")
                    .and_then(NodeId::from_slice)
                    .ok_or(DhtError::Protocol("missing target"))?;
                Ok(KrpcQuery::FindNode { id, target })
            }
            Some("get_peers") => {
                let info_hash = args
                    .get_bytes(b"info_hash")
                    .filter(|b| b.len() == 20)
                    .map(|b| {
                        let mut arr = [0u8; 20];
                        arr.copy_from_slice(b);
                        arr
                    })
                    .ok_or(DhtError::Protocol("missing info_hash"))?;
                Ok(KrpcQuery::GetPeers { id, info_hash })
            }
            _ => Err(DhtError::Protocol("unsupported query")),
        }
    }
}

impl KrpcResponse {
    fn from_value(body: &Value) -> Self {
        let id = body.get_bytes(b"id").and_then(NodeId::from_slice);

        let nodes = body
            .get_bytes(b"nodes")
            .map(parse_compact_nodes)
            .unwrap_or_default();

        let values = body
            .get_list(b"values")
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_bytes)
                    .filter_map(parse_compact_peer)
                    .collect()
            })
            .unwrap_or_default();

        let token = body.get_bytes(b"token").map(Bytes::copy_from_slice);

        Self {
            id,
            nodes,
            values,
            token,
        }
    }
}
