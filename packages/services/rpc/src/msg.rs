use remrpc_identity::CorrelationId;
use rmpv::Value;

use crate::error::{DecodeError, ErrorCode};

pub const TAG_CALL: &str = "call";
pub const TAG_REPLY: &str = "reply";
pub const TAG_ERROR: &str = "error";

pub const DEFAULT_ERROR_DETAIL: &str = "Protocol error";

/// Wire message exchanged over channels, encoded as a MessagePack array:
///
/// ```text
/// ["call",  serial, reply_channel | nil, function, args, kwargs]
/// ["reply", serial, result | nil]
/// ["error", serial, [code, detail]]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Call {
        serial: CorrelationId,
        /// `None` means the caller does not want any answer.
        reply_channel: Option<String>,
        function: String,
        args: Vec<Value>,
        kwargs: Vec<(Value, Value)>,
    },
    Reply {
        serial: CorrelationId,
        result: Value,
    },
    Error {
        serial: CorrelationId,
        code: ErrorCode,
        detail: String,
    },
}

impl Envelope {
    pub fn serial(&self) -> CorrelationId {
        match self {
            Envelope::Call { serial, .. } => *serial,
            Envelope::Reply { serial, .. } => *serial,
            Envelope::Error { serial, .. } => *serial,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Envelope::Call { .. } => TAG_CALL,
            Envelope::Reply { .. } => TAG_REPLY,
            Envelope::Error { .. } => TAG_ERROR,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut items = vec![Value::from(self.tag()), Value::from(self.serial().to_string())];
        match self {
            Envelope::Call {
                reply_channel,
                function,
                args,
                kwargs,
                ..
            } => {
                items.push(reply_channel.as_deref().map(Value::from).unwrap_or(Value::Nil));
                items.push(Value::from(function.as_str()));
                items.push(Value::Array(args.clone()));
                items.push(Value::Map(kwargs.clone()));
            }
            Envelope::Reply { result, .. } => {
                items.push(result.clone());
            }
            Envelope::Error { code, detail, .. } => {
                items.push(Value::Array(vec![Value::from(code.as_i64()), Value::from(detail.as_str())]));
            }
        }
        Value::Array(items)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &self.to_value()).expect("Should encode into memory buffer");
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, DecodeError> {
        let value = rmpv::decode::read_value(&mut buf).map_err(|e| DecodeError::Unpack(e.to_string()))?;
        Self::from_value(value)
    }

    /// Positional extraction, trailing fields may be omitted and fall back to defaults.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let items = match value {
            Value::Array(items) => items,
            _ => return Err(DecodeError::NotArray),
        };
        let mut items = items.into_iter();

        let tag = match items.next() {
            Some(Value::String(tag)) => tag.into_str().ok_or(DecodeError::InvalidField("tag"))?,
            Some(_) => return Err(DecodeError::InvalidField("tag")),
            None => return Err(DecodeError::MissingField("tag")),
        };
        if !matches!(tag.as_str(), TAG_CALL | TAG_REPLY | TAG_ERROR) {
            return Err(DecodeError::UnknownTag(tag));
        }

        let serial = match items.next() {
            Some(Value::String(serial)) => serial.as_str().and_then(|s| s.parse::<CorrelationId>().ok()).ok_or(DecodeError::InvalidField("serial"))?,
            Some(_) => return Err(DecodeError::InvalidField("serial")),
            None => return Err(DecodeError::MissingField("serial")),
        };

        match tag.as_str() {
            TAG_CALL => {
                let reply_channel = match items.next() {
                    None | Some(Value::Nil) => None,
                    Some(Value::String(channel)) => Some(channel.into_str().ok_or(DecodeError::InvalidField("reply_channel"))?),
                    Some(_) => return Err(DecodeError::InvalidField("reply_channel")),
                };
                // anything but a name resolves as unregistered
                let function = match items.next() {
                    Some(Value::String(function)) => function.into_str().unwrap_or_default(),
                    _ => String::new(),
                };
                let args = match items.next() {
                    None | Some(Value::Nil) => vec![],
                    Some(Value::Array(args)) => args,
                    Some(_) => return Err(DecodeError::InvalidField("args")),
                };
                let kwargs = match items.next() {
                    None | Some(Value::Nil) => vec![],
                    Some(Value::Map(kwargs)) => kwargs,
                    Some(_) => return Err(DecodeError::InvalidField("kwargs")),
                };
                Ok(Envelope::Call {
                    serial,
                    reply_channel,
                    function,
                    args,
                    kwargs,
                })
            }
            TAG_REPLY => Ok(Envelope::Reply {
                serial,
                result: items.next().unwrap_or(Value::Nil),
            }),
            _ => {
                let malformed = |field| DecodeError::MalformedAnswer { serial, field };
                let (code, detail) = match items.next() {
                    None | Some(Value::Nil) => (ErrorCode::Protocol, DEFAULT_ERROR_DETAIL.to_string()),
                    Some(Value::Array(pair)) => match pair.as_slice() {
                        [code, detail] => {
                            let code = code.as_i64().ok_or_else(|| malformed("code"))?;
                            let detail = detail.as_str().ok_or_else(|| malformed("detail"))?;
                            (ErrorCode::from(code), detail.to_string())
                        }
                        _ => return Err(malformed("error")),
                    },
                    Some(_) => return Err(malformed("error")),
                };
                Ok(Envelope::Error { serial, code, detail })
            }
        }
    }
}
