// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Positional serializer for [`RemoteValue`] graphs.
//!
//! Every node carries its depth-first pre-order position `i`; a value is
//! emitted at most once per message and later occurrences become
//! back-reference nodes holding only the first occurrence's position. That
//! is what lets cyclic graphs and shared subtrees cross the bridge as plain
//! JSON.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::value::{RemoteError, RemoteValue};

/// One node of the serialized tree. At most one discriminator is present;
/// a node with none is a back-reference to position `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedValue {
    pub i: u32,
    /// Finite number, boolean, string, or null. `null` is a meaningful
    /// payload here, so deserialization must not fold it into "absent".
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_present"
    )]
    pub n: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<Sentinel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<RegexRepr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<Box<ErrorRepr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Vec<SerializedValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<Vec<PropertyRepr>>,
}

/// Deserialize a field that distinguishes explicit `null` from absence.
/// The `default` attribute covers absence; this helper keeps `null`.
fn de_present<'de, D>(d: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(d).map(Some)
}

/// The non-JSON numerics and `undefined`. Symbols also land on
/// [`Sentinel::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentinel {
    #[serde(rename = "undefined")]
    Undefined,
    #[serde(rename = "NaN")]
    NaN,
    #[serde(rename = "Infinity")]
    Infinity,
    #[serde(rename = "-Infinity")]
    NegInfinity,
    #[serde(rename = "-0")]
    NegZero,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRepr {
    pub p: String,
    pub f: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRepr {
    pub n: String,
    pub m: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<Box<SerializedValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRepr {
    pub k: String,
    pub v: SerializedValue,
}

impl SerializedValue {
    fn empty(i: u32) -> Self {
        Self {
            i,
            n: None,
            v: None,
            b: None,
            u: None,
            d: None,
            r: None,
            h: None,
            e: None,
            a: None,
            o: None,
        }
    }

    fn backref(target: u32) -> Self {
        Self::empty(target)
    }

    /// True when no discriminator is present, i.e. this node refers back to
    /// the value first emitted at position `i`.
    pub fn is_backref(&self) -> bool {
        self.n.is_none()
            && self.v.is_none()
            && self.b.is_none()
            && self.u.is_none()
            && self.d.is_none()
            && self.r.is_none()
            && self.h.is_none()
            && self.e.is_none()
            && self.a.is_none()
            && self.o.is_none()
    }
}

#[derive(Debug)]
pub enum SerializeError {
    /// The value (or its mandatory fallback) has no wire representation.
    Unencodable { kind: &'static str },
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unencodable { kind } => write!(f, "Unexpected value: {kind}"),
        }
    }
}

impl std::error::Error for SerializeError {}

#[derive(Debug)]
pub enum ParseError {
    /// Back-reference to a position that has not been emitted yet.
    BadBackref { index: u32 },
    /// The `n` discriminator held something other than a scalar.
    BadScalar { index: u32 },
    BadDate { index: u32, text: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBackref { index } => {
                write!(f, "back-reference to unvisited node {index}")
            }
            Self::BadScalar { index } => {
                write!(f, "non-scalar payload in `n` at node {index}")
            }
            Self::BadDate { index, text } => {
                write!(f, "unparsable timestamp {text:?} at node {index}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Serialize a value. Fails on unencodable values.
pub fn serialize(value: &RemoteValue) -> Result<SerializedValue, SerializeError> {
    let mut visited = Vec::new();
    encode(value, &mut visited, None)
}

/// Serialize a value, substituting `fallback` for any unencodable value
/// encountered. The fallback must itself be encodable.
pub fn serialize_with_fallback(
    value: &RemoteValue,
    fallback: &RemoteValue,
) -> Result<SerializedValue, SerializeError> {
    let mut visited = Vec::new();
    encode(value, &mut visited, Some(fallback))
}

fn encode(
    value: &RemoteValue,
    visited: &mut Vec<RemoteValue>,
    fallback: Option<&RemoteValue>,
) -> Result<SerializedValue, SerializeError> {
    if let Some(at) = visited.iter().position(|seen| seen.same_value(value)) {
        return Ok(SerializedValue::backref(at as u32));
    }
    if let RemoteValue::Function(_) = value {
        // The substitute is encoded through the normal path, but without a
        // further fallback so a function fallback still fails.
        return match fallback {
            Some(substitute) => encode(substitute, visited, None),
            None => Err(SerializeError::Unencodable { kind: "function" }),
        };
    }

    let index = visited.len() as u32;
    visited.push(value.clone());
    let mut node = SerializedValue::empty(index);

    match value {
        RemoteValue::Undefined | RemoteValue::Symbol(_) => {
            node.v = Some(Sentinel::Undefined);
        }
        RemoteValue::Null => node.n = Some(serde_json::Value::Null),
        RemoteValue::Bool(b) => node.n = Some(serde_json::Value::Bool(*b)),
        RemoteValue::Number(x) => {
            if x.is_nan() {
                node.v = Some(Sentinel::NaN);
            } else if *x == f64::INFINITY {
                node.v = Some(Sentinel::Infinity);
            } else if *x == f64::NEG_INFINITY {
                node.v = Some(Sentinel::NegInfinity);
            } else if *x == 0.0 && x.is_sign_negative() {
                node.v = Some(Sentinel::NegZero);
            } else {
                node.n = serde_json::Number::from_f64(*x).map(serde_json::Value::Number);
            }
        }
        RemoteValue::String(s) => node.n = Some(serde_json::Value::String(s.clone())),
        RemoteValue::BigInt(digits) => node.b = Some(digits.clone()),
        RemoteValue::Url(url) => node.u = Some(url.clone()),
        RemoteValue::Date(at) => {
            node.d = Some(at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        RemoteValue::Regex { source, flags } => {
            node.r = Some(RegexRepr {
                p: source.clone(),
                f: flags.clone(),
            });
        }
        RemoteValue::Handle(id) => node.h = Some(*id),
        RemoteValue::Error(cell) => {
            let err = cell.lock().clone();
            // The cause is recursed even when undefined so the sentinel is
            // present on the wire.
            let cause = encode(&err.cause, visited, fallback)?;
            node.e = Some(Box::new(ErrorRepr {
                n: err.name,
                m: err.message,
                c: Some(Box::new(cause)),
                s: err.stack,
            }));
        }
        RemoteValue::Array(cell) => {
            let items = cell.lock().clone();
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(encode(item, visited, fallback)?);
            }
            node.a = Some(out);
        }
        RemoteValue::Object(cell) => {
            let props = cell.lock().clone();
            let mut out = Vec::with_capacity(props.len());
            for (key, val) in &props {
                out.push(PropertyRepr {
                    k: key.clone(),
                    v: encode(val, visited, fallback)?,
                });
            }
            node.o = Some(out);
        }
        RemoteValue::Function(_) => {
            return Err(SerializeError::Unencodable { kind: "function" });
        }
    }
    Ok(node)
}

/// Reconstruct a value graph from a serialized tree. Containers are created
/// empty and registered before their children are decoded, so cycles close
/// on the same shared cell.
pub fn parse(node: &SerializedValue) -> Result<RemoteValue, ParseError> {
    let mut refs = HashMap::new();
    decode(node, &mut refs)
}

fn decode(
    node: &SerializedValue,
    refs: &mut HashMap<u32, RemoteValue>,
) -> Result<RemoteValue, ParseError> {
    if node.is_backref() {
        return refs
            .get(&node.i)
            .cloned()
            .ok_or(ParseError::BadBackref { index: node.i });
    }

    if let Some(scalar) = &node.n {
        let value = match scalar {
            serde_json::Value::Null => RemoteValue::Null,
            serde_json::Value::Bool(b) => RemoteValue::Bool(*b),
            serde_json::Value::Number(num) => match num.as_f64() {
                Some(x) => RemoteValue::Number(x),
                None => return Err(ParseError::BadScalar { index: node.i }),
            },
            serde_json::Value::String(s) => RemoteValue::String(s.clone()),
            _ => return Err(ParseError::BadScalar { index: node.i }),
        };
        refs.insert(node.i, value.clone());
        return Ok(value);
    }
    if let Some(sentinel) = node.v {
        let value = match sentinel {
            Sentinel::Undefined => RemoteValue::Undefined,
            Sentinel::NaN => RemoteValue::Number(f64::NAN),
            Sentinel::Infinity => RemoteValue::Number(f64::INFINITY),
            Sentinel::NegInfinity => RemoteValue::Number(f64::NEG_INFINITY),
            Sentinel::NegZero => RemoteValue::Number(-0.0),
        };
        refs.insert(node.i, value.clone());
        return Ok(value);
    }
    if let Some(digits) = &node.b {
        let value = RemoteValue::BigInt(digits.clone());
        refs.insert(node.i, value.clone());
        return Ok(value);
    }
    if let Some(url) = &node.u {
        let value = RemoteValue::Url(url.clone());
        refs.insert(node.i, value.clone());
        return Ok(value);
    }
    if let Some(text) = &node.d {
        let at = DateTime::parse_from_rfc3339(text).map_err(|_| ParseError::BadDate {
            index: node.i,
            text: text.clone(),
        })?;
        let value = RemoteValue::Date(at.with_timezone(&Utc));
        refs.insert(node.i, value.clone());
        return Ok(value);
    }
    if let Some(re) = &node.r {
        let value = RemoteValue::Regex {
            source: re.p.clone(),
            flags: re.f.clone(),
        };
        refs.insert(node.i, value.clone());
        return Ok(value);
    }
    if let Some(id) = node.h {
        let value = RemoteValue::Handle(id);
        refs.insert(node.i, value.clone());
        return Ok(value);
    }
    if let Some(err) = &node.e {
        let cell = Arc::new(Mutex::new(RemoteError {
            name: err.n.clone(),
            message: err.m.clone(),
            stack: err.s.clone(),
            cause: RemoteValue::Undefined,
        }));
        refs.insert(node.i, RemoteValue::Error(Arc::clone(&cell)));
        if let Some(cause) = &err.c {
            let cause = decode(cause, refs)?;
            cell.lock().cause = cause;
        }
        return Ok(RemoteValue::Error(cell));
    }
    if let Some(items) = &node.a {
        let cell = Arc::new(Mutex::new(Vec::with_capacity(items.len())));
        refs.insert(node.i, RemoteValue::Array(Arc::clone(&cell)));
        for item in items {
            let value = decode(item, refs)?;
            cell.lock().push(value);
        }
        return Ok(RemoteValue::Array(cell));
    }
    if let Some(props) = &node.o {
        let cell = Arc::new(Mutex::new(Vec::with_capacity(props.len())));
        refs.insert(node.i, RemoteValue::Object(Arc::clone(&cell)));
        for prop in props {
            let value = decode(&prop.v, refs)?;
            cell.lock().push((prop.k.clone(), value));
        }
        return Ok(RemoteValue::Object(cell));
    }

    // is_backref() covered the no-discriminator case above.
    Err(ParseError::BadBackref { index: node.i })
}

#[cfg(test)]
#[path = "serial_tests.rs"]
mod tests;
