//! Response parsers: pluggable decode strategies with uniform error mapping.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::cache::{CacheItem, CachedObject};
use crate::error::ParseError;

/// Decodes raw response bytes into a typed value.
///
/// Implementations distinguish "no bytes available" from "bytes present but
/// undecodable" through [`ParseError`]. The cache hooks let a parser
/// participate in the decoded-object round trip.
pub trait ResponseParser: Send + Sync {
    /// The decoded value.
    type Output: Clone + Send + Sync + 'static;

    /// Decode the body.
    fn parse(&self, bytes: Option<&Bytes>) -> Result<Self::Output, ParseError>;

    /// Produce a value from a cached item: the decoded object when one of the
    /// right type is present, otherwise by re-parsing the cached bytes.
    fn from_cached(&self, item: &CacheItem) -> Result<Self::Output, ParseError> {
        if let Some(object) = &item.object
            && let Some(value) = object.downcast_ref::<Self::Output>()
        {
            return Ok(value.clone());
        }
        self.parse(item.bytes.as_ref())
    }

    /// The object to write through to the cache after a successful parse.
    fn to_cached(&self, value: &Self::Output) -> Option<CachedObject> {
        Some(Arc::new(value.clone()))
    }
}

/// Identity parser returning the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesParser;

impl ResponseParser for BytesParser {
    type Output = Bytes;

    fn parse(&self, bytes: Option<&Bytes>) -> Result<Bytes, ParseError> {
        bytes.cloned().ok_or(ParseError::DataMissing)
    }

    fn to_cached(&self, _value: &Bytes) -> Option<CachedObject> {
        // the raw bytes already live in the cache item
        None
    }
}

/// UTF-8 text parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParser;

impl ResponseParser for TextParser {
    type Output = String;

    fn parse(&self, bytes: Option<&Bytes>) -> Result<String, ParseError> {
        let bytes = bytes.ok_or(ParseError::DataMissing)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| ParseError::Decode(Box::new(e)))
    }
}

/// Structured decode into `T` through serde.
pub struct JsonParser<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonParser<T> {
    /// Create a JSON parser for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResponseParser for JsonParser<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Output = T;

    fn parse(&self, bytes: Option<&Bytes>) -> Result<T, ParseError> {
        let bytes = bytes.ok_or(ParseError::DataMissing)?;
        serde_json::from_slice(bytes).map_err(|e| ParseError::Decode(Box::new(e)))
    }
}

/// Generic tree decode for callers needing dynamic inspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTreeParser;

impl ResponseParser for JsonTreeParser {
    type Output = serde_json::Value;

    fn parse(&self, bytes: Option<&Bytes>) -> Result<serde_json::Value, ParseError> {
        let bytes = bytes.ok_or(ParseError::DataMissing)?;
        serde_json::from_slice(bytes).map_err(|e| ParseError::Decode(Box::new(e)))
    }
}
