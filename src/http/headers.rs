//! Header dispatch table and the per-header handlers

use crate::{
    errors::ErrorKind,
    http::{
        parser::Archive,
        table::{KeyedTable, TableBuilder},
        types,
        view::Span,
    },
    limits::ReqLimits,
};

macro_rules! header_fields {
    ($( $field:ident = $name:literal => $handler:ident, )+) => {
        /// Structured request header a dispatched value is stored into.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum HeaderField { $( $field, )+ }

        impl HeaderField {
            pub const ALL: &'static [HeaderField] = &[ $( HeaderField::$field, )+ ];
            const COUNT: usize = Self::ALL.len();

            /// Lower-case wire name used as the dispatch key.
            #[inline]
            pub const fn name(&self) -> &'static str {
                match self { $( HeaderField::$field => $name, )+ }
            }

            #[inline]
            const fn handler(&self) -> HeaderHandler {
                match self { $( HeaderField::$field => HeaderHandler::$handler, )+ }
            }
        }
    };
}

header_fields! {
    Accept            = "accept"              => Base,
    AcceptCharset     = "accept-charset"      => Base,
    AcceptEncoding    = "accept-encoding"     => Base,
    AcceptLanguage    = "accept-language"     => Base,
    CacheControl      = "cache-control"       => Base,
    ContentLength     = "content-length"      => ContentLength,
    Connection        = "connection"          => Connection,
    Cookie            = "cookie"              => Base,
    Date              = "date"                => Base,
    Host              = "host"                => Base,
    IfModifiedSince   = "if-modified-since"   => Base,
    IfUnmodifiedSince = "if-unmodified-since" => Base,
    MaxForwards       = "max-forwards"        => Base,
    Range             = "range"               => Base,
    Referer           = "referer"             => Base,
    TransferEncoding  = "transfer-encoding"   => TransferEncoding,
    UserAgent         = "user-agent"          => Base,
}

/// Longest dispatch key. Longer names can never match and skip the lookup.
const MAX_NAME_LEN: usize = 32;

/// Values of the headers the dispatch table knows about.
///
/// Each value is a [`Span`] into the request head, so it can only be read
/// back while the head is still held in the read buffer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderFields {
    spans: [Option<Span>; HeaderField::COUNT],
}

impl HeaderFields {
    #[inline]
    pub fn get(&self, field: HeaderField) -> Option<Span> {
        self.spans[field as usize]
    }

    #[inline]
    pub fn value<'a>(&self, field: HeaderField, buf: &'a [u8]) -> Option<&'a [u8]> {
        self.get(field)?.get(buf)
    }

    #[inline]
    pub(crate) fn set(&mut self, field: HeaderField, value: Span) {
        self.spans[field as usize] = Some(value);
    }
}

/// What a dispatched header does besides being stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeaderHandler {
    /// Store the value, nothing else.
    Base,
    /// `keep-alive` / `close`, anything else is rejected.
    Connection,
    /// Positive decimal body length.
    ContentLength,
    /// Every coding is refused.
    TransferEncoding,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub handler: HeaderHandler,
    pub field: HeaderField,
}

/// Transfer codings recognised in a `Transfer-Encoding` value.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Coding {
    Chunked,
    Compress,
    Deflate,
    Gzip,
    #[default]
    Identity,
}

impl Coding {
    fn from_value(value: &[u8]) -> Option<Self> {
        let mut lower = [0u8; 8];
        match types::into_lower_case(value, &mut lower)? {
            b"chunked" => Some(Coding::Chunked),
            b"compress" => Some(Coding::Compress),
            b"deflate" => Some(Coding::Deflate),
            b"gzip" => Some(Coding::Gzip),
            b"identity" => Some(Coding::Identity),
            _ => None,
        }
    }
}

pub(crate) fn header_table() -> KeyedTable<HeaderEntry> {
    let mut builder = TableBuilder::with_buckets(64);
    for &field in HeaderField::ALL {
        let entry = HeaderEntry {
            handler: field.handler(),
            field,
        };
        builder.insert(field.name().as_bytes(), entry);
    }
    builder.freeze()
}

/// Routes the archive's current header to its handler. Unknown names are
/// ignored.
pub(crate) fn dispatch(
    table: &KeyedTable<HeaderEntry>,
    archive: &mut Archive,
    buf: &[u8],
    limits: &ReqLimits,
) -> Result<(), ErrorKind> {
    let name = archive.name.get(buf).ok_or(ErrorKind::InvalidHeader)?;

    let mut lower = [0u8; MAX_NAME_LEN];
    let Some(key) = types::into_lower_case(name, &mut lower) else {
        return Ok(());
    };

    match table.get(key) {
        Some(entry) => entry.handler.apply(entry.field, archive, buf, limits),
        None => Ok(()),
    }
}

impl HeaderHandler {
    pub(crate) fn apply(
        self,
        field: HeaderField,
        archive: &mut Archive,
        buf: &[u8],
        limits: &ReqLimits,
    ) -> Result<(), ErrorKind> {
        archive.headers.set(field, archive.value);
        let value = archive.value.get(buf).ok_or(ErrorKind::InvalidHeader)?;

        match self {
            Self::Base => Ok(()),
            Self::Connection => {
                if value.eq_ignore_ascii_case(b"keep-alive") {
                    archive.keep_alive = true;
                } else if value.eq_ignore_ascii_case(b"close") {
                    archive.keep_alive = false;
                } else {
                    return Err(ErrorKind::InvalidConnection);
                }
                Ok(())
            }
            Self::ContentLength => {
                let len = types::slice_to_usize(value)
                    .filter(|len| *len > 0)
                    .ok_or(ErrorKind::InvalidContentLength)?;

                if len > limits.body_size {
                    return Err(ErrorKind::BodyTooLarge);
                }
                archive.content_length = len;
                Ok(())
            }
            Self::TransferEncoding => match Coding::from_value(value) {
                Some(coding) => {
                    archive.transfer_encoding = coding;
                    Err(ErrorKind::UnsupportedTransferEncoding)
                }
                None => Err(ErrorKind::InvalidTransferEncoding),
            },
        }
    }
}
