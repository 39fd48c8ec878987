//! File extension to `Content-Type` lookup

use crate::http::{
    table::{KeyedTable, TableBuilder},
    types,
};

/// Served for unknown extensions, extension-less paths and error pages.
pub const DEFAULT_MIME: &str = "text/html";

#[rustfmt::skip]
const MIME_TYPES: &[(&str, &str)] = &[
    ("html",  "text/html"),
    ("htm",   "text/html"),
    ("css",   "text/css"),
    ("txt",   "text/plain"),
    ("xml",   "text/xml"),
    ("csv",   "text/csv"),
    ("js",    "application/javascript"),
    ("mjs",   "application/javascript"),
    ("json",  "application/json"),
    ("pdf",   "application/pdf"),
    ("zip",   "application/zip"),
    ("word",  "application/msword"),
    ("doc",   "application/msword"),
    ("wasm",  "application/wasm"),
    ("gif",   "image/gif"),
    ("jpeg",  "image/jpeg"),
    ("jpg",   "image/jpeg"),
    ("png",   "image/png"),
    ("svg",   "image/svg+xml"),
    ("ico",   "image/x-icon"),
    ("webp",  "image/webp"),
    ("mp4",   "video/mp4"),
    ("webm",  "video/webm"),
    ("mp3",   "audio/mpeg"),
    ("woff",  "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf",   "font/ttf"),
];

/// Longest extension that can possibly match a table key.
const MAX_EXTENSION_LEN: usize = 8;

pub(crate) fn mime_table() -> KeyedTable<&'static str> {
    let mut builder = TableBuilder::with_buckets(64);
    for &(extension, mime) in MIME_TYPES {
        builder.insert(extension.as_bytes(), mime);
    }
    builder.freeze()
}

/// Content type for `extension`, compared case-insensitively.
pub(crate) fn content_type(table: &KeyedTable<&'static str>, extension: &[u8]) -> &'static str {
    let mut lower = [0u8; MAX_EXTENSION_LEN];

    types::into_lower_case(extension, &mut lower)
        .and_then(|key| table.get(key))
        .copied()
        .unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let table = mime_table();

        #[rustfmt::skip]
        let cases: [(&[u8], &str); 9] = [
            (b"html",        "text/html"),
            (b"txt",         "text/plain"),
            (b"PNG",         "image/png"),
            (b"Css",         "text/css"),
            (b"svg",         "image/svg+xml"),
            (b"",            DEFAULT_MIME),
            (b"exe",         DEFAULT_MIME),
            (b"unreasonably-long", DEFAULT_MIME),
            (b"woff2",       "font/woff2"),
        ];

        for (extension, expected) in cases {
            assert_eq!(content_type(&table, extension), expected);
        }
    }
}
