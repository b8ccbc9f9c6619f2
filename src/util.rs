use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, PercentEncode};
use std::borrow::Cow;

// https://tools.ietf.org/html/rfc5849#section-3.6
// * ALPHA, DIGIT, '-', '.', '_', '~' MUST NOT be encoded.
// * All other characters MUST be encoded.
// * The two hexadecimal characters used to represent encoded
//   characters MUST be uppercase.
const TARGETS_FOR_PARAMS: &AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn percent_encode(input: &str) -> PercentEncode<'_> {
    utf8_percent_encode(input, TARGETS_FOR_PARAMS)
}

pub fn percent_encode_str<'a, T: Into<Cow<'a, str>>>(input: T) -> String {
    percent_encode(&input.into()).to_string()
}

/// Reverses [`percent_encode`]. `+` is left alone, it is never produced by the encoder.
pub fn percent_decode(input: &str) -> Option<String> {
    percent_decode_str(input)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Parses an `OAuth k="v", ...` header value back into decoded pairs, in header order.
pub fn parse_authorization_header(header: &str) -> Option<Vec<(String, String)>> {
    let body = header.strip_prefix("OAuth ")?;
    body.split(", ")
        .map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let v = v.strip_prefix('"')?.strip_suffix('"')?;
            Some((percent_decode(k)?, percent_decode(v)?))
        })
        .collect()
}

#[test]
fn test_percent_encode_unreserved() {
    assert_eq!(percent_encode_str("AZaz09-._~"), "AZaz09-._~");
    assert_eq!(percent_encode_str("a b"), "a%20b");
    assert_eq!(percent_encode_str("a+b=c&d"), "a%2Bb%3Dc%26d");
    assert_eq!(percent_encode_str("/:?#[]@!$'()*,;"), "%2F%3A%3F%23%5B%5D%40%21%24%27%28%29%2A%2C%3B");
    assert_eq!(percent_encode_str("パ"), "%E3%83%91");
    assert_eq!(percent_encode_str(""), "");
}

#[test]
fn test_percent_decode() {
    assert_eq!(percent_decode("a%20b%2Bc").as_deref(), Some("a b+c"));
    assert_eq!(percent_decode("%E3%83%91").as_deref(), Some("パ"));
    assert_eq!(percent_decode("%FF"), None);
    let raw = "Hello Ladies + Gentlemen, a signed OAuth request!";
    assert_eq!(percent_decode(&percent_encode_str(raw)).as_deref(), Some(raw));
}
