//! OAuth 1.0a request signing (HMAC-SHA1, RFC 5849).

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use std::borrow::Cow;
use thiserror::Error;
use url::Url;

use crate::credentials::Credentials;
use crate::parameters::RequestParams;

mod signer;
mod values;

pub use signer::{signature_base_string, RequestSigner};
pub use values::*;

/// Errors raised locally, before any network activity.
#[derive(Debug, Error)]
pub enum SignError {
    /// The request cannot be signed as given (bad URL, method or parameter name).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The clock or the OS entropy source is unusable.
    #[error("environment failure: {0}")]
    Environment(String),
}

/// Protocol parameters for a single request.
///
/// Each instance carries its own nonce and timestamp and is consumed by one
/// signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthParameterSet {
    consumer_key: String,
    nonce: String,
    signature_method: SignatureMethod,
    timestamp: i64,
    token: String,
    version: &'static str,
    signature: Option<String>,
}

impl OAuthParameterSet {
    /// Fresh parameters: random nonce and the current Unix time.
    pub fn generate(credentials: &Credentials) -> Result<Self, SignError> {
        Ok(Self::with_nonce_and_timestamp(
            credentials,
            generate_nonce()?,
            unix_timestamp()?,
        ))
    }

    /// Parameters with a caller-chosen nonce and timestamp.
    pub fn with_nonce_and_timestamp(
        credentials: &Credentials,
        nonce: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        OAuthParameterSet {
            consumer_key: credentials.consumer_key().to_string(),
            nonce: nonce.into(),
            signature_method: SignatureMethod::HmacSha1,
            timestamp,
            token: credentials.access_token().to_string(),
            version: OAUTH_VALUE_VERSION,
            signature: None,
        }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub(crate) fn set_signature(&mut self, signature: String) {
        self.signature = Some(signature);
    }

    /// The six protocol parameters in header order, without the signature.
    pub fn pairs(&self) -> Vec<(&'static str, Cow<'_, str>)> {
        vec![
            (OAUTH_PARAM_KEY_CONSUMER_KEY, Cow::from(self.consumer_key.as_str())),
            (OAUTH_PARAM_KEY_NONCE, Cow::from(self.nonce.as_str())),
            (
                OAUTH_PARAM_KEY_SIGNATURE_METHOD,
                Cow::Borrowed(self.signature_method.into()),
            ),
            (OAUTH_PARAM_KEY_TIMESTAMP, Cow::Owned(self.timestamp.to_string())),
            (OAUTH_PARAM_KEY_TOKEN, Cow::from(self.token.as_str())),
            (OAUTH_PARAM_KEY_VERSION, Cow::Borrowed(self.version)),
        ]
    }

    /// Renders the `Authorization` header value.
    ///
    /// Only the protocol parameters are listed; request parameters never
    /// appear here.
    pub fn to_header(&self) -> String {
        let mut pairs = self.pairs();
        if let Some(signature) = &self.signature {
            pairs.push((OAUTH_PARAM_KEY_SIGNATURE, Cow::from(signature.as_str())));
        }
        let rendered = pairs
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}=\"{}\"",
                    crate::util::percent_encode(k),
                    crate::util::percent_encode(v)
                )
            })
            .collect::<Vec<String>>()
            .join(", ");
        format!("{} {}", OAUTH_HEADER, rendered)
    }
}

/// One outbound request as seen by the signer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningRequest {
    method: HttpMethod,
    url: Url,
    params: RequestParams,
}

impl SigningRequest {
    /// Validates the method and the URL.
    ///
    /// The URL must be absolute http(s) without query or fragment; query
    /// parameters go in `params`.
    pub fn new(method: &str, url: &str, params: RequestParams) -> Result<Self, SignError> {
        let method = method.parse::<HttpMethod>()?;
        let url = parse_endpoint(url)?;
        if url.query().is_some() {
            return Err(SignError::InvalidRequest(format!(
                "query string must be passed as parameters, not in the URL: {}",
                url
            )));
        }
        check_reserved_names(&params)?;
        Ok(SigningRequest {
            method,
            url,
            params,
        })
    }

    /// Like [`SigningRequest::new`] but moves an embedded query string into the
    /// parameters. A key repeated in the query is rejected.
    pub fn from_url(method: &str, url: &str) -> Result<Self, SignError> {
        let mut url = parse_endpoint(url)?;
        let mut params = RequestParams::new();
        for (k, v) in url.query_pairs() {
            if params.get(&k).is_some() {
                return Err(SignError::InvalidRequest(format!(
                    "query parameter {} appears more than once",
                    k
                )));
            }
            params.insert(k.into_owned(), v.into_owned());
        }
        url.set_query(None);
        SigningRequest::new(method, url.as_str(), params)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The URL that takes part in the signature base string.
    pub fn base_url(&self) -> &str {
        self.url.as_str()
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }
}

fn parse_endpoint(url: &str) -> Result<Url, SignError> {
    let parsed = Url::parse(url)
        .map_err(|e| SignError::InvalidRequest(format!("{:?} is not an absolute URL: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(SignError::InvalidRequest(format!(
            "only http(s) URLs with a host can be signed: {}",
            url
        )));
    }
    if parsed.fragment().is_some() {
        return Err(SignError::InvalidRequest(format!(
            "URL must not carry a fragment: {}",
            url
        )));
    }
    Ok(parsed)
}

fn check_reserved_names(params: &RequestParams) -> Result<(), SignError> {
    const RESERVED: [&str; 7] = [
        OAUTH_PARAM_KEY_CONSUMER_KEY,
        OAUTH_PARAM_KEY_NONCE,
        OAUTH_PARAM_KEY_SIGNATURE,
        OAUTH_PARAM_KEY_SIGNATURE_METHOD,
        OAUTH_PARAM_KEY_TIMESTAMP,
        OAUTH_PARAM_KEY_TOKEN,
        OAUTH_PARAM_KEY_VERSION,
    ];
    match params.iter().find(|(k, _)| RESERVED.contains(&k.as_str())) {
        Some((k, _)) => Err(SignError::InvalidRequest(format!(
            "parameter {} is reserved for the OAuth protocol",
            k
        ))),
        None => Ok(()),
    }
}

/// 128 bits from the OS entropy source, as 32 lowercase hex characters.
fn generate_nonce() -> Result<String, SignError> {
    nonce_from(&mut OsRng)
}

fn nonce_from<R: RngCore>(rng: &mut R) -> Result<String, SignError> {
    let mut bytes = [0u8; 16];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| SignError::Environment(format!("entropy source unavailable: {}", e)))?;
    Ok(uuid::Uuid::from_bytes(bytes).simple().to_string())
}

fn unix_timestamp() -> Result<i64, SignError> {
    checked_timestamp(Utc::now().timestamp())
}

fn checked_timestamp(now: i64) -> Result<i64, SignError> {
    if now < 0 {
        return Err(SignError::Environment(format!(
            "system clock is before the Unix epoch ({})",
            now
        )));
    }
    Ok(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("ck", "cs", "at", "ats")
    }

    #[test]
    fn test_generate_fills_protocol_values() {
        let set = OAuthParameterSet::generate(&creds()).unwrap();
        assert_eq!(set.nonce().len(), 32);
        assert!(set.nonce().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(set.timestamp() > 1_700_000_000);
        assert!(set.signature().is_none());

        let pairs = set.pairs();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "oauth_consumer_key",
                "oauth_nonce",
                "oauth_signature_method",
                "oauth_timestamp",
                "oauth_token",
                "oauth_version"
            ]
        );
        assert_eq!(pairs[0].1, "ck");
        assert_eq!(pairs[2].1, "HMAC-SHA1");
        assert_eq!(pairs[4].1, "at");
        assert_eq!(pairs[5].1, "1.0");
    }

    #[test]
    fn test_nonces_do_not_repeat() {
        let nonces: std::collections::HashSet<String> = (0..1000)
            .map(|_| generate_nonce().unwrap())
            .collect();
        assert_eq!(nonces.len(), 1000);
    }

    struct BrokenEntropy;

    impl RngCore for BrokenEntropy {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("device not ready"))
        }
    }

    #[test]
    fn test_entropy_failure_is_environment_error() {
        match nonce_from(&mut BrokenEntropy) {
            Err(SignError::Environment(msg)) => assert!(msg.contains("device not ready")),
            other => panic!("expected Environment error, got {:?}", other),
        }
    }

    #[test]
    fn test_clock_before_epoch_is_environment_error() {
        assert!(matches!(checked_timestamp(-1), Err(SignError::Environment(_))));
        assert_eq!(checked_timestamp(0).unwrap(), 0);
        assert_eq!(checked_timestamp(1_700_000_000).unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_unsigned_header_lists_six_pairs() {
        let set = OAuthParameterSet::with_nonce_and_timestamp(&creds(), "n n", 1);
        assert_eq!(
            set.to_header(),
            "OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"n%20n\", \
             oauth_signature_method=\"HMAC-SHA1\", oauth_timestamp=\"1\", \
             oauth_token=\"at\", oauth_version=\"1.0\""
        );
    }

    #[test]
    fn test_request_rejects_bad_urls() {
        for url in [
            "/v1/market/quote/AAPL.json",
            "api.example.com/v1",
            "ftp://api.example.com/file",
            "https://api.example.com/v1?symbol=AAPL",
            "https://api.example.com/v1#top",
            "mailto:someone@example.com",
        ] {
            match SigningRequest::new("GET", url, RequestParams::new()) {
                Err(SignError::InvalidRequest(_)) => {}
                other => panic!("{} accepted: {:?}", url, other),
            }
        }
    }

    #[test]
    fn test_request_rejects_bad_method() {
        let err = SigningRequest::new("BREW", "https://api.example.com/v1", RequestParams::new());
        assert!(matches!(err, Err(SignError::InvalidRequest(_))));
    }

    #[test]
    fn test_request_rejects_reserved_parameter() {
        let params = RequestParams::new().with("oauth_nonce", "mine");
        let err = SigningRequest::new("GET", "https://api.example.com/v1", params);
        assert!(matches!(err, Err(SignError::InvalidRequest(_))));
    }

    #[test]
    fn test_request_normalizes_method_and_url() {
        let req = SigningRequest::new("get", "HTTPS://API.Example.com:443/v1/a.json", RequestParams::new())
            .unwrap();
        assert_eq!(req.method(), HttpMethod::Get);
        assert_eq!(req.base_url(), "https://api.example.com/v1/a.json");
    }

    #[test]
    fn test_from_url_moves_query_into_params() {
        let req = SigningRequest::from_url(
            "GET",
            "https://api.example.com/v1/market/historical/AAPL.json?startDate=2024-04-01&interval=daily&note=a+b%2Fc",
        )
        .unwrap();
        assert_eq!(req.base_url(), "https://api.example.com/v1/market/historical/AAPL.json");
        assert_eq!(req.params().get("startDate"), Some("2024-04-01"));
        assert_eq!(req.params().get("interval"), Some("daily"));
        assert_eq!(req.params().get("note"), Some("a b/c"));
    }

    #[test]
    fn test_from_url_rejects_repeated_query_keys() {
        let err = SigningRequest::from_url("GET", "https://api.example.com/v1/quote?a=1&b=2&a=2");
        assert!(matches!(err, Err(SignError::InvalidRequest(_))));
        let err = SigningRequest::from_url("GET", "https://api.example.com/v1/quote?a=1&a=1");
        assert!(matches!(err, Err(SignError::InvalidRequest(_))));
    }
}
