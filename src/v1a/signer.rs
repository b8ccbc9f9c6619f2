use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::trace;

use super::{OAuthParameterSet, SignError, SigningRequest};
use crate::credentials::Credentials;
use crate::parameters::RequestParams;
use crate::util::{percent_encode, percent_encode_str};

type HmacSha1 = Hmac<Sha1>;

/// Produces OAuth 1.0a `Authorization` header values.
///
/// Holds nothing but the credentials; every call draws its own nonce and
/// timestamp, so one signer can be shared across threads and tasks.
#[derive(Clone, Debug)]
pub struct RequestSigner {
    credentials: Credentials,
}

impl RequestSigner {
    pub fn new(credentials: Credentials) -> Self {
        RequestSigner { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Signs one request and returns the value for the `Authorization` header.
    ///
    /// `url` is the bare endpoint; query or body parameters that take part in
    /// the signature go in `params`. They are not part of the returned value.
    ///
    /// # Errors
    /// - `SignError::InvalidRequest` for an unsupported method, a non-absolute
    ///   URL, a URL with a query string, or a reserved parameter name.
    /// - `SignError::Environment` when the clock or entropy source fails.
    pub fn sign(&self, method: &str, url: &str, params: &RequestParams) -> Result<String, SignError> {
        let request = SigningRequest::new(method, url, params.clone())?;
        self.sign_request(&request)
    }

    /// Signs an already validated request.
    pub fn sign_request(&self, request: &SigningRequest) -> Result<String, SignError> {
        let oauth = OAuthParameterSet::generate(&self.credentials)?;
        let signed = self.sign_with(request, oauth);
        trace!(
            method = %request.method(),
            url = request.base_url(),
            params = request.params().len(),
            "signed request"
        );
        Ok(signed.to_header())
    }

    /// Computes the signature for fixed protocol parameters and stores it in
    /// the returned set. Deterministic for a given nonce and timestamp.
    pub fn sign_with(&self, request: &SigningRequest, mut oauth: OAuthParameterSet) -> OAuthParameterSet {
        let signature = self.compute_signature(request, &oauth);
        oauth.set_signature(signature);
        oauth
    }

    /// Base64 of HMAC-SHA1(signing key, signature base string).
    pub fn compute_signature(&self, request: &SigningRequest, oauth: &OAuthParameterSet) -> String {
        let base_str = signature_base_string(request, oauth);
        let sign_key = self.signing_key();

        let mut mac =
            HmacSha1::new_from_slice(sign_key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(base_str.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn signing_key(&self) -> String {
        format!(
            "{}&{}",
            percent_encode(self.credentials.consumer_secret()),
            percent_encode(self.credentials.access_token_secret())
        )
    }
}

/// `METHOD&enc(url)&enc(sorted params)` as defined in RFC 5849 section 3.4.1.
///
/// The parameter segment covers the protocol parameters (without
/// `oauth_signature`) and the request parameters, each pair encoded and then
/// sorted by key, then value.
pub fn signature_base_string(request: &SigningRequest, oauth: &OAuthParameterSet) -> String {
    let mut params = oauth
        .pairs()
        .iter()
        .map(|(k, v)| (percent_encode(k).to_string(), percent_encode(v).to_string()))
        .chain(
            request
                .params()
                .iter()
                .map(|(k, v)| (percent_encode_str(k.as_str()), percent_encode_str(v.as_str()))),
        )
        .collect::<Vec<(String, String)>>();
    params.sort();

    let param_str = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<String>>()
        .join("&");

    // the parameter string is encoded a second time here
    format!(
        "{}&{}&{}",
        percent_encode(request.method().as_str()),
        percent_encode(request.base_url()),
        percent_encode(&param_str)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::parse_authorization_header;
    use std::collections::HashSet;
    use std::sync::Arc;

    const QUOTE_URL: &str = "https://api.example.com/v1/market/quote/AAPL.json";

    fn signer() -> RequestSigner {
        RequestSigner::new(Credentials::new("ck", "cs", "at", "ats"))
    }

    fn fixed(signer: &RequestSigner) -> OAuthParameterSet {
        OAuthParameterSet::with_nonce_and_timestamp(signer.credentials(), "nonce123", 1_700_000_000)
    }

    #[test]
    fn test_known_vector() {
        let signer = signer();
        let request = SigningRequest::new("GET", QUOTE_URL, RequestParams::new()).unwrap();
        let oauth = fixed(&signer);

        assert_eq!(
            signature_base_string(&request, &oauth),
            "GET&https%3A%2F%2Fapi.example.com%2Fv1%2Fmarket%2Fquote%2FAAPL.json&\
             oauth_consumer_key%3Dck%26oauth_nonce%3Dnonce123%26\
             oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1700000000%26\
             oauth_token%3Dat%26oauth_version%3D1.0"
        );
        let signed = signer.sign_with(&request, oauth);
        assert_eq!(signed.signature(), Some("orhMi8QJ56bVb8EoSWqvCWw0zHE="));
        assert_eq!(
            signed.to_header(),
            "OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"nonce123\", \
             oauth_signature_method=\"HMAC-SHA1\", oauth_timestamp=\"1700000000\", \
             oauth_token=\"at\", oauth_version=\"1.0\", \
             oauth_signature=\"orhMi8QJ56bVb8EoSWqvCWw0zHE%3D\""
        );
    }

    #[test]
    fn test_known_vector_with_query_params() {
        let signer = signer();
        let params = RequestParams::new()
            .with("startDate", "2024-04-01")
            .with("endDate", "2024-04-17")
            .with("interval", "daily");
        let request = SigningRequest::new(
            "GET",
            "https://api.example.com/v1/market/historical/AAPL.json",
            params,
        )
        .unwrap();
        let signed = signer.sign_with(&request, fixed(&signer));
        assert_eq!(signed.signature(), Some("ak0RsqhRI1DZucyPO+1FCXgg6rs="));
    }

    #[test]
    fn test_secrets_and_values_are_encoded() {
        // reserved characters in the secrets and a value that needs double encoding
        let signer = RequestSigner::new(Credentials::new("ck", "c s&", "at", "a~t/s"));
        let request = SigningRequest::new(
            "post",
            "https://api.example.com/v1/accounts/abc/orders/place.json",
            RequestParams::new().with("note", "a b+c/d"),
        )
        .unwrap();
        let oauth = fixed(&signer);
        assert!(signature_base_string(&request, &oauth).starts_with(
            "POST&https%3A%2F%2Fapi.example.com%2Fv1%2Faccounts%2Fabc%2Forders%2Fplace.json&\
             note%3Da%2520b%252Bc%252Fd%26"
        ));
        assert_eq!(signer.signing_key(), "c%20s%26&a~t%2Fs");
        let signed = signer.sign_with(&request, oauth);
        assert_eq!(signed.signature(), Some("P/unnGXM8rLMTU/oEznHoHnU9WI="));
    }

    #[test]
    fn test_signing_twitter_example() {
        // https://developer.twitter.com/ja/docs/basics/authentication/guides/creating-a-signature
        let signer = RequestSigner::new(Credentials::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        ));
        let request = SigningRequest::from_url(
            "post",
            "https://api.twitter.com/1.1/statuses/update.json?include_entities=true",
        )
        .unwrap();
        let request = SigningRequest::new(
            "post",
            request.base_url(),
            request
                .params()
                .clone()
                .with("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
        )
        .unwrap();
        let oauth = OAuthParameterSet::with_nonce_and_timestamp(
            signer.credentials(),
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            1_318_622_958,
        );
        let signed = signer.sign_with(&request, oauth);
        assert_eq!(signed.signature(), Some("hCtSmYh+iHYCEqBWrE7C7hYmtUk="));
    }

    #[test]
    fn test_fixed_nonce_and_timestamp_is_deterministic() {
        let signer = signer();
        let request = SigningRequest::new("GET", QUOTE_URL, RequestParams::new()).unwrap();
        let a = signer.sign_with(&request, fixed(&signer));
        let b = signer.sign_with(&request, fixed(&signer));
        assert_eq!(a.to_header(), b.to_header());
    }

    #[test]
    fn test_repeated_calls_use_fresh_nonces() {
        let signer = signer();
        let params = RequestParams::new();
        let first = parse_authorization_header(&signer.sign("GET", QUOTE_URL, &params).unwrap()).unwrap();
        let second = parse_authorization_header(&signer.sign("GET", QUOTE_URL, &params).unwrap()).unwrap();
        let nonce = |pairs: &Vec<(String, String)>| pairs[1].1.clone();
        let signature = |pairs: &Vec<(String, String)>| pairs[6].1.clone();
        assert_ne!(nonce(&first), nonce(&second));
        assert_ne!(signature(&first), signature(&second));
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let signer = signer();
        let forward: RequestParams = vec![("zebra", "1"), ("alpha", "2"), ("middle", "3")]
            .into_iter()
            .collect();
        let backward: RequestParams = vec![("middle", "3"), ("alpha", "2"), ("zebra", "1")]
            .into_iter()
            .collect();
        let a = SigningRequest::new("GET", QUOTE_URL, forward).unwrap();
        let b = SigningRequest::new("GET", QUOTE_URL, backward).unwrap();
        let oauth = fixed(&signer);
        let base = signature_base_string(&a, &oauth);
        assert_eq!(base, signature_base_string(&b, &oauth));
        assert!(base.ends_with("oauth_version%3D1.0%26zebra%3D1"));
        assert!(base.contains("&alpha%3D2%26middle%3D3%26oauth_consumer_key"));
    }

    #[test]
    fn test_sort_is_by_encoded_key() {
        // "%20" sorts before "-", so "a b" comes first once encoded
        let signer = signer();
        let params = RequestParams::new().with("a-b", "1").with("a b", "2");
        let request = SigningRequest::new("GET", QUOTE_URL, params).unwrap();
        let base = signature_base_string(&request, &fixed(&signer));
        let a_space = base.find("a%2520b").unwrap();
        let a_dash = base.find("a-b").unwrap();
        assert!(a_space < a_dash);
    }

    #[test]
    fn test_extra_params_change_signature_not_header() {
        let signer = signer();
        let plain = SigningRequest::new("GET", QUOTE_URL, RequestParams::new()).unwrap();
        let extra = SigningRequest::new(
            "GET",
            QUOTE_URL,
            RequestParams::new().with("detailFlag", "ALL"),
        )
        .unwrap();
        let a = signer.sign_with(&plain, fixed(&signer));
        let b = signer.sign_with(&extra, fixed(&signer));
        assert_ne!(a.signature(), b.signature());

        let header = b.to_header();
        assert!(!header.contains("detailFlag"));
        assert!(!header.contains("ALL"));
    }

    #[test]
    fn test_header_shape() {
        let header = signer()
            .sign("get", QUOTE_URL, &RequestParams::new().with("symbols", "AAPL,MSFT"))
            .unwrap();
        assert!(header.starts_with("OAuth "));
        assert!(!header.ends_with(','));
        assert!(!header.ends_with(", "));
        assert_eq!(header.matches(", ").count(), 6);

        let pairs = parse_authorization_header(&header).unwrap();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "oauth_consumer_key",
                "oauth_nonce",
                "oauth_signature_method",
                "oauth_timestamp",
                "oauth_token",
                "oauth_version",
                "oauth_signature"
            ]
        );
    }

    #[test]
    fn test_header_decodes_to_input_values() {
        let signer = RequestSigner::new(Credentials::new("key with space/+", "cs", "tok=en&", "ats"));
        let request = SigningRequest::new("GET", QUOTE_URL, RequestParams::new()).unwrap();
        let signed = signer.sign_with(
            &request,
            OAuthParameterSet::with_nonce_and_timestamp(signer.credentials(), "n~o.n-c_e", 42),
        );
        let pairs = parse_authorization_header(&signed.to_header()).unwrap();
        assert_eq!(pairs[0].1, "key with space/+");
        assert_eq!(pairs[1].1, "n~o.n-c_e");
        assert_eq!(pairs[3].1, "42");
        assert_eq!(pairs[4].1, "tok=en&");
        assert_eq!(Some(pairs[6].1.as_str()), signed.signature());
    }

    #[test]
    fn test_empty_credentials_still_sign() {
        let signer = RequestSigner::new(Credentials::new("", "", "", ""));
        let header = signer.sign("GET", QUOTE_URL, &RequestParams::new()).unwrap();
        assert!(header.contains("oauth_consumer_key=\"\""));
        assert!(header.contains("oauth_signature=\""));
    }

    #[test]
    fn test_invalid_requests_fail_before_signing() {
        let signer = signer();
        let params = RequestParams::new();
        assert!(matches!(
            signer.sign("FETCH", QUOTE_URL, &params),
            Err(SignError::InvalidRequest(_))
        ));
        assert!(matches!(
            signer.sign("GET", "/v1/market/quote/AAPL.json", &params),
            Err(SignError::InvalidRequest(_))
        ));
        assert!(matches!(
            signer.sign("GET", "https://api.example.com/v1/quote?symbol=AAPL", &params),
            Err(SignError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_concurrent_signing_shares_credentials() {
        let signer = Arc::new(signer());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let signer = Arc::clone(&signer);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| {
                            let header = signer.sign("GET", QUOTE_URL, &RequestParams::new()).unwrap();
                            parse_authorization_header(&header).unwrap()[1].1.clone()
                        })
                        .collect::<Vec<String>>()
                })
            })
            .collect();
        let nonces: HashSet<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(nonces.len(), 400);
    }
}
