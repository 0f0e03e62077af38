//! The renewal exchange: trading a refresh token for a new credential pair.

// crates.io
use ::http::{HeaderMap, HeaderValue, header::HeaderName};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	config::ClientConfig,
	http::{self, ApiRequest, HttpTransport},
	refresh::RefreshError,
};

/// Boxed future returned by [`RenewalExchange::exchange`].
///
/// `Ok(None)` means the endpoint accepted the call but its body carried no usable access token.
/// A pair embedded in the failing business response takes precedence over either outcome, but
/// only once the exchange itself succeeded.
pub type ExchangeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Option<Credential>, RefreshError>> + 'a + Send>>;

/// Performs one renewal call against the authorization server.
pub trait RenewalExchange
where
	Self: Send + Sync,
{
	/// Trades `refresh_token` for a new pair.
	fn exchange<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a>;
}

/// HTTP renewal exchange: `POST {}` to the renewal endpoint with the refresh token in a
/// dedicated header, expecting `{"data": {"accessToken": .., "refreshToken": ..}}` back.
pub struct HttpRenewalExchange<T>
where
	T: HttpTransport,
{
	transport: Arc<T>,
	endpoint: Url,
	refresh_header: HeaderName,
	default_headers: HeaderMap,
}
impl<T> HttpRenewalExchange<T>
where
	T: HttpTransport,
{
	/// Creates an exchange that reuses `transport` and the endpoint settings of `config`.
	pub fn new(transport: impl Into<Arc<T>>, config: &ClientConfig) -> Self {
		Self {
			transport: transport.into(),
			endpoint: config.renewal_endpoint.clone(),
			refresh_header: config.refresh_header.clone(),
			default_headers: config.default_headers.clone(),
		}
	}

	fn build_request(&self, refresh_token: &TokenSecret) -> Result<http::HttpRequest, RefreshError> {
		let mut value = HeaderValue::from_str(refresh_token.expose())
			.map_err(|e| RefreshError::InvalidRequest { message: e.to_string() })?;

		value.set_sensitive(true);

		ApiRequest::post(self.endpoint.clone())
			.header(self.refresh_header.clone(), value)
			.body(b"{}".to_vec())
			.to_http(&self.default_headers, None)
			.map_err(|e| RefreshError::InvalidRequest { message: e.to_string() })
	}
}
impl<T> RenewalExchange for HttpRenewalExchange<T>
where
	T: HttpTransport,
{
	fn exchange<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a> {
		Box::pin(async move {
			let request = self.build_request(refresh_token)?;
			let response = self.transport.execute(request).await.map_err(|e| {
				RefreshError::Transport(Arc::new(http::map_transport_error(&self.endpoint, e)))
			})?;

			if !response.status.is_success() {
				return Err(RefreshError::Rejected { status: response.status.as_u16() });
			}

			parse_exchange_body(&response.body)
		})
	}
}
impl<T> Debug for HttpRenewalExchange<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpRenewalExchange")
			.field("endpoint", &self.endpoint.as_str())
			.field("refresh_header", &self.refresh_header)
			.finish()
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuedPair {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
}
impl IssuedPair {
	fn into_credential(self) -> Option<Credential> {
		let access = self.access_token.filter(|value| !value.is_empty())?;

		Some(Credential {
			access_token: TokenSecret::new(access),
			refresh_token: self.refresh_token.map(TokenSecret::new),
		})
	}
}

#[derive(Debug, Deserialize)]
struct ExchangeEnvelope {
	#[serde(default)]
	data: Option<IssuedPair>,
}

/// Reads the pair from a successful renewal body.
pub(crate) fn parse_exchange_body(body: &[u8]) -> Result<Option<Credential>, RefreshError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(None);
	}

	let mut de = serde_json::Deserializer::from_slice(body);
	let envelope: ExchangeEnvelope = serde_path_to_error::deserialize(&mut de)
		.map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;

	Ok(envelope.data.and_then(IssuedPair::into_credential))
}

/// Reads a renewed pair a server embedded under `error` in a failing business response.
///
/// Anything that does not look like such a pair yields `None`.
pub fn embedded_credential(body: &[u8]) -> Option<Credential> {
	let mut payload: Value = serde_json::from_slice(body).ok()?;
	let error = payload.get_mut("error")?.take();

	if !error.is_object() {
		return None;
	}

	serde_json::from_value::<IssuedPair>(error).ok()?.into_credential()
}
