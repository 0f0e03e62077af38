//! Transport primitives and the request/response types the pipeline replays.
//!
//! [`ApiRequest`] is the opaque descriptor a caller hands to the client. It stays cloneable so
//! the pipeline can re-dispatch it after a renewal. [`HttpTransport`] is the only dependency on
//! an HTTP stack: the crate ships [`ReqwestTransport`], and tests or embedders can plug in any
//! client that turns an [`HttpRequest`] into an [`ApiResponse`].

// std
#[cfg(feature = "reqwest")] use std::time::Duration;
// crates.io
use ::http::{
	HeaderMap, HeaderValue, Method, Request, StatusCode,
	header::{AUTHORIZATION, HeaderName},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransportError},
};

/// Wire-level request handed to an [`HttpTransport`].
pub type HttpRequest = Request<Vec<u8>>;

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a, E> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute business and renewal calls.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// pipeline and the renewal exchange. A transport reports only network-level failures as
/// errors; every HTTP status, including 401, comes back as an [`ApiResponse`].
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends `request` and buffers the full response.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError>;
}

/// Replayable request descriptor.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Caller-supplied headers; `Authorization` is always overwritten by the pipeline.
	pub headers: HeaderMap,
	/// Optional body bytes.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(url: Url) -> Self {
		Self::new(Method::PUT, url)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(url: Url) -> Self {
		Self::new(Method::DELETE, url)
	}

	/// Appends a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Replaces the body with raw bytes.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body.
	pub fn json<T>(mut self, value: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let bytes =
			serde_json::to_vec(value).map_err(|source| ConfigError::RequestBody { source })?;

		self.body = Some(bytes);

		Ok(self)
	}

	/// Builds the wire request, filling in `defaults` the caller did not set and attaching the
	/// bearer credential when one is supplied.
	pub fn to_http(
		&self,
		defaults: &HeaderMap,
		bearer: Option<&TokenSecret>,
	) -> Result<HttpRequest, ConfigError> {
		let mut request = Request::builder()
			.method(self.method.clone())
			.uri(self.url.as_str())
			.body(self.body.clone().unwrap_or_default())?;
		let headers = request.headers_mut();

		for (name, value) in defaults {
			if !self.headers.contains_key(name) {
				headers.insert(name.clone(), value.clone());
			}
		}
		for (name, value) in &self.headers {
			headers.append(name.clone(), value.clone());
		}

		headers.remove(AUTHORIZATION);

		if let Some(secret) = bearer {
			headers.insert(AUTHORIZATION, bearer_header(secret)?);
		}

		Ok(request)
	}
}

/// Fully buffered response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with empty headers.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Decodes the body as JSON, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de).map_err(|source| Error::Decode { source })
	}

	/// Returns the body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Returns `true` for 401, the only status the pipeline treats as credential expiry.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Passes 1xx-3xx responses through and turns every other status into
	/// [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.status.is_client_error() || self.status.is_server_error() {
			Err(Error::Status { status: self.status, response: Box::new(self) })
		} else {
			Ok(self)
		}
	}
}

pub(crate) fn bearer_header(secret: &TokenSecret) -> Result<HeaderValue, ConfigError> {
	let mut value = HeaderValue::from_str(&format!("Bearer {}", secret.expose()))?;

	value.set_sensitive(true);

	Ok(value)
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The renewal exchange has no timeout of its own; configure one on the wrapped client (or use
/// [`ReqwestTransport::with_timeout`]) to bound how long waiters can hang on a stalled
/// authorization server.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client whose calls, renewal included, fail after `timeout`.
	pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(timeout).build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	type TransportError = ReqwestError;

	fn execute(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

/// Maps a transport failure for `url` into the crate's [`TransportError`].
pub(crate) fn map_transport_error<E>(url: &Url, err: E) -> TransportError
where
	E: 'static + Send + Sync + StdError,
{
	TransportError::network(url, err)
}
