//! Validated client configuration and its builder.

// crates.io
use ::http::{
	HeaderMap, HeaderValue,
	header::{ACCEPT, CONTENT_TYPE, HeaderName},
};
// self
use crate::_prelude::*;

/// Header that carries the refresh token to the renewal endpoint unless overridden.
pub const DEFAULT_REFRESH_HEADER: &str = "x-refresh-token";

/// Errors raised while constructing or validating a [`ClientConfig`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ClientConfigError {
	/// Renewal endpoint must use HTTP(S).
	#[error("The renewal endpoint must use http or https: {url}.")]
	UnsupportedScheme {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Plain HTTP is only accepted for loopback hosts unless explicitly allowed.
	#[error("The renewal endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Header name cannot be used on the wire.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeaderName {
		/// Rejected header name.
		name: String,
	},
	/// Header value cannot be used on the wire.
	#[error("Value for header `{name}` is invalid.")]
	InvalidHeaderValue {
		/// Header whose value was rejected.
		name: String,
	},
	/// Exempt paths are matched against URL paths and must be absolute.
	#[error("Exempt path `{path}` must start with `/`.")]
	InvalidExemptPath {
		/// Rejected path.
		path: String,
	},
}

/// Immutable configuration consumed by [`AuthClient`](crate::client::AuthClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	/// Endpoint that trades a refresh token for a new credential pair.
	pub renewal_endpoint: Url,
	/// Header carrying the refresh token on renewal calls.
	pub refresh_header: HeaderName,
	/// Headers added to every outbound call unless the request sets them itself.
	pub default_headers: HeaderMap,
	/// URL paths whose 401 responses are returned as plain errors without renewal.
	pub exempt_paths: Vec<String>,
}
impl ClientConfig {
	/// Creates a new builder targeting `renewal_endpoint`.
	pub fn builder(renewal_endpoint: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(renewal_endpoint)
	}

	/// Returns `true` if a 401 from `url` must not trigger renewal.
	pub fn is_exempt(&self, url: &Url) -> bool {
		self.exempt_paths.iter().any(|path| url.path() == path)
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// Endpoint that trades a refresh token for a new credential pair.
	pub renewal_endpoint: Url,
	/// Header carrying the refresh token on renewal calls.
	pub refresh_header: String,
	/// Extra default headers, applied after the JSON defaults.
	pub default_headers: Vec<(String, String)>,
	/// URL paths whose 401 responses bypass renewal.
	pub exempt_paths: Vec<String>,
	/// Accepts plain HTTP renewal endpoints on non-loopback hosts.
	pub allow_insecure_endpoints: bool,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with the renewal endpoint.
	pub fn new(renewal_endpoint: Url) -> Self {
		Self {
			renewal_endpoint,
			refresh_header: DEFAULT_REFRESH_HEADER.into(),
			default_headers: Vec::new(),
			exempt_paths: Vec::new(),
			allow_insecure_endpoints: false,
		}
	}

	/// Overrides the refresh-token header name.
	pub fn refresh_header(mut self, name: impl Into<String>) -> Self {
		self.refresh_header = name.into();

		self
	}

	/// Adds or replaces a default header.
	pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.push((name.into(), value.into()));

		self
	}

	/// Exempts a URL path (for example the login endpoint) from renewal.
	pub fn exempt_path(mut self, path: impl Into<String>) -> Self {
		self.exempt_paths.push(path.into());

		self
	}

	/// Allows plain HTTP renewal endpoints on any host.
	pub fn allow_insecure_endpoints(mut self, allow: bool) -> Self {
		self.allow_insecure_endpoints = allow;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		validate_endpoint(&self.renewal_endpoint, self.allow_insecure_endpoints)?;

		let refresh_header = parse_header_name(&self.refresh_header)?;
		let mut default_headers = HeaderMap::new();

		default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		for (name, value) in &self.default_headers {
			let header = parse_header_name(name)?;
			let value = HeaderValue::from_str(value)
				.map_err(|_| ClientConfigError::InvalidHeaderValue { name: name.clone() })?;

			default_headers.insert(header, value);
		}

		if let Some(path) = self.exempt_paths.iter().find(|path| !path.starts_with('/')) {
			return Err(ClientConfigError::InvalidExemptPath { path: path.clone() });
		}

		Ok(ClientConfig {
			renewal_endpoint: self.renewal_endpoint,
			refresh_header,
			default_headers,
			exempt_paths: self.exempt_paths,
		})
	}
}

fn validate_endpoint(url: &Url, allow_insecure: bool) -> Result<(), ClientConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if allow_insecure || is_loopback(url) => Ok(()),
		"http" => Err(ClientConfigError::InsecureEndpoint { url: url.to_string() }),
		_ => Err(ClientConfigError::UnsupportedScheme { url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

fn parse_header_name(name: &str) -> Result<HeaderName, ClientConfigError> {
	HeaderName::from_bytes(name.as_bytes())
		.map_err(|_| ClientConfigError::InvalidHeaderName { name: name.to_owned() })
}
