//! Authenticated calls against the Pagopar API.
//!
//! Every call follows the same pipeline:
//!
//! 1. The HTTP method selects the encoding. GET-class methods carry the
//!    payload in the query string, POST-class methods as a UTF-8 JSON body.
//!    Anything else fails before a connection is attempted.
//! 2. The seed is signed with the application's private key and the token is
//!    injected next to the public key, under per-endpoint field names
//!    ([`CredentialFields`]).
//! 3. One round trip on the application's session.
//! 4. The envelope `{"respuesta": bool, "resultado": ...}` is decoded with
//!    `resultado` left raw. Only when `respuesta` is `true` is the raw
//!    fragment decoded into the requested type.
//!
//! Typed endpoints implement [`Endpoint`] and go through
//! [`Application::send`]. [`Application::call`] is the untyped entry point
//! for payloads assembled by hand.

use std::borrow::Cow;

use reqwest::{Method, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, value::RawValue};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    error::{PagoparError, Result},
    registry::{Application, Registry},
};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Payload field names for the signature token and the public key.
///
/// Endpoint families disagree on the public key's name, so each endpoint
/// declares its own pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialFields {
    /// Field carrying the signature token.
    pub token: &'static str,
    /// Field carrying the public key.
    pub public_key: &'static str,
}

impl CredentialFields {
    /// `token` + `public_key`.
    pub const DEFAULT: Self = Self { token: "token", public_key: "public_key" };

    /// `token` + `token_publico`.
    pub const TOKEN_PUBLICO: Self = Self { token: "token", public_key: "token_publico" };
}

impl Default for CredentialFields {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One untyped call.
#[derive(Debug, Clone)]
pub struct CallSpec<'a> {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base, e.g. `pedidos/1.1/traer`.
    pub path: Cow<'a, str>,
    /// String the signature token is computed over.
    pub seed: Cow<'a, str>,
    /// Domain payload, before credential injection.
    pub payload: Map<String, Value>,
    /// Credential field names.
    pub fields: CredentialFields,
}

impl<'a> CallSpec<'a> {
    /// A POST call with an empty payload and default field names.
    #[must_use]
    pub fn post(path: impl Into<Cow<'a, str>>, seed: impl Into<Cow<'a, str>>) -> Self {
        Self::new(Method::POST, path, seed)
    }

    /// A call with an empty payload and default field names.
    #[must_use]
    pub fn new(method: Method, path: impl Into<Cow<'a, str>>, seed: impl Into<Cow<'a, str>>) -> Self {
        Self {
            method,
            path: path.into(),
            seed: seed.into(),
            payload: Map::new(),
            fields: CredentialFields::DEFAULT,
        }
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Replaces the credential field names.
    #[must_use]
    pub fn with_fields(mut self, fields: CredentialFields) -> Self {
        self.fields = fields;
        self
    }
}

/// A typed remote operation.
///
/// The implementing type is the request payload. It must serialize to a JSON
/// object; the signature and public key are added by the transport.
///
/// # Examples
///
/// ```
/// use std::borrow::Cow;
///
/// use pagopar_client::transport::{CredentialFields, Endpoint};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct ListCities;
///
/// impl Endpoint for ListCities {
///     type Response = Vec<serde_json::Value>;
///     const PATH: &'static str = "ciudades/1.1/traer";
///     const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;
///
///     fn seed(&self) -> Cow<'_, str> {
///         Cow::Borrowed("CIUDADES")
///     }
/// }
/// ```
pub trait Endpoint: Serialize {
    /// Shape of `resultado` on success.
    type Response: DeserializeOwned;

    /// Path relative to the API base.
    const PATH: &'static str;

    /// HTTP method.
    const METHOD: Method = Method::POST;

    /// Credential field names.
    const CREDENTIALS: CredentialFields = CredentialFields::DEFAULT;

    /// Signature seed for this request.
    fn seed(&self) -> Cow<'_, str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Query,
    Json,
}

impl Encoding {
    fn for_method(method: &Method) -> Result<Self> {
        match method.as_str() {
            "GET" | "HEAD" | "OPTIONS" | "CONNECT" | "TRACE" => Ok(Self::Query),
            "POST" | "PUT" | "PATCH" | "DELETE" => Ok(Self::Json),
            other => Err(PagoparError::UnsupportedMethod(other.to_owned())),
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope<'a> {
    #[serde(rename = "respuesta")]
    success: bool,
    #[serde(rename = "resultado", borrow, default)]
    payload: Option<&'a RawValue>,
}

impl Application {
    /// Sends a typed endpoint request.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call). Additionally returns
    /// [`PagoparError::InvalidInput`] if the endpoint does not serialize to a
    /// JSON object.
    pub async fn send<E: Endpoint>(&self, endpoint: &E) -> Result<E::Response> {
        let spec = CallSpec {
            method: E::METHOD,
            path: Cow::Borrowed(E::PATH),
            seed: endpoint.seed(),
            payload: to_payload(endpoint)?,
            fields: E::CREDENTIALS,
        };
        self.call(spec).await
    }

    /// Executes one authenticated call and decodes `resultado` into `T`.
    ///
    /// # Errors
    ///
    /// - [`PagoparError::UnsupportedMethod`] or [`PagoparError::InvalidQuery`]
    ///   before any network activity
    /// - [`PagoparError::InvalidInput`] for a path that escapes the API base
    /// - [`PagoparError::Transport`] on network failure, or an HTTP error
    ///   status with an undecodable body
    /// - [`PagoparError::Protocol`] when the envelope or payload has the wrong
    ///   shape
    /// - [`PagoparError::Rejected`] when the service answers `respuesta: false`
    #[instrument(
        skip(self, spec),
        fields(app = %self.name(), method = %spec.method, path = %spec.path)
    )]
    pub async fn call<T: DeserializeOwned>(&self, spec: CallSpec<'_>) -> Result<T> {
        let CallSpec { method, path, seed, mut payload, fields } = spec;

        let encoding = Encoding::for_method(&method)?;
        let mut url = endpoint_url(self.api_base(), &path)?;

        payload.insert(fields.token.to_owned(), Value::String(self.sign(&seed)));
        payload.insert(fields.public_key.to_owned(), Value::String(self.public_token().to_owned()));

        let body = match encoding {
            Encoding::Query => {
                append_query(&mut url, &payload)?;
                None
            }
            Encoding::Json => Some(serde_json::to_vec(&payload).map_err(|e| {
                PagoparError::InvalidInput(format!("cannot serialize payload: {e}"))
            })?),
        };

        let session = self.session()?;
        let mut request = session.request(method, url);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(body);
        }

        let transport_error = |source| PagoparError::Transport { path: path.to_string(), source };
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let status_error = response.error_for_status_ref().err();
        let bytes = response.bytes().await.map_err(transport_error)?;
        debug!(%status, len = bytes.len(), "response received");

        decode_envelope(&path, &bytes, status_error)
    }
}

impl Registry {
    /// Resolves `app` (see [`Registry::resolve`]) and sends `endpoint` with it.
    ///
    /// # Errors
    ///
    /// Resolution errors, then everything [`Application::send`] returns.
    pub async fn send<E: Endpoint>(
        &self,
        app: Option<&std::sync::Arc<Application>>,
        endpoint: &E,
    ) -> Result<E::Response> {
        self.resolve(app)?.send(endpoint).await
    }

    /// Resolves `app` and executes an untyped call with it.
    ///
    /// # Errors
    ///
    /// Resolution errors, then everything [`Application::call`] returns.
    pub async fn call<T: DeserializeOwned>(
        &self,
        app: Option<&std::sync::Arc<Application>>,
        spec: CallSpec<'_>,
    ) -> Result<T> {
        self.resolve(app)?.call(spec).await
    }
}

/// Serializes a request value into a payload map.
pub(crate) fn to_payload<S: Serialize + ?Sized>(value: &S) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(PagoparError::InvalidInput("request payload must be a JSON object".to_owned())),
        Err(e) => Err(PagoparError::InvalidInput(format!("cannot serialize payload: {e}"))),
    }
}

/// First element of a list-shaped `resultado`.
pub(crate) fn first_entry<T>(path: &str, entries: Vec<T>) -> Result<T> {
    entries.into_iter().next().ok_or_else(|| PagoparError::Protocol {
        path: path.to_owned(),
        reason: "expected a non-empty result list".to_owned(),
    })
}

/// Joins `path` to the API base, refusing anything that could leave it.
fn endpoint_url(base: &Url, path: &str) -> Result<Url> {
    if path.is_empty()
        || path.starts_with('/')
        || path.contains("..")
        || path.contains("//")
        || path.contains(['?', '#', '\\'])
    {
        return Err(PagoparError::InvalidInput(format!("invalid endpoint path '{path}'")));
    }
    base.join(path).map_err(|e| PagoparError::InvalidInput(format!("invalid endpoint path '{path}': {e}")))
}

/// Appends the payload as query pairs. Fields must be scalars or lists of
/// scalars; nulls are dropped.
fn append_query(url: &mut Url, payload: &Map<String, Value>) -> Result<()> {
    let mut pairs = Vec::with_capacity(payload.len());
    for (key, value) in payload {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item, key)? {
                        pairs.push((key.as_str(), text));
                    }
                }
            }
            scalar => {
                if let Some(text) = scalar_text(scalar, key)? {
                    pairs.push((key.as_str(), text));
                }
            }
        }
    }

    let mut query = url.query_pairs_mut();
    for (key, text) in pairs {
        query.append_pair(key, &text);
    }
    drop(query);
    Ok(())
}

fn scalar_text(value: &Value, field: &str) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(PagoparError::InvalidQuery { field: field.to_owned() }),
    }
}

fn decode_envelope<T: DeserializeOwned>(
    path: &str,
    body: &[u8],
    status_error: Option<reqwest::Error>,
) -> Result<T> {
    let envelope: RawEnvelope<'_> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Err(match status_error {
                Some(source) => PagoparError::Transport { path: path.to_owned(), source },
                None => PagoparError::Protocol { path: path.to_owned(), reason: format!("malformed envelope: {e}") },
            });
        }
    };

    let raw = envelope.payload.map_or("null", RawValue::get);
    if !envelope.success {
        let message = match serde_json::from_str::<String>(raw) {
            Ok(text) => text,
            Err(_) if envelope.payload.is_none() => String::new(),
            Err(_) => raw.to_owned(),
        };
        let err = PagoparError::rejected(message);
        warn!(path, error = %err, "request rejected");
        return Err(err);
    }

    serde_json::from_str(raw)
        .map_err(|e| PagoparError::Protocol { path: path.to_owned(), reason: format!("unexpected payload: {e}") })
}
