use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::auth::{Authenticator, ensure_trailing_slash};
use crate::common::{self, NewEreignis, format_api_date};
use crate::error::{Result, SmartmeterError};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const AUTH_URL: &str = "https://log.wien/auth/realms/logwien/protocol/openid-connect/";
pub const API_URL_WSTW: &str = "https://api.wstw.at/gateway/WN_SMART_METER_PORTAL_API_B2C/1.0/";
pub const API_URL_WN: &str = "https://service.wienernetze.at/rest/smp/1.0/";

/// Header and key the API gateway in front of [`API_URL_WSTW`] expects.
const GATEWAY_KEY_HEADER: &str = "X-Gateway-APIKey";
const GATEWAY_KEY: &str = "afb0be74-6455-44f5-a34d-6994223020ba";

/// Base URLs of the identity provider and the two data APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub api_url_wstw: String,
    pub api_url_wn: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: AUTH_URL.into(),
            api_url_wstw: API_URL_WSTW.into(),
            api_url_wn: API_URL_WN.into(),
        }
    }
}

/// Configuration for the smart meter client.
#[derive(Clone)]
pub struct SmartmeterConfig {
    pub username: String,
    pub password: Zeroizing<String>,
    pub timeout: Duration,
    pub endpoints: Endpoints,
}

impl fmt::Debug for SmartmeterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartmeterConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl SmartmeterConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            timeout: DEFAULT_TIMEOUT,
            endpoints: Endpoints::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let username = std::env::var("SMARTMETER_USERNAME")
            .map_err(|_| SmartmeterError::Config("SMARTMETER_USERNAME env var not set".into()))?;
        let password = std::env::var("SMARTMETER_PASSWORD")
            .map_err(|_| SmartmeterError::Config("SMARTMETER_PASSWORD env var not set".into()))?;
        let mut config = Self::new(username, password);
        if let Ok(secs) = std::env::var("SMARTMETER_TIMEOUT_SECS") {
            config.timeout = parse_timeout_secs(&secs)?;
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            SmartmeterError::Config(format!(
                "SMARTMETER_TIMEOUT_SECS must be a positive integer, got {raw:?}"
            ))
        })
}

/// Which of the two data APIs a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiHost {
    /// `api.wstw.at` gateway; needs the gateway API key.
    Wstw,
    /// `service.wienernetze.at`.
    Wn,
}

/// One call to a data API, kept around so it can be replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub host: ApiHost,
    pub endpoint: String,
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(&'static str, String)>,
}

impl ApiCall {
    pub fn new(host: ApiHost, method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            host,
            endpoint: endpoint.into(),
            method,
            body: None,
            query: Vec::new(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(ApiHost::Wstw, Method::GET, endpoint)
    }

    pub fn host(mut self, host: ApiHost) -> Self {
        self.host = host;
        self
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Append `query` to `base` + `endpoint`, continuing an existing query string
/// if the endpoint already has one.
pub fn compose_url(base: &str, endpoint: &str, query: &[(&str, String)]) -> String {
    let mut url = format!("{base}{endpoint}");
    if !query.is_empty() {
        let encoded = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.push(if endpoint.contains('?') { '&' } else { '?' });
        url.push_str(&encoded);
    }
    url
}

struct AccessToken {
    value: Zeroizing<String>,
    /// Bumped on every successful authentication.
    generation: u64,
}

/// Async client for the smart meter portal API.
///
/// The access token lives only in memory. It is obtained on first use (or via
/// [`Smartmeter::login`]) and renewed transparently when a call comes back 401.
pub struct Smartmeter {
    config: SmartmeterConfig,
    transport: Arc<dyn HttpTransport>,
    authenticator: Authenticator,
    wstw_url: String,
    wn_url: String,
    token: RwLock<Option<AccessToken>>,
    refresh_lock: Mutex<()>,
    customer_id: OnceCell<String>,
}

impl Smartmeter {
    pub fn new(config: SmartmeterConfig) -> Result<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a client on a caller-supplied transport, e.g. to share
    /// connections or cookies with other code.
    pub fn with_transport(config: SmartmeterConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let authenticator = Authenticator::new(
            Arc::clone(&transport),
            &config.endpoints.auth_url,
            config.timeout,
        );
        Self {
            wstw_url: ensure_trailing_slash(&config.endpoints.api_url_wstw),
            wn_url: ensure_trailing_slash(&config.endpoints.api_url_wn),
            config,
            transport,
            authenticator,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            customer_id: OnceCell::new(),
        }
    }

    /// Build a client and log in right away.
    pub async fn connect(config: SmartmeterConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.login().await?;
        Ok(client)
    }

    pub fn config(&self) -> &SmartmeterConfig {
        &self.config
    }

    /// Run the login flow now, replacing any token held.
    pub async fn login(&self) -> Result<()> {
        let generation = self.token_generation().await;
        self.refresh(generation).await?;
        Ok(())
    }

    /// Alias of [`Smartmeter::login`].
    pub async fn refresh_token(&self) -> Result<()> {
        self.login().await
    }

    /// Whether a token is currently held. Says nothing about its validity.
    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    // ── Token handling ──

    async fn token_generation(&self) -> u64 {
        self.token.read().await.as_ref().map_or(0, |t| t.generation)
    }

    /// The token to send, logging in first if none is held yet.
    async fn current_token(&self) -> Result<(Zeroizing<String>, u64)> {
        {
            let token = self.token.read().await;
            if let Some(ref t) = *token {
                return Ok((t.value.clone(), t.generation));
            }
        }
        self.refresh(0).await
    }

    /// Replace the token of generation `stale`.
    ///
    /// Refreshes are serialized. If another caller already replaced `stale`
    /// while we waited for the lock, its token is returned instead of logging
    /// in again.
    async fn refresh(&self, stale: u64) -> Result<(Zeroizing<String>, u64)> {
        let _guard = self.refresh_lock.lock().await;
        {
            let token = self.token.read().await;
            if let Some(ref t) = *token {
                if t.generation != stale {
                    debug!(generation = t.generation, "token already refreshed");
                    return Ok((t.value.clone(), t.generation));
                }
            }
        }

        let value = Zeroizing::new(
            self.authenticator
                .authenticate(&self.config.username, &self.config.password)
                .await?,
        );
        let mut token = self.token.write().await;
        let generation = token.as_ref().map_or(0, |t| t.generation) + 1;
        *token = Some(AccessToken {
            value: value.clone(),
            generation,
        });
        Ok((value, generation))
    }

    // ── Dispatch ──

    fn build_request(&self, call: &ApiCall, token: &str) -> HttpRequest {
        let base = match call.host {
            ApiHost::Wstw => &self.wstw_url,
            ApiHost::Wn => &self.wn_url,
        };
        let url = compose_url(base, &call.endpoint, &call.query);
        debug!(method = %call.method, url = %url, "REQUEST");

        let mut request = HttpRequest::new(call.method.clone(), url)
            .header("Authorization", format!("Bearer {token}"))
            .timeout(self.config.timeout);
        if call.host == ApiHost::Wstw {
            request = request.header(GATEWAY_KEY_HEADER, GATEWAY_KEY);
        }
        if let Some(ref body) = call.body {
            debug!(data = %body, "DATA");
            request = request.json(body.clone());
        }
        request
    }

    /// Send `call`, re-authenticating and retrying once on 401.
    pub async fn send(&self, call: &ApiCall) -> Result<HttpResponse> {
        let (token, generation) = self.current_token().await?;
        let resp = self.transport.send(self.build_request(call, &token)).await?;
        if resp.status != 401 {
            return Ok(resp);
        }

        warn!(endpoint = %call.endpoint, "access token rejected, re-authenticating");
        let (token, _) = self.refresh(generation).await?;
        let request = self.build_request(call, &token);
        let url = request.url.clone();
        let resp = self.transport.send(request).await?;
        if resp.status == 401 {
            return Err(SmartmeterError::Unauthorized { url });
        }
        Ok(resp)
    }

    /// Send `call` and parse the body as JSON.
    pub async fn request(&self, call: &ApiCall) -> Result<Value> {
        let resp = self.send(call).await?;
        check_response(resp)
    }

    // ── Meters ──

    /// Meters of the account, grouped by customer.
    pub async fn zaehlpunkte(&self) -> Result<Value> {
        self.request(&ApiCall::get("zaehlpunkte")).await
    }

    /// First meter of the first group. Fetches the meter list every time.
    pub async fn first_zaehlpunkt(&self) -> Result<String> {
        common::first_zaehlpunkt(&self.zaehlpunkte().await?)
    }

    pub async fn base_information(&self) -> Result<Value> {
        self.request(&ApiCall::get("zaehlpunkt/baseInformation")).await
    }

    pub async fn consumptions(&self) -> Result<Value> {
        self.request(&ApiCall::get("zaehlpunkt/consumptions")).await
    }

    pub async fn pmax_readings(&self) -> Result<Value> {
        self.request(&ApiCall::get("zaehlpunkt/pmaxReadings")).await
    }

    pub async fn meter_readings(&self) -> Result<Value> {
        self.request(&ApiCall::get("zaehlpunkt/meterReadings")).await
    }

    pub async fn welcome(&self) -> Result<Value> {
        self.request(&ApiCall::get("zaehlpunkt/default/welcome")).await
    }

    // ── Consumption ──

    /// Daily energy usage between `date_from` and `date_to` (default: now, UTC).
    ///
    /// Dates are sent as-is with a `Z` suffix, so pass UTC wall-clock times.
    /// Without `zaehlpunkt`, the first meter of the account is used.
    pub async fn verbrauch_raw(
        &self,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
        zaehlpunkt: Option<&str>,
    ) -> Result<Value> {
        let (endpoint, date_to) = self
            .messdaten_endpoint("verbrauchRaw", date_to, zaehlpunkt)
            .await?;
        let call = ApiCall::get(endpoint)
            .query("dateFrom", format_api_date(&date_from))
            .query("dateTo", format_api_date(&date_to))
            .query("granularity", "DAY");
        self.request(&call).await
    }

    /// Energy usage in quarter-hour resolution. Same arguments as
    /// [`Smartmeter::verbrauch_raw`].
    pub async fn verbrauch(
        &self,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
        zaehlpunkt: Option<&str>,
    ) -> Result<Value> {
        let (endpoint, date_to) = self
            .messdaten_endpoint("verbrauch", date_to, zaehlpunkt)
            .await?;
        let call = ApiCall::get(endpoint)
            .query("dateFrom", format_api_date(&date_from))
            .query("dateTo", format_api_date(&date_to))
            .query("period", "DAY")
            .query("accumulate", "false")
            .query("offset", "0")
            .query("dayViewResolution", "QUARTER-HOUR");
        self.request(&call).await
    }

    async fn messdaten_endpoint(
        &self,
        kind: &str,
        date_to: Option<NaiveDateTime>,
        zaehlpunkt: Option<&str>,
    ) -> Result<(String, NaiveDateTime)> {
        let date_to = date_to.unwrap_or_else(|| Utc::now().naive_utc());
        let zaehlpunkt = self.resolve_zaehlpunkt(zaehlpunkt).await?;
        let customer = self.customer_id().await?;
        Ok((format!("messdaten/{customer}/{zaehlpunkt}/{kind}"), date_to))
    }

    async fn resolve_zaehlpunkt(&self, zaehlpunkt: Option<&str>) -> Result<String> {
        match zaehlpunkt {
            Some(zp) => Ok(zp.to_string()),
            None => self.first_zaehlpunkt().await,
        }
    }

    // ── Profile ──

    /// Profile of the logged-in user.
    pub async fn profil(&self) -> Result<Value> {
        self.request(&ApiCall::get("w/user/profile").host(ApiHost::Wn)).await
    }

    /// Customer id (`geschaeftspartner`) of the account.
    ///
    /// Fetched from the profile on first use and kept for the lifetime of the
    /// client.
    pub async fn customer_id(&self) -> Result<String> {
        self.customer_id
            .get_or_try_init(|| async { common::customer_id(&self.profil().await?) })
            .await
            .cloned()
    }

    // ── Events ──

    /// Events of a meter between `date_from` and `date_to` (default: now, UTC).
    pub async fn ereignisse(
        &self,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
        zaehlpunkt: Option<&str>,
    ) -> Result<Value> {
        let date_to = date_to.unwrap_or_else(|| Utc::now().naive_utc());
        let zaehlpunkt = self.resolve_zaehlpunkt(zaehlpunkt).await?;
        let call = ApiCall::get("w/user/ereignisse")
            .host(ApiHost::Wn)
            .query("zaehlpunkt", zaehlpunkt)
            .query("dateFrom", format_api_date(&date_from))
            .query("dateUntil", format_api_date(&date_to));
        self.request(&call).await
    }

    /// Create an event. Without `date_to` it is a point in time, otherwise a span.
    pub async fn create_ereignis(
        &self,
        zaehlpunkt: &str,
        name: &str,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
    ) -> Result<Value> {
        let body = NewEreignis::new(zaehlpunkt, name, &date_from, date_to.as_ref());
        let call = ApiCall::new(ApiHost::Wn, Method::POST, "w/user/ereignis")
            .body(serde_json::to_value(&body)?);
        self.request(&call).await
    }

    pub async fn delete_ereignis(&self, ereignis_id: &str) -> Result<()> {
        let call = ApiCall::new(
            ApiHost::Wn,
            Method::DELETE,
            format!("w/user/ereignis/{}", urlencoding::encode(ereignis_id)),
        );
        let resp = self.send(&call).await?;
        check_status(&resp)
    }
}

fn check_status(resp: &HttpResponse) -> Result<()> {
    if resp.is_success() {
        return Ok(());
    }
    if resp.status == 404 {
        return Err(SmartmeterError::NotFound(resp.body.clone()));
    }
    Err(SmartmeterError::Api {
        status: resp.status,
        detail: resp.body.clone(),
    })
}

fn check_response(resp: HttpResponse) -> Result<Value> {
    check_status(&resp)?;
    resp.json()
}
