use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::{Result, SmartmeterError};
use crate::transport::{HttpRequest, HttpTransport};

/// OIDC client registered with the identity provider for the smart meter portal.
pub const OAUTH_CLIENT_ID: &str = "wn-smartmeter";

/// Redirect URI registered for [`OAUTH_CLIENT_ID`].
pub const OAUTH_REDIRECT_URI: &str = "https://www.wienernetze.at/wnapp/smapp/";

/// Query string of the login page request. The provider rejects anything else.
const LOGIN_ARGS: [(&str, &str); 7] = [
    ("client_id", OAUTH_CLIENT_ID),
    ("redirect_uri", OAUTH_REDIRECT_URI),
    ("response_mode", "fragment"),
    ("response_type", "code"),
    ("scope", "openid"),
    ("nonce", ""),
    ("prompt", "login"),
];

/// Response from POST `token`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Runs the browser login flow of the identity provider:
/// fetch the login form, post credentials to it, pick the authorization code
/// out of the redirect and trade it for an access token.
pub struct Authenticator {
    transport: Arc<dyn HttpTransport>,
    auth_url: String,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(transport: Arc<dyn HttpTransport>, auth_url: &str, timeout: Duration) -> Self {
        Self {
            transport,
            auth_url: ensure_trailing_slash(auth_url),
            timeout,
        }
    }

    /// URL of the login page, including the fixed OIDC parameters.
    pub fn login_url(&self) -> String {
        let query = LOGIN_ARGS
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}auth?{query}", self.auth_url)
    }

    /// Perform the whole flow and return a fresh access token.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &Zeroizing<String>,
    ) -> Result<String> {
        let action = self.login_action().await?;
        let code = self.authorization_code(&action, username, password).await?;
        let token = self.exchange_code(&code).await?;
        info!("Successfully authenticated smart meter API");
        Ok(token)
    }

    /// Fetch the login page and return where its form posts to.
    async fn login_action(&self) -> Result<String> {
        let url = self.login_url();
        debug!(url = %url, "fetching login form");
        let resp = self
            .transport
            .send(
                HttpRequest::new(Method::GET, url)
                    .follow_redirects(true)
                    .timeout(self.timeout),
            )
            .await?;
        parse_form_action(&resp.body)
    }

    /// Post the credentials and take the code from the redirect.
    async fn authorization_code(
        &self,
        action: &str,
        username: &str,
        password: &Zeroizing<String>,
    ) -> Result<String> {
        let resp = self
            .transport
            .send(
                HttpRequest::new(Method::POST, action)
                    .form(&[("username", username), ("password", password.as_str())])
                    .timeout(self.timeout),
            )
            .await?;

        // The provider re-renders the login page instead of redirecting when
        // the credentials are wrong.
        let Some(location) = resp.header("location") else {
            return Err(SmartmeterError::Login(
                "Authentication failed. Check user credentials.".into(),
            ));
        };
        extract_code(location)
    }

    async fn exchange_code(&self, code: &str) -> Result<String> {
        let resp = self
            .transport
            .send(
                HttpRequest::new(Method::POST, format!("{}token", self.auth_url))
                    .form(&[
                        ("code", code),
                        ("grant_type", "authorization_code"),
                        ("client_id", OAUTH_CLIENT_ID),
                        ("redirect_uri", OAUTH_REDIRECT_URI),
                    ])
                    .timeout(self.timeout),
            )
            .await?;

        if !resp.is_success() {
            return Err(SmartmeterError::Login(format!(
                "token exchange returned HTTP {}",
                resp.status
            )));
        }

        let token: TokenResponse = resp
            .json()
            .map_err(|e| SmartmeterError::Login(format!("unusable token response: {e}")))?;
        Ok(token.access_token)
    }
}

/// The `action` of the first `<form>` on the login page.
pub fn parse_form_action(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("form[action]")
        .map_err(|e| SmartmeterError::AuthFormParse(format!("{e:?}")))?;
    document
        .select(&selector)
        .next()
        .and_then(|form| form.value().attr("action"))
        .map(str::to_string)
        .ok_or_else(|| SmartmeterError::AuthFormParse("no form action on login page".into()))
}

/// Everything after the first `&code=` of the redirect location.
pub fn extract_code(location: &str) -> Result<String> {
    match location.split_once("&code=") {
        Some((_, code)) if !code.is_empty() => Ok(code.to_string()),
        _ => Err(SmartmeterError::Login(
            "redirect did not carry an authorization code".into(),
        )),
    }
}

pub(crate) fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReqwestTransport;

    #[test]
    fn login_url_carries_fixed_oidc_parameters() {
        let transport = Arc::new(ReqwestTransport::new().unwrap());
        let auth = Authenticator::new(
            transport,
            "https://log.wien/auth/realms/logwien/protocol/openid-connect",
            Duration::from_secs(10),
        );
        assert_eq!(
            auth.login_url(),
            "https://log.wien/auth/realms/logwien/protocol/openid-connect/auth?\
             client_id=wn-smartmeter\
             &redirect_uri=https%3A%2F%2Fwww.wienernetze.at%2Fwnapp%2Fsmapp%2F\
             &response_mode=fragment&response_type=code&scope=openid&nonce=&prompt=login"
        );
    }

    #[test]
    fn finds_form_action() {
        let html = r#"<html><body>
            <div id="kc-form">
              <form id="kc-form-login" action="https://log.wien/auth/realms/logwien/login-actions/authenticate?session_code=abc&amp;execution=e1" method="post">
                <input name="username"><input name="password" type="password">
              </form>
            </div></body></html>"#;
        assert_eq!(
            parse_form_action(html).unwrap(),
            "https://log.wien/auth/realms/logwien/login-actions/authenticate?session_code=abc&execution=e1"
        );
    }

    #[test]
    fn missing_form_is_parse_error() {
        for html in ["<html><body>Maintenance</body></html>", "<form method=post></form>", ""] {
            assert!(matches!(
                parse_form_action(html),
                Err(SmartmeterError::AuthFormParse(_))
            ));
        }
    }

    #[test]
    fn code_is_taken_after_first_marker() {
        let location =
            "https://www.wienernetze.at/wnapp/smapp/#state=&session_state=s1&code=abc.def&code=zzz";
        assert_eq!(extract_code(location).unwrap(), "abc.def&code=zzz");
    }

    #[test]
    fn location_without_code_is_login_error() {
        assert!(matches!(
            extract_code("https://www.wienernetze.at/wnapp/smapp/#error=access_denied"),
            Err(SmartmeterError::Login(_))
        ));
    }
}
