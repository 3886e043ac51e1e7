//! Fake identity provider and data APIs on a wiremock server.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::json;
use smartmeter_api::SmartmeterConfig;
use smartmeter_api::client::Endpoints;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "demouser";
pub const PASSWORD: &str = "Demouser123";
pub const CODE: &str = "c0de.4uth";
pub const CUSTOMER_ID: &str = "1200123456";
pub const ZAEHLPUNKT: &str = "AT0010000000000000001000004392265";

pub fn config(server: &MockServer) -> SmartmeterConfig {
    SmartmeterConfig::new(USERNAME, PASSWORD)
        .with_timeout(Duration::from_secs(5))
        .with_endpoints(Endpoints {
            auth_url: format!("{}/auth/", server.uri()),
            api_url_wstw: format!("{}/wstw/", server.uri()),
            api_url_wn: format!("{}/wn/", server.uri()),
        })
}

pub fn login_page(server: &MockServer) -> String {
    format!(
        r#"<!DOCTYPE html><html><body>
        <form id="kc-form-login" action="{}/auth/login-actions/authenticate?session_code=abc&amp;tab_id=t1" method="post">
          <input id="username" name="username" type="text">
          <input id="password" name="password" type="password">
          <input type="submit" value="Anmelden">
        </form></body></html>"#,
        server.uri()
    )
}

/// Login page and credential form accepting [`USERNAME`] / [`PASSWORD`].
pub async fn mount_login_form(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/auth/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page(server)))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/login-actions/authenticate"))
        .and(body_string_contains(format!("username={USERNAME}")))
        .and(body_string_contains(format!("password={PASSWORD}")))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!("https://www.wienernetze.at/wnapp/smapp/#state=&session_state=s1&code={CODE}"),
        ))
        .mount(server)
        .await;
}

pub fn token_endpoint(access_token: &str) -> Mock {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("client_id=wn-smartmeter"))
        .and(body_string_contains(format!("code={CODE}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "expires_in": 300,
            "token_type": "Bearer",
        })))
}

/// Full login flow handing out `access_token`, expected `times` times.
pub async fn mount_login(server: &MockServer, access_token: &str, times: u64) {
    mount_login_form(server).await;
    token_endpoint(access_token)
        .expect(times)
        .mount(server)
        .await;
}

pub fn zaehlpunkte_body() -> serde_json::Value {
    json!([
        {
            "geschaeftspartner": CUSTOMER_ID,
            "zaehlpunkte": [
                {"zaehlpunktnummer": ZAEHLPUNKT, "customLabel": "Wohnung"},
                {"zaehlpunktnummer": "AT0010000000000000001000004392266"}
            ]
        }
    ])
}

pub fn profile_body() -> serde_json::Value {
    json!({
        "email": "demo@example.com",
        "defaultGeschaeftspartnerRegistration": {
            "geschaeftspartner": CUSTOMER_ID,
            "zaehlpunkt": ZAEHLPUNKT
        }
    })
}
