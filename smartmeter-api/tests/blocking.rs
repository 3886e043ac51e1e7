mod support;

use chrono::NaiveDate;
use smartmeter_api::SmartmeterError;
use smartmeter_api::blocking::Smartmeter;
use support::*;
use tokio::runtime::Runtime;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The mock server needs a runtime of its own; the blocking client must run
/// outside of it.
fn start_server() -> (Runtime, MockServer) {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    (rt, server)
}

#[test]
fn blocking_client_fetches_meters_and_profile() {
    let (rt, server) = start_server();
    rt.block_on(async {
        mount_login(&server, "token-1", 1).await;
        Mock::given(method("GET"))
            .and(path("/wstw/zaehlpunkte"))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zaehlpunkte_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wn/w/user/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
            .expect(1)
            .mount(&server)
            .await;
    });

    let client = Smartmeter::connect(config(&server)).unwrap();
    assert_eq!(client.first_zaehlpunkt().unwrap(), ZAEHLPUNKT);
    assert_eq!(client.customer_id().unwrap(), CUSTOMER_ID);
    // Cached, no second profile request.
    assert_eq!(client.customer_id().unwrap(), CUSTOMER_ID);

    drop(client);
    rt.block_on(server.verify());
}

#[test]
fn blocking_client_refreshes_on_401() {
    let (rt, server) = start_server();
    rt.block_on(async {
        mount_login_form(&server).await;
        token_endpoint("token-old")
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        token_endpoint("token-new").expect(1).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/wn/w/user/ereignisse"))
            .and(header("Authorization", "Bearer token-old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wn/w/user/ereignisse"))
            .and(header("Authorization", "Bearer token-new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
    });

    let client = Smartmeter::new(config(&server)).unwrap();
    client.login().unwrap();
    let from = NaiveDate::from_ymd_opt(2021, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let events = client.ereignisse(from, None, Some(ZAEHLPUNKT)).unwrap();
    assert_eq!(events, serde_json::json!([]));

    drop(client);
    rt.block_on(server.verify());
}

#[test]
fn blocking_client_surfaces_login_error() {
    let (rt, server) = start_server();
    rt.block_on(async {
        Mock::given(method("GET"))
            .and(path("/auth/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_string(login_page(&server)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/login-actions/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(login_page(&server)))
            .mount(&server)
            .await;
    });

    let err = Smartmeter::connect(config(&server)).err().unwrap();
    assert!(matches!(err, SmartmeterError::Login(_)), "{err:?}");
}
