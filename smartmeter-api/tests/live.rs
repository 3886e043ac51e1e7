//! Checks against the real portal with the public demo account.
//!
//! Run with `SMARTMETER_USERNAME=... SMARTMETER_PASSWORD=... cargo test -- --ignored`.

use chrono::NaiveDate;
use smartmeter_api::{Smartmeter, SmartmeterConfig};

async fn client() -> Smartmeter {
    let config = SmartmeterConfig::from_env().unwrap();
    Smartmeter::connect(config).await.unwrap()
}

#[tokio::test]
#[ignore = "talks to the live portal"]
async fn confirm_login() {
    let client = client().await;
    let profile = client.profil().await.unwrap();
    assert!(!profile.as_object().unwrap().is_empty());
}

#[tokio::test]
#[ignore = "talks to the live portal"]
async fn zaehlpunkte_exist() {
    let client = client().await;
    let zp = client.zaehlpunkte().await.unwrap();
    assert!(!zp.as_array().unwrap().is_empty());
    assert!(!zp[0]["zaehlpunkte"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[ignore = "talks to the live portal"]
async fn ereignisse_exist() {
    let client = client().await;
    let from = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let to = NaiveDate::from_ymd_opt(2021, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let events = client.ereignisse(from, Some(to), None).await.unwrap();
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["name"], "Wäsche waschen");
}
