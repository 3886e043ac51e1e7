//! Blocking client.
//!
//! Same operations as [`crate::client::Smartmeter`], each one blocking the
//! calling thread until it completes. The async client is driven on a private
//! single-threaded runtime, so this type must not be used from within an
//! async context.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;
use tokio::runtime::Runtime;

use crate::client::{self, ApiCall, SmartmeterConfig};
use crate::error::Result;
use crate::transport::{HttpResponse, HttpTransport};

pub struct Smartmeter {
    inner: client::Smartmeter,
    runtime: Runtime,
}

impl Smartmeter {
    /// Build a client without logging in. The first call will.
    pub fn new(config: SmartmeterConfig) -> Result<Self> {
        Ok(Self {
            inner: client::Smartmeter::new(config)?,
            runtime: runtime()?,
        })
    }

    pub fn with_transport(
        config: SmartmeterConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        Ok(Self {
            inner: client::Smartmeter::with_transport(config, transport),
            runtime: runtime()?,
        })
    }

    /// Build a client and log in right away.
    pub fn connect(config: SmartmeterConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.login()?;
        Ok(client)
    }

    /// The async client this one drives.
    pub fn as_async(&self) -> &client::Smartmeter {
        &self.inner
    }

    pub fn login(&self) -> Result<()> {
        self.runtime.block_on(self.inner.login())
    }

    pub fn refresh_token(&self) -> Result<()> {
        self.runtime.block_on(self.inner.refresh_token())
    }

    pub fn send(&self, call: &ApiCall) -> Result<HttpResponse> {
        self.runtime.block_on(self.inner.send(call))
    }

    pub fn request(&self, call: &ApiCall) -> Result<Value> {
        self.runtime.block_on(self.inner.request(call))
    }

    pub fn zaehlpunkte(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.zaehlpunkte())
    }

    pub fn first_zaehlpunkt(&self) -> Result<String> {
        self.runtime.block_on(self.inner.first_zaehlpunkt())
    }

    pub fn base_information(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.base_information())
    }

    pub fn consumptions(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.consumptions())
    }

    pub fn pmax_readings(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.pmax_readings())
    }

    pub fn meter_readings(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.meter_readings())
    }

    pub fn welcome(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.welcome())
    }

    pub fn verbrauch_raw(
        &self,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
        zaehlpunkt: Option<&str>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.verbrauch_raw(date_from, date_to, zaehlpunkt))
    }

    pub fn verbrauch(
        &self,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
        zaehlpunkt: Option<&str>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.verbrauch(date_from, date_to, zaehlpunkt))
    }

    pub fn profil(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.profil())
    }

    pub fn customer_id(&self) -> Result<String> {
        self.runtime.block_on(self.inner.customer_id())
    }

    pub fn ereignisse(
        &self,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
        zaehlpunkt: Option<&str>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.ereignisse(date_from, date_to, zaehlpunkt))
    }

    pub fn create_ereignis(
        &self,
        zaehlpunkt: &str,
        name: &str,
        date_from: NaiveDateTime,
        date_to: Option<NaiveDateTime>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.create_ereignis(zaehlpunkt, name, date_from, date_to))
    }

    pub fn delete_ereignis(&self, ereignis_id: &str) -> Result<()> {
        self.runtime.block_on(self.inner.delete_ereignis(ereignis_id))
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| crate::error::SmartmeterError::Config(format!("cannot start runtime: {e}")))
}
