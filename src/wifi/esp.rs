//! ESP-IDF radio driver glue.
//!
//! One [`EspRadio`] owns the Wi-Fi peripheral and implements both the
//! station and access-point capabilities. The device state machine only
//! ever uses one role per boot, which matches the hardware constraint
//! that AP and STA cannot run with independent state simultaneously.

use super::{AccessPoint, RadioError, StationRadio, AP_LOCAL_ADDR, AP_SUBNET_PREFIX};
use embedded_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration,
};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::ipv4::{
    Configuration as IpConfiguration, Mask, RouterConfiguration, Subnet,
};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
use esp_idf_svc::wifi::{EspWifi, WifiDeviceId};
use esp_idf_sys::EspError;
use log::info;

/// ESP32 Wi-Fi radio.
pub struct EspRadio<'a> {
    wifi: EspWifi<'a>,
}

impl<'a> EspRadio<'a> {
    /// Take ownership of the modem and initialize the driver.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop, None)?;
        Ok(Self { wifi })
    }

    /// The device's hardware (link-layer) address rendered as text.
    ///
    /// Used as the provisioning access point name; unique per device
    /// without any coordination.
    pub fn hardware_address(&self) -> Result<String, EspError> {
        let mac = self.wifi.driver().get_mac(WifiDeviceId::Ap)?;
        Ok(format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        ))
    }
}

impl From<EspError> for RadioError {
    fn from(e: EspError) -> Self {
        Self::Driver(format!("{:?}", e))
    }
}

impl<'a> StationRadio for EspRadio<'a> {
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| RadioError::InvalidName)?,
            password: password.try_into().map_err(|_| RadioError::InvalidSecret)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config)?;
        self.wifi.start()?;
        self.wifi.connect()?;
        info!("Station join initiated for {:?}", ssid);
        Ok(())
    }

    fn is_joined(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}

impl<'a> AccessPoint for EspRadio<'a> {
    fn start(&mut self, ssid: &str) -> Result<(), RadioError> {
        // Fixed provisioning subnet: the node is 192.168.1.1/24 and hands
        // out addresses via its own DHCP server.
        let netif_config = NetifConfiguration {
            ip_configuration: Some(IpConfiguration::Router(RouterConfiguration {
                subnet: Subnet {
                    gateway: AP_LOCAL_ADDR,
                    mask: Mask(AP_SUBNET_PREFIX),
                },
                dhcp_enabled: true,
                dns: None,
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };
        self.wifi.swap_netif_ap(EspNetif::new_with_conf(&netif_config)?)?;

        let config = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| RadioError::InvalidName)?,
            auth_method: AuthMethod::None,
            ..Default::default()
        });
        self.wifi.set_configuration(&config)?;
        self.wifi.start()?;
        info!("Access point {:?} up at {}", ssid, AP_LOCAL_ADDR);
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(e) = self.wifi.stop() {
            log::warn!("Failed to stop access point: {:?}", e);
        }
    }
}
