//! Notification sink for the Fibaro home center.
//!
//! The bridge reflects playback changes back into the Fibaro GUI by calling
//! virtual-device actions over authenticated HTTP GET: a text label showing
//! what is playing and a volume slider. Failures here are advisory; the
//! audio command that triggered the update has already succeeded.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};

/// Label element id on the virtual device
pub const LABEL_ID: &str = "label";

/// Slider element id on the virtual device
pub const SLIDER_ID: &str = "slider";

/// An authenticated GET client for Fibaro virtual-device actions.
#[derive(Debug, Clone)]
pub struct FibaroClient {
    agent: ureq::Agent,
    host: String,
    authorization: String,
}

impl FibaroClient {
    pub fn new(host: impl Into<String>, user: &str, password: &str) -> Self {
        let credentials = BASE64.encode(format!("{user}:{password}"));
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(5))
                .timeout_read(Duration::from_secs(10))
                .build(),
            host: host.into(),
            authorization: format!("Basic {credentials}"),
        }
    }

    /// Move the volume slider of a virtual device.
    pub fn set_volume_slider(&self, virtual_device_id: &str, _slider_id: &str, volume: u8) -> bool {
        self.call_action(virtual_device_id, "setSlider", "3", &volume.to_string())
    }

    /// Set the text of a virtual-device label.
    pub fn set_text_label(&self, virtual_device_id: &str, label_id: &str, text: &str) -> bool {
        self.call_action(
            virtual_device_id,
            "setProperty",
            &format!("ui.{label_id}.value"),
            text,
        )
    }

    fn call_action(&self, device_id: &str, name: &str, arg1: &str, arg2: &str) -> bool {
        let encoded: String = url::form_urlencoded::byte_serialize(arg2.as_bytes()).collect();
        let url = format!(
            "http://{}/api/callAction?deviceID={device_id}&name={name}&arg1={arg1}&arg2={encoded}",
            self.host
        );
        debug!(%url, "sending Fibaro command");
        match self.agent.get(&url).set("Authorization", &self.authorization).call() {
            // Fibaro acknowledges queued actions with 202 Accepted
            Ok(response) => response.status() == 202,
            Err(err) => {
                warn!(%url, error = %err, "error while sending Fibaro command");
                false
            }
        }
    }
}
