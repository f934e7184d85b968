//! AWS IoT device-shadow state store
//!
//! Writes go through `UpdateThingShadow` with a `{"state":{"reported":...}}`
//! payload; the shadow service merges the reported attributes itself.
//!
//! # Prerequisites
//!
//! - AWS credentials configured (IAM role or access keys)
//! - Required IAM permissions: `iot:UpdateThingShadow`, `iot:GetThingShadow`
//! - `AWS_IOT_ENDPOINT` pointing at the account's data endpoint
//!   (`aws iot describe-endpoint --endpoint-type iot:Data-ATS`)

use async_trait::async_trait;
use aws_sdk_iotdataplane::primitives::Blob;
use aws_sdk_iotdataplane::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::StateStore;
use crate::error::{StoreError, StoreResult};

/// Reported state kept in AWS IoT thing shadows (thing name = device name)
#[derive(Clone)]
pub struct AwsShadowStore {
    client: Client,
}

impl AwsShadowStore {
    /// Build a client from the default AWS credential chain
    ///
    /// # Arguments
    ///
    /// * `endpoint` - IoT data-plane endpoint URL, if not the SDK default
    pub async fn connect(endpoint: Option<&str>) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let mut builder = aws_sdk_iotdataplane::config::Builder::from(&sdk_config);
        if let Some(url) = endpoint {
            builder = builder.endpoint_url(url);
        }

        info!(endpoint = ?endpoint, "AWS IoT shadow client ready");
        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl StateStore for AwsShadowStore {
    async fn update_reported(
        &self,
        device: &str,
        attributes: Map<String, Value>,
    ) -> StoreResult<()> {
        let payload = serde_json::to_vec(&json!({ "state": { "reported": attributes } }))?;

        self.client
            .update_thing_shadow()
            .thing_name(device)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| StoreError::backend(format!("UpdateThingShadow failed: {}", e)))?;

        debug!(device = device, "Thing shadow updated");
        Ok(())
    }

    async fn get_reported(&self, device: &str) -> StoreResult<Option<Map<String, Value>>> {
        let response = match self
            .client
            .get_thing_shadow()
            .thing_name(device)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(err) => {
                return Err(StoreError::backend(format!(
                    "GetThingShadow failed: {}",
                    err
                )))
            }
        };

        let Some(payload) = response.payload() else {
            return Ok(None);
        };

        let document: Value = serde_json::from_slice(payload.as_ref())?;
        Ok(document
            .get("state")
            .and_then(|state| state.get("reported"))
            .and_then(Value::as_object)
            .cloned())
    }
}
