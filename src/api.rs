use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::certificates::{Certificate, CertificateCreate};
use crate::http::{ApiError, ApplianceClient};
use crate::services::Service;
use crate::version::AppPath;

/// Appliance REST operations used by a certificate rotation.
pub trait ApplianceApi {
    /// `GET system/state`, used as a connectivity probe.
    fn system_state(&self) -> Result<Value, ApiError>;
    fn system_version(&self) -> Result<String, ApiError>;
    fn certificate_choices(&self, app_path: AppPath) -> Result<Vec<Certificate>, ApiError>;
    fn create_certificate(&self, request: &CertificateCreate) -> Result<(), ApiError>;
    /// Installed UI certificates keyed by id.
    fn ui_certificate_choices(&self) -> Result<BTreeMap<String, String>, ApiError>;
    fn set_ui_certificate(&self, certificate_id: &str) -> Result<(), ApiError>;
    fn list_services(&self, app_path: AppPath) -> Result<Vec<Service>, ApiError>;
    fn update_service(
        &self,
        app_path: AppPath,
        service_id: &str,
        payload: &Value,
    ) -> Result<(), ApiError>;
    fn delete_certificate(&self, certificate_id: &str) -> Result<(), ApiError>;
    fn restart_ui(&self) -> Result<(), ApiError>;
}

impl ApplianceApi for ApplianceClient {
    fn system_state(&self) -> Result<Value, ApiError> {
        self.get_json("system/state")
    }

    fn system_version(&self) -> Result<String, ApiError> {
        self.get_json("system/version")
    }

    fn certificate_choices(&self, app_path: AppPath) -> Result<Vec<Certificate>, ApiError> {
        self.get_json(&format!("{app_path}/certificate_choices"))
    }

    fn create_certificate(&self, request: &CertificateCreate) -> Result<(), ApiError> {
        self.post_json("certificate", request)
    }

    fn ui_certificate_choices(&self) -> Result<BTreeMap<String, String>, ApiError> {
        self.get_json("system/general/ui_certificate_choices")
    }

    fn set_ui_certificate(&self, certificate_id: &str) -> Result<(), ApiError> {
        self.put_json("system/general", &json!({ "ui_certificate": certificate_id }))
    }

    fn list_services(&self, app_path: AppPath) -> Result<Vec<Service>, ApiError> {
        self.get_json(app_path.as_str())
    }

    fn update_service(
        &self,
        app_path: AppPath,
        service_id: &str,
        payload: &Value,
    ) -> Result<(), ApiError> {
        self.put_json(&format!("{app_path}/id/{service_id}"), payload)
    }

    fn delete_certificate(&self, certificate_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("certificate/id/{certificate_id}"))
    }

    fn restart_ui(&self) -> Result<(), ApiError> {
        self.get("system/general/ui_restart")
    }
}
