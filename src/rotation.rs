use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate, Utc};
use log::{info, warn};

use crate::api::ApplianceApi;
use crate::certificates::{self, Certificate, CertificateCreate};
use crate::config::Config;
use crate::retry::poll_until;
use crate::services::certificate_dependents;
use crate::version::{AppPath, format_version, parse_version};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub name_prefix: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Pause between dependent steps while the appliance applies a change.
    pub settle_delay: Duration,
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
}

impl From<&Config> for RotationSettings {
    fn from(config: &Config) -> Self {
        Self {
            name_prefix: config.cert_name_prefix.clone(),
            cert_path: config.cert_file_path.clone(),
            key_path: config.cert_key_path.clone(),
            settle_delay: config.settle_delay(),
            ready_timeout: config.ready_timeout(),
            ready_interval: READY_POLL_INTERVAL,
        }
    }
}

/// Outcome of a completed rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub certificate_id: i64,
    pub certificate_name: String,
    pub uploaded: bool,
    pub services_updated: Vec<String>,
    pub services_skipped: Vec<String>,
    pub services_failed: Vec<String>,
    pub certificates_deleted: Vec<String>,
    pub certificates_failed: Vec<String>,
}

/// Drives one certificate rotation against an appliance.
///
/// Connectivity, version detection, upload and UI activation abort the run on
/// failure. Service updates and old certificate deletions are best effort: a
/// failing item is logged and recorded in the report.
pub struct Rotation<'a, A: ApplianceApi> {
    api: &'a A,
    settings: RotationSettings,
    today: NaiveDate,
}

impl<'a, A: ApplianceApi> Rotation<'a, A> {
    pub fn new(api: &'a A, settings: RotationSettings) -> Self {
        Self {
            api,
            settings,
            today: Local::now().date_naive(),
        }
    }

    /// Overrides the date used to derive the certificate name.
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn certificate_name(&self) -> String {
        certificates::certificate_name(&self.settings.name_prefix, self.today)
    }

    pub fn run(&self) -> Result<RotationReport> {
        let name = self.certificate_name();

        info!("[rotate] testing connection to appliance");
        self.api
            .system_state()
            .context("appliance connectivity check failed")?;

        let app_path = self.detect_app_path()?;

        let (certificate, uploaded) = self.ensure_certificate(app_path, &name)?;
        let certificate_id = certificate.id.to_string();

        let ui_certificates = self.activate_ui_certificate(&certificate_id)?;
        self.settle();

        let mut report = RotationReport {
            certificate_id: certificate.id,
            certificate_name: name,
            uploaded,
            ..RotationReport::default()
        };

        self.repoint_services(app_path, certificate.id, &mut report)?;
        info!("[rotate] certificate update completed");
        self.settle();

        self.delete_old_certificates(ui_certificates.keys(), &certificate_id, &mut report);
        self.settle();

        info!("[rotate] reloading web UI");
        self.api.restart_ui().context("failed to restart web UI")?;

        Ok(report)
    }

    fn detect_app_path(&self) -> Result<AppPath> {
        let raw = self
            .api
            .system_version()
            .context("failed to fetch appliance version")?;
        let version = parse_version(&raw).with_context(|| format!("unrecognised version {raw:?}"))?;
        let app_path = AppPath::for_version(&version);
        info!(
            "[rotate] detected TrueNAS {}, using app path {}",
            format_version(&version),
            app_path
        );
        Ok(app_path)
    }

    fn lookup(&self, app_path: AppPath, name: &str) -> Result<Option<Certificate>> {
        let listed = self
            .api
            .certificate_choices(app_path)
            .context("failed to list certificates")?;
        Ok(certificates::find_by_name(&listed, name).cloned())
    }

    /// Uploads today's certificate unless one with the same name exists, and
    /// returns it with a flag telling whether an upload happened.
    fn ensure_certificate(&self, app_path: AppPath, name: &str) -> Result<(Certificate, bool)> {
        if let Some(existing) = self.lookup(app_path, name)? {
            info!(
                "[rotate] certificate {} already present (id {}), skipping upload",
                name, existing.id
            );
            return Ok((existing, false));
        }

        info!("[rotate] uploading certificate {}", name);
        let material = certificates::load_material(
            &self.settings.cert_path,
            &self.settings.key_path,
            Utc::now(),
        )?;
        self.api
            .create_certificate(&CertificateCreate::imported(name, material))
            .with_context(|| format!("failed to create certificate {name}"))?;
        info!("[rotate] new certificate {} created", name);

        self.settle();
        let certificate = poll_until(
            &format!("certificate {name}"),
            self.settings.ready_timeout,
            self.settings.ready_interval,
            || self.lookup(app_path, name),
        )?;
        Ok((certificate, true))
    }

    fn activate_ui_certificate(
        &self,
        certificate_id: &str,
    ) -> Result<BTreeMap<String, String>> {
        info!("[rotate] fetching installed UI certificates");
        let ui_certificates = self
            .api
            .ui_certificate_choices()
            .context("failed to list UI certificates")?;
        if !ui_certificates.contains_key(certificate_id) {
            return Err(anyhow!(
                "certificate {certificate_id} is not offered as a UI certificate"
            ));
        }

        info!("[rotate] activating new certificate {}", certificate_id);
        self.api
            .set_ui_certificate(certificate_id)
            .with_context(|| format!("failed to activate UI certificate {certificate_id}"))?;
        Ok(ui_certificates)
    }

    fn repoint_services(
        &self,
        app_path: AppPath,
        certificate_id: i64,
        report: &mut RotationReport,
    ) -> Result<()> {
        let services = certificate_dependents(
            self.api
                .list_services(app_path)
                .context("failed to list applications")?,
        );

        for service in &services {
            info!(
                "[rotate] service {} ({}) uses certificates {}",
                service.id,
                service.name,
                service.certificate_refs().cloned().unwrap_or_default()
            );
        }

        for service in &services {
            let Some(payload) = service.repoint_payload(certificate_id) else {
                info!("[rotate] skip {} since no main ingress defined", service.id);
                report.services_skipped.push(service.id.clone());
                continue;
            };

            info!(
                "[rotate] updating certificate to {} for app {}",
                certificate_id, service.id
            );
            match self.api.update_service(app_path, &service.id, &payload) {
                Ok(()) => {
                    info!("[rotate] service {} updated", service.id);
                    report.services_updated.push(service.id.clone());
                }
                Err(err) => {
                    warn!("[rotate] failed to update service {}: {}", service.id, err);
                    report.services_failed.push(service.id.clone());
                }
            }
        }
        Ok(())
    }

    fn delete_old_certificates<'k>(
        &self,
        ids: impl Iterator<Item = &'k String>,
        active_id: &str,
        report: &mut RotationReport,
    ) {
        info!("[rotate] deleting old certificates");
        for id in ids.filter(|id| id.as_str() != active_id) {
            match self.api.delete_certificate(id) {
                Ok(()) => {
                    info!("[rotate] deleted certificate {}", id);
                    report.certificates_deleted.push(id.clone());
                }
                Err(err) => {
                    warn!("[rotate] failed to delete certificate {}, skip: {}", id, err);
                    report.certificates_failed.push(id.clone());
                }
            }
        }
    }

    fn settle(&self) {
        if !self.settings.settle_delay.is_zero() {
            std::thread::sleep(self.settings.settle_delay);
        }
    }
}
