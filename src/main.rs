use std::process::ExitCode;

use log::{error, info};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match truenas_cert_rotate_lib::run() {
        Ok(report) => {
            info!(
                "[rotate] done: certificate {} (id {}, {}), {} service(s) updated, {} skipped, {} failed, {} old certificate(s) deleted, {} failed",
                report.certificate_name,
                report.certificate_id,
                if report.uploaded { "uploaded" } else { "already present" },
                report.services_updated.len(),
                report.services_skipped.len(),
                report.services_failed.len(),
                report.certificates_deleted.len(),
                report.certificates_failed.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("[rotate] certificate rotation failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
