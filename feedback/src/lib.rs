pub mod config;
pub mod data_service;
pub mod errors;
pub mod metrics_defs;
pub mod notifier;
pub mod resolver;
pub mod service;
pub mod submission;
pub mod types;
pub mod views;

#[cfg(test)]
mod testutils;

use errors::PortalError;
use service::{FeedbackService, Portal};
use shared::admin_service::AdminService;
use shared::http::{bind, run_http_service};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub async fn run(config: config::Config) -> Result<(), PortalError> {
    config.validate()?;

    let portal = Arc::new(Portal::from_config(&config)?);
    let ready = Arc::new(AtomicBool::new(false));

    let listener = bind(&config.listener.host, config.listener.port).await?;
    let admin_listener = bind(&config.admin_listener.host, config.admin_listener.port).await?;

    let is_ready = {
        let ready = ready.clone();
        move || ready.load(Ordering::Relaxed)
    };

    let portal_task = run_http_service(listener, move |peer| {
        FeedbackService::new(portal.clone(), peer)
    });
    let admin_task = run_http_service(admin_listener, move |_| AdminService::new(is_ready.clone()));

    ready.store(true, Ordering::Relaxed);
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        admin_port = config.admin_listener.port,
        "Feedback portal listening"
    );

    tokio::try_join!(portal_task, admin_task)?;
    Ok(())
}
