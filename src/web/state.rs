use std::sync::Arc;

use crate::{Config, model::ModelManager, model::entity::CertificateIssuer, payments::PaymentGateway};

#[derive(Debug, Clone)]
pub struct AppState {
    mm: ModelManager,
    config: &'static Config,
    payments: Arc<dyn PaymentGateway>,
    issuer: CertificateIssuer,
}

impl AppState {
    pub fn new(mm: ModelManager, config: &'static Config, payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            mm,
            config,
            payments,
            issuer: CertificateIssuer::from_config(config),
        }
    }

    pub fn pool(&self) -> &ModelManager {
        &self.mm
    }

    pub fn config(&self) -> &'static Config {
        self.config
    }

    pub fn payments(&self) -> &dyn PaymentGateway {
        self.payments.as_ref()
    }

    pub fn issuer(&self) -> &CertificateIssuer {
        &self.issuer
    }
}
