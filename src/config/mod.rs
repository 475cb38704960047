use serde::Deserialize;

static CONFIG: OnceCell<Config> = OnceCell::const_new();

mod config_dir;
pub use config_dir::{find_config_file, read_config};

mod error;
pub use error::{ConfigError, ConfigResult};
use tokio::sync::OnceCell;

#[derive(Debug, Deserialize)]
pub struct Config {
    host: Host,
    app: App,
    #[serde(default)]
    stripe: Stripe,
}

#[derive(Debug, Deserialize)]
pub struct Host {
    bindto: String,
}

#[derive(Debug, Deserialize)]
pub struct App {
    jwt: String,
    database_uri: String,
    #[serde(default)]
    docs: bool,
    #[serde(default = "default_public_url")]
    public_url: String,
    #[serde(default = "default_certificate_prefix")]
    certificate_prefix: String,
    admin_email: Option<String>,
    admin_password: Option<String>,
}

/// Stripe credentials. Both keys are optional so the service can boot
/// without payments; the endpoints that need them answer with 500.
#[derive(Debug, Deserialize)]
pub struct Stripe {
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    #[serde(default = "default_stripe_api_base")]
    api_base: String,
    #[serde(default = "default_tolerance_secs")]
    tolerance_secs: i64,
}

fn default_public_url() -> String {
    String::from("http://localhost:3000")
}

fn default_certificate_prefix() -> String {
    String::from("PHZR")
}

fn default_stripe_api_base() -> String {
    String::from("https://api.stripe.com")
}

fn default_tolerance_secs() -> i64 {
    300
}

impl Default for Stripe {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            api_base: default_stripe_api_base(),
            tolerance_secs: default_tolerance_secs(),
        }
    }
}

impl Config {
    #[tracing::instrument]
    pub async fn get_or_init(use_local: bool) -> &'static Config {
        CONFIG
            .get_or_init(|| async {
                let config = match Self::load(use_local) {
                    Ok(c) => c,
                    Err(e) => {
                        if !matches!(e, error::ConfigError::ConfigNotFound) {
                            crate::error::log_error(&e);
                        }
                        tracing::error!("Config not found.");
                        std::process::exit(1);
                    }
                };

                config
            })
            .await
    }

    fn load(use_local: bool) -> ConfigResult<Self> {
        let bytes = read_config(use_local)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> ConfigResult<Self> {
        let config: Self = toml::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        fn invalid(key: &'static str, reason: &'static str) -> ConfigResult<()> {
            Err(ConfigError::InvalidValue { key, reason })
        }

        if self.app.jwt.trim().is_empty() {
            return invalid("app.jwt", "must not be empty");
        }
        if self.app.certificate_prefix.is_empty()
            || !self.app.certificate_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return invalid("app.certificate_prefix", "must be non-empty and alphanumeric");
        }
        if self.stripe.tolerance_secs <= 0 {
            return invalid("stripe.tolerance_secs", "must be positive");
        }
        Ok(())
    }

    #[inline]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[inline]
    pub fn app(&self) -> &App {
        &self.app
    }

    #[inline]
    pub fn stripe(&self) -> &Stripe {
        &self.stripe
    }
}

impl Host {
    #[inline]
    pub fn bindto(&self) -> &str {
        &self.bindto
    }
}

impl App {
    #[inline]
    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    #[inline]
    pub fn database_uri(&self) -> &str {
        &self.database_uri
    }

    #[inline]
    pub fn docs(&self) -> bool {
        self.docs
    }

    /// Base URL of the public site, used to build certificate links.
    #[inline]
    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    #[inline]
    pub fn certificate_prefix(&self) -> &str {
        &self.certificate_prefix
    }

    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}

impl Stripe {
    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    pub fn tolerance_secs(&self) -> i64 {
        self.tolerance_secs
    }
}
