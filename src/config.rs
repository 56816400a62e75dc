use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::error::CrmError;
use crate::policy::{EmbeddingPolicy, FrameAncestors, ImagePolicy, RemotePattern};

/// Which database variant this deployment talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite-compatible libSQL (Turso) over HTTP, or a local SQLite file.
    #[default]
    Libsql,
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Libsql => "libsql",
            Backend::Postgres => "postgres",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
            Theme::System => "system",
        }
    }
}

/// Process settings, read once at startup from `CRM_*` environment
/// variables layered over the defaults below. Database credentials are not
/// part of this struct; see [`crate::db::settings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub loglevel: String,
    pub backend: Backend,

    /// Production domains allowed to frame the app. Each expands to
    /// `*.<domain> <domain>` in `frame-ancestors`.
    pub frame_ancestor_domains: Vec<String>,
    pub allow_localhost_framing: bool,
    /// Full override of the `frame-ancestors` source list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_ancestors: Option<Vec<String>>,

    pub image_patterns: Vec<RemotePattern>,
    pub image_max_bytes: usize,

    pub theme: Theme,
    pub site_title: String,
    pub site_description: String,
    pub public_dir: PathBuf,

    pub init_schema: bool,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            backend: Backend::default(),
            frame_ancestor_domains: vec!["aiwa.build".to_string()],
            allow_localhost_framing: true,
            frame_ancestors: None,
            image_patterns: ImagePolicy::permissive().patterns().to_vec(),
            image_max_bytes: 10 * 1024 * 1024,
            theme: Theme::default(),
            site_title: "AIWA Template".to_string(),
            site_description:
                "This template will used by AIWA agent to build custom CRMs for Agencies"
                    .to_string(),
            public_dir: PathBuf::from("public"),
            init_schema: false,
            max_connections: 5,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed("CRM_"))
    }

    pub fn load() -> Result<Self, CrmError> {
        Self::from_figment(&Self::figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, CrmError> {
        let cfg: Config = figment.extract()?;
        if cfg.max_connections == 0 {
            return Err(CrmError::InvalidSetting {
                name: "CRM_MAX_CONNECTIONS",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(cfg)
    }

    pub fn frame_ancestors(&self) -> Result<FrameAncestors, CrmError> {
        match &self.frame_ancestors {
            Some(tokens) => FrameAncestors::new(tokens.iter().cloned()),
            None => FrameAncestors::for_domains(
                &self.frame_ancestor_domains,
                self.allow_localhost_framing,
            ),
        }
    }

    pub fn embedding_policy(&self) -> Result<EmbeddingPolicy, CrmError> {
        EmbeddingPolicy::new(self.frame_ancestors()?)
    }

    pub fn image_policy(&self) -> ImagePolicy {
        ImagePolicy::new(self.image_patterns.clone())
    }
}
