//! Route descriptors and rate-limit bucket keys

use reqwest::Method;
use std::fmt;

/// Identity of a rate-limit bucket
///
/// Method plus unformatted path plus the major parameters. Two routes with
/// equal keys share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub method: Method,
    pub template: String,
    pub guild_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub webhook_id: Option<u64>,
    pub webhook_token: Option<String>,
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)?;
        if let Some(id) = self.guild_id {
            write!(f, " guild={id}")?;
        }
        if let Some(id) = self.channel_id {
            write!(f, " channel={id}")?;
        }
        if let Some(id) = self.webhook_id {
            write!(f, " webhook={id}")?;
        }
        if self.webhook_token.is_some() {
            f.write_str(" webhook_token=<set>")?;
        }
        Ok(())
    }
}

/// An API route: method, path template and the formatted path to request
///
/// Parameters named `guild_id`, `channel_id`, `webhook_id` and
/// `webhook_token` also become part of the bucket key.
///
/// ```
/// use cord_http::{Method, Route};
///
/// let route = Route::new(Method::POST, "/channels/{channel_id}/messages").channel(42);
/// assert_eq!(route.path(), "/channels/42/messages");
/// ```
#[derive(Debug, Clone)]
pub struct Route {
    key: BucketKey,
    path: String,
    use_webhook_global: bool,
}

impl Route {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            path: template.clone(),
            key: BucketKey {
                method,
                template,
                guild_id: None,
                channel_id: None,
                webhook_id: None,
                webhook_token: None,
            },
            use_webhook_global: false,
        }
    }

    pub fn get(template: impl Into<String>) -> Self {
        Self::new(Method::GET, template)
    }

    /// Substitute `{name}` in the path. Does not affect the bucket key.
    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.path = self.path.replace(&format!("{{{name}}}"), &value.to_string());
        self
    }

    pub fn guild(mut self, guild_id: u64) -> Self {
        self.key.guild_id = Some(guild_id);
        self.param("guild_id", guild_id)
    }

    pub fn channel(mut self, channel_id: u64) -> Self {
        self.key.channel_id = Some(channel_id);
        self.param("channel_id", channel_id)
    }

    /// Set the webhook parameters; webhook routes also use the webhook global gate
    pub fn webhook(mut self, webhook_id: u64, webhook_token: impl Into<String>) -> Self {
        let webhook_token = webhook_token.into();
        self.key.webhook_id = Some(webhook_id);
        self.key.webhook_token = Some(webhook_token.clone());
        self.use_webhook_global = true;
        self.param("webhook_id", webhook_id)
            .param("webhook_token", webhook_token)
    }

    /// Override which global gate the route passes through
    pub fn use_webhook_global(mut self, use_webhook_global: bool) -> Self {
        self.use_webhook_global = use_webhook_global;
        self
    }

    pub fn method(&self) -> &Method {
        &self.key.method
    }

    pub fn template(&self) -> &str {
        &self.key.template
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bucket_key(&self) -> &BucketKey {
        &self.key
    }

    pub fn uses_webhook_global(&self) -> bool {
        self.use_webhook_global
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key.method, self.path)
    }
}
