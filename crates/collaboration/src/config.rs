use crate::{Handshake, PresenceConfig};

/// Identity and timing a client presents to the relay server.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Peers without a nick are treated as anonymous and get no cursor.
    pub nick: Option<String>,
    pub group: Option<String>,
    pub pass: Option<String>,
    /// Browser viewer: status is fixed at `web`.
    pub web: bool,
    pub presence: PresenceConfig,
}

impl ClientConfig {
    pub fn new(nick: impl Into<String>) -> Self {
        Self {
            nick: Some(nick.into()),
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_pass(mut self, pass: impl Into<String>) -> Self {
        self.pass = Some(pass.into());
        self
    }

    pub fn handshake(&self) -> Handshake {
        Handshake {
            nick: self.nick.clone(),
            group: self.group.clone(),
            pass: self.pass.clone(),
            web: self.web,
        }
    }
}
