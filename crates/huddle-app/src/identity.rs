//! Local identity from config plus command-line overrides.

use huddle_config::{IdentityConfig, RoleSetting};
use huddle_room::{ParticipantIdentity, Role};

fn role(setting: RoleSetting) -> Role {
    match setting {
        RoleSetting::Guest => Role::Guest,
        RoleSetting::Member => Role::Member,
        RoleSetting::Moderator => Role::Moderator,
        RoleSetting::Owner => Role::Owner,
    }
}

/// An empty id gets a fresh one for this run; an empty name falls back
/// to the id.
pub fn resolve(
    config: &IdentityConfig,
    name: Option<String>,
    id: Option<String>,
) -> ParticipantIdentity {
    let id = id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| config.id.clone());
    let id = if id.trim().is_empty() {
        huddle_common::new_id()
    } else {
        id
    };
    let name = name.unwrap_or_else(|| config.display_name.clone());
    let name = if name.trim().is_empty() { id.clone() } else { name };

    let mut identity = ParticipantIdentity::new(id, name).with_role(role(config.role));
    identity.avatar_url = config.avatar_url.clone();
    identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_config() {
        let config = IdentityConfig {
            id: "cfg".into(),
            display_name: "Config".into(),
            role: RoleSetting::Moderator,
            ..Default::default()
        };
        let identity = resolve(&config, Some("Ada".into()), Some("u1".into()));
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.display_name, "Ada");
        assert_eq!(identity.role, Role::Moderator);
    }

    #[test]
    fn empty_config_generates_id_and_uses_it_as_name() {
        let identity = resolve(&IdentityConfig::default(), None, None);
        assert!(!identity.id.is_empty());
        assert_eq!(identity.display_name, identity.id);
        assert_eq!(identity.role, Role::Member);
    }
}
