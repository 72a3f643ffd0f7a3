//! Privileged commands: force-mute and kick.
//!
//! The envelope carries no proof of authority, so the sender is checked
//! against the [`Directory`] on both ends: before sending, and again by
//! the target before it complies.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DirectoryError, RoomError};
use crate::protocol::{ParticipantIdentity, SignalEnvelope, SignalKind};

/// Identity and permission lookups backed by the surrounding product.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Identity of the local user. Fetched once per session.
    async fn current_identity(&self) -> Result<ParticipantIdentity, DirectoryError>;

    async fn is_moderator(&self, user_id: &str, room_id: &str) -> Result<bool, DirectoryError>;
}

/// Directory built from configuration.
///
/// A user is a moderator if it is the local user with a privileged role
/// or its id is listed in `moderators`.
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    identity: ParticipantIdentity,
    moderators: HashSet<String>,
}

impl StaticDirectory {
    pub fn new(identity: ParticipantIdentity) -> Self {
        Self {
            identity,
            moderators: HashSet::new(),
        }
    }

    pub fn with_moderators<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.moderators.extend(ids.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn current_identity(&self) -> Result<ParticipantIdentity, DirectoryError> {
        Ok(self.identity.clone())
    }

    async fn is_moderator(&self, user_id: &str, _room_id: &str) -> Result<bool, DirectoryError> {
        if user_id == self.identity.id && self.identity.role.is_privileged() {
            return Ok(true);
        }
        Ok(self.moderators.contains(user_id))
    }
}

fn is_moderation(kind: SignalKind) -> bool {
    matches!(kind, SignalKind::ForceMute | SignalKind::Kick)
}

#[derive(Clone)]
pub(crate) struct ModerationController {
    directory: Arc<dyn Directory>,
    room_id: String,
    local_id: String,
}

impl ModerationController {
    pub(crate) fn new(directory: Arc<dyn Directory>, room_id: &str, local_id: &str) -> Self {
        Self {
            directory,
            room_id: room_id.to_string(),
            local_id: local_id.to_string(),
        }
    }

    /// Check that the local user may issue `kind`.
    pub(crate) async fn authorize(&self, kind: SignalKind) -> Result<(), RoomError> {
        if !is_moderation(kind) {
            return Err(RoomError::InvalidInput(format!("{kind} is not a moderation command")));
        }
        if self.directory.is_moderator(&self.local_id, &self.room_id).await? {
            Ok(())
        } else {
            Err(RoomError::NotPermitted(format!(
                "{} may not {kind} in {}",
                self.local_id, self.room_id
            )))
        }
    }

    pub(crate) fn command(&self, kind: SignalKind, target: &str, session: &str) -> SignalEnvelope {
        SignalEnvelope::new(kind, self.local_id.as_str())
            .to(target)
            .in_session(session)
    }

    /// Re-validate a received command against the directory.
    pub(crate) async fn verify(&self, envelope: &SignalEnvelope) -> Result<(), RoomError> {
        if !is_moderation(envelope.kind) || envelope.to.as_deref() != Some(self.local_id.as_str()) {
            return Err(RoomError::InvalidInput(format!(
                "{} from {} is not addressed to this participant",
                envelope.kind, envelope.from
            )));
        }
        match self.directory.is_moderator(&envelope.from, &self.room_id).await {
            Ok(true) => {
                debug!(from = %envelope.from, kind = %envelope.kind, "Moderation command verified");
                Ok(())
            }
            Ok(false) => {
                warn!(from = %envelope.from, kind = %envelope.kind, room_id = %self.room_id, "Moderation command from non-moderator");
                Err(RoomError::NotPermitted(format!(
                    "{} is not a moderator of {}",
                    envelope.from, self.room_id
                )))
            }
            Err(e) => {
                warn!(from = %envelope.from, error = %e, "Could not verify moderation command");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Role;

    struct DownDirectory;

    #[async_trait]
    impl Directory for DownDirectory {
        async fn current_identity(&self) -> Result<ParticipantIdentity, DirectoryError> {
            Err(DirectoryError::Unavailable("offline".into()))
        }

        async fn is_moderator(&self, _: &str, _: &str) -> Result<bool, DirectoryError> {
            Err(DirectoryError::Unavailable("offline".into()))
        }
    }

    fn controller(directory: StaticDirectory, local: &str) -> ModerationController {
        ModerationController::new(Arc::new(directory), "room:r1", local)
    }

    #[tokio::test]
    async fn privileged_role_authorizes_self() {
        let owner = ParticipantIdentity::new("olga", "Olga").with_role(Role::Owner);
        let ctl = controller(StaticDirectory::new(owner), "olga");
        assert!(ctl.authorize(SignalKind::Kick).await.is_ok());
        assert!(matches!(
            ctl.authorize(SignalKind::Reaction).await,
            Err(RoomError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn member_is_not_permitted() {
        let ctl = controller(StaticDirectory::new(ParticipantIdentity::new("bob", "Bob")), "bob");
        assert!(matches!(
            ctl.authorize(SignalKind::ForceMute).await,
            Err(RoomError::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn verify_checks_sender_not_envelope() {
        let dir = StaticDirectory::new(ParticipantIdentity::new("bob", "Bob")).with_moderators(["alice"]);
        let ctl = controller(dir, "bob");

        let from_mod = SignalEnvelope::new(SignalKind::Kick, "alice").to("bob");
        assert!(ctl.verify(&from_mod).await.is_ok());

        let forged = SignalEnvelope::new(SignalKind::Kick, "mallory").to("bob");
        assert!(matches!(ctl.verify(&forged).await, Err(RoomError::NotPermitted(_))));

        let misaddressed = SignalEnvelope::new(SignalKind::ForceMute, "alice").to("carol");
        assert!(matches!(ctl.verify(&misaddressed).await, Err(RoomError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn directory_outage_refuses_command() {
        let ctl = ModerationController::new(Arc::new(DownDirectory), "room:r1", "bob");
        let env = SignalEnvelope::new(SignalKind::ForceMute, "alice").to("bob");
        assert!(matches!(ctl.verify(&env).await, Err(RoomError::Directory(_))));
    }

    #[test]
    fn command_is_point_to_point() {
        let ctl = controller(StaticDirectory::new(ParticipantIdentity::new("alice", "A")), "alice");
        let env = ctl.command(SignalKind::ForceMute, "bob", "s1");
        assert_eq!(env.to.as_deref(), Some("bob"));
        assert_eq!(env.session.as_deref(), Some("s1"));
        assert!(env.is_for("bob"));
    }
}
