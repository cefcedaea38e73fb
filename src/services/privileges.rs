use uuid::Uuid;
use crate::models::auth::Role;
use crate::models::session::LiveSession;

/// The pair of rights a requester holds on a session's room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Privilege {
    /// Whether the requester may join the room at all.
    pub can_join: bool,
    /// Whether the requester may publish media, as opposed to only subscribing.
    pub can_publish: bool,
}

impl Privilege {
    /// The grant that denies everything.
    pub const DENIED: Privilege = Privilege {
        can_join: false,
        can_publish: false,
    };
}

/// Derives room rights from identity, role, and session state.
///
/// Identity rules, in order: owning trainer and admins get join+publish,
/// enrolled students get join only, everyone else is denied. Whatever
/// identity grants is then gated on the session still being joinable
/// (`scheduled` or `active`); a cancelled or ended session grants nothing
/// regardless of role.
///
/// Pure and side-effect-free.
pub fn resolve(requester_id: Uuid, role: Role, session: &LiveSession) -> Privilege {
    let identity = if session.is_owned_by(requester_id) {
        Some(Privilege {
            can_join: true,
            can_publish: true,
        })
    } else if role == Role::Admin {
        Some(Privilege {
            can_join: true,
            can_publish: true,
        })
    } else if session.is_enrolled(requester_id) {
        Some(Privilege {
            can_join: true,
            can_publish: false,
        })
    } else {
        None
    };

    match identity {
        Some(privilege) if session.status.grants_access() => privilege,
        _ => Privilege::DENIED,
    }
}
