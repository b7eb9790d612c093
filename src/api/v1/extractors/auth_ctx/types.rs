/*
 * Responsibility
 * - Handler から見える「認証済みコンテキスト」の型
 * - middleware が検証して request extensions に格納し、handler はこの型だけを受け取る
 *
 * Notes
 * - token 検証 / refresh / 権限判定は middleware/services 側の責務
 */

use uuid::Uuid;

use crate::repos::identity_repo::ActorKind;
use crate::services::gate::{Authenticated, Grant};

/// 認証済みのリクエストに付与されるコンテキスト
///
/// - `grant` は entity route でのみ入る (module / action / data scope)
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub identity_id: i64,
    pub display_name: String,
    pub actor: ActorKind,
    pub role_id: i64,
    pub login_id: Uuid,
    pub session_id: Uuid,
    pub grant: Option<Grant>,
}

impl AuthCtx {
    pub fn new(who: &Authenticated) -> Self {
        Self {
            identity_id: who.identity.id,
            display_name: who.identity.display_name.clone(),
            actor: who.identity.actor,
            role_id: who.identity.role_id,
            login_id: who.login_id,
            session_id: who.session_id,
            grant: None,
        }
    }

    pub fn with_grant(mut self, grant: Grant) -> Self {
        self.grant = Some(grant);
        self
    }
}
