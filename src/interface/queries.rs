use crate::error::EchoError;
use crate::model::{Mode, ModeHint};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Framework-agnostic service error for the external query surface (spec
/// §6: "Get Mode", "Set Hint"), grounded on the teacher's
/// `persist::web::PersistServiceError` — handlers map this to whatever
/// transport-specific status code their framework wants, without this crate
/// depending on one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    NotFound(String),
    Validation(String),
    /// Mode transitions are frozen because the sampler is degraded for this
    /// object (spec §4.2, §6: "controller degraded -> service unavailable").
    ServiceUnavailable(String),
    Internal(String),
}

impl fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceError::NotFound(msg)
            | InterfaceError::Validation(msg)
            | InterfaceError::ServiceUnavailable(msg)
            | InterfaceError::Internal(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for InterfaceError {}

impl From<EchoError> for InterfaceError {
    fn from(err: EchoError) -> Self {
        match &err {
            EchoError::UnknownObject(_) | EchoError::ObjectExists(_) => {
                InterfaceError::NotFound(err.to_string())
            }
            EchoError::InvalidHint(_) | EchoError::InvalidMode(_) | EchoError::InvalidConfig(_) => {
                InterfaceError::Validation(err.to_string())
            }
            EchoError::ControllerDegraded(_) => InterfaceError::ServiceUnavailable(err.to_string()),
            _ => InterfaceError::Internal(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetModeRequest {
    pub object_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetModeResponse {
    pub object_id: String,
    pub mode: Mode,
    pub hint: ModeHint,
    pub last_mode_change: DateTime<Utc>,
    /// Deterministic tag for the reason behind `last_mode_change` (spec §6).
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetHintRequest {
    pub object_id: String,
    pub hint: ModeHint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetHintAck {
    pub object_id: String,
    pub hint: ModeHint,
}

/// Reports the mode currently committed for an object (spec §6, "Get Mode").
///
/// `controller_degraded` reflects the Mode Controller's sampler-degraded
/// freeze for this object (spec §4.2): when true, transitions are frozen
/// and the call returns `ServiceUnavailable` instead of a stale mode,
/// regardless of the object's presence in the store.
pub async fn handle_get_mode(
    store: &ObjectStore,
    request: GetModeRequest,
    controller_degraded: bool,
) -> Result<GetModeResponse, InterfaceError> {
    if controller_degraded {
        return Err(EchoError::ControllerDegraded(request.object_id).into());
    }

    let meta = store
        .get(&request.object_id)
        .await
        .ok_or_else(|| EchoError::UnknownObject(request.object_id.clone()))?;

    Ok(GetModeResponse {
        object_id: meta.object_id,
        mode: meta.current_mode,
        hint: meta.mode_hint,
        last_mode_change: meta.last_mode_change,
        reason: meta.last_mode_change_reason,
    })
}

/// Records an operator/user-declared mode hint (spec §6, "Set Hint"). The
/// hint only influences the next Policy Engine tick; it never commits a
/// mode change directly.
pub async fn handle_set_hint(
    store: &ObjectStore,
    request: SetHintRequest,
) -> Result<SetHintAck, InterfaceError> {
    store.set_hint(&request.object_id, request.hint).await?;
    Ok(SetHintAck {
        object_id: request.object_id,
        hint: request.hint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectMetadata;

    #[tokio::test]
    async fn get_mode_reports_committed_mode() {
        let store = ObjectStore::new();
        store
            .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
            .await
            .unwrap();

        let response = handle_get_mode(
            &store,
            GetModeRequest {
                object_id: "obj-1".into(),
            },
            false,
        )
        .await
        .unwrap();
        assert_eq!(response.mode, Mode::Strong);
        assert_eq!(response.reason, "initial");
    }

    #[tokio::test]
    async fn get_mode_on_unknown_object_is_not_found() {
        let store = ObjectStore::new();
        let err = handle_get_mode(
            &store,
            GetModeRequest {
                object_id: "ghost".into(),
            },
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InterfaceError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_mode_reports_service_unavailable_when_controller_degraded() {
        let store = ObjectStore::new();
        store
            .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
            .await
            .unwrap();

        let err = handle_get_mode(
            &store,
            GetModeRequest {
                object_id: "obj-1".into(),
            },
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InterfaceError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn set_hint_does_not_change_current_mode() {
        let store = ObjectStore::new();
        store
            .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
            .await
            .unwrap();

        let ack = handle_set_hint(
            &store,
            SetHintRequest {
                object_id: "obj-1".into(),
                hint: ModeHint::Available,
            },
        )
        .await
        .unwrap();
        assert_eq!(ack.hint, ModeHint::Available);

        let meta = store.get("obj-1").await.unwrap();
        assert_eq!(meta.current_mode, Mode::Strong);
        assert_eq!(meta.mode_hint, ModeHint::Available);
    }
}
